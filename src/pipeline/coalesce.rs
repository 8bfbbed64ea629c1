use crate::pipeline::command::{BufferPool, CommandBuffer, CommandKind};
use crate::pipeline::handle::SurfaceHandle;
use crate::pipeline::messages::{FrameAck, FramePainted};
use crate::pipeline::queue::CommandQueue;
use std::collections::BTreeMap;

/// Result of one host-side drain of the engine-to-host queue.
#[derive(Debug, Default)]
pub struct CoalescedBatch {
    /// Newest painted frame per surface, carrying the union of every region
    /// it replaced.
    pub painted: BTreeMap<SurfaceHandle, CommandBuffer>,
    /// Everything that is not a painted frame, in arrival order.
    pub passthrough: Vec<CommandBuffer>,
    /// Superseded frames acknowledged straight back to the engine.
    pub acknowledged: usize,
    pub payload_errors: usize,
}

impl CoalescedBatch {
    pub fn is_empty(&self) -> bool {
        self.painted.is_empty() && self.passthrough.is_empty()
    }
}

/// Drains every available host-bound buffer. For a surface with K painted
/// frames queued, K-1 are acknowledged back to the engine without any pixel
/// dispatch and only the newest is kept.
pub fn drain_and_coalesce(
    from_engine: &CommandQueue,
    to_engine: &CommandQueue,
    pool: &BufferPool,
) -> CoalescedBatch {
    let mut batch = CoalescedBatch::default();
    // Decoded form of each kept frame, so merges only re-encode the newest.
    let mut frames: BTreeMap<SurfaceHandle, FramePainted> = BTreeMap::new();

    while let Some(mut buf) = from_engine.pop() {
        if buf.kind != CommandKind::FramePainted {
            batch.passthrough.push(buf);
            continue;
        }

        let mut frame: FramePainted = match buf.read_payload() {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(?err, surface = %buf.surface, "dropping undecodable frame");
                batch.payload_errors += 1;
                pool.release(buf);
                continue;
            }
        };

        let surface = buf.surface;
        if let Some(previous) = frames.remove(&surface) {
            frame.region = frame.region.union(previous.region);
            if let Some(stale) = batch.painted.remove(&surface) {
                pool.release(stale);
            }
            acknowledge(to_engine, pool, surface, previous.slot);
            batch.acknowledged += 1;
            if let Err(err) = buf.write_payload(&frame) {
                tracing::warn!(?err, %surface, "failed to re-encode coalesced frame");
                batch.payload_errors += 1;
                acknowledge(to_engine, pool, surface, frame.slot);
                pool.release(buf);
                continue;
            }
        }
        frames.insert(surface, frame);
        batch.painted.insert(surface, buf);
    }

    if batch.acknowledged > 0 {
        tracing::trace!(
            acknowledged = batch.acknowledged,
            delivered = batch.painted.len(),
            "coalesced painted frames"
        );
    }
    batch
}

/// Queues a slot release for the engine thread.
pub fn acknowledge(to_engine: &CommandQueue, pool: &BufferPool, surface: SurfaceHandle, slot: u32) {
    let mut ack = pool.acquire(CommandKind::FrameAck, surface);
    if let Err(err) = ack.write_payload(&FrameAck { slot }) {
        tracing::error!(?err, %surface, slot, "failed to encode frame ack");
        pool.release(ack);
        return;
    }
    to_engine.push(ack);
}
