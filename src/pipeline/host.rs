use crate::pipeline::bridge::{Bridge, BridgeStatsSnapshot};
use crate::pipeline::coalesce::{acknowledge, drain_and_coalesce};
use crate::pipeline::command::{CommandKind, RequestId};
use crate::pipeline::handle::SurfaceHandle;
use crate::pipeline::messages::{DialogResponse, FramePainted, HostAction, HostEvent, SurfaceSize};
use crate::pipeline::paint::{RenderBuffer, SlotId};
use anyhow::{anyhow, bail, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Host-thread side of the pipeline.
///
/// Pushes user actions toward the engine and, once per host tick, drains and
/// coalesces what the engine sent back.
pub struct HostBridge {
    bridge: Arc<Bridge>,
    ready: VecDeque<HostEvent>,
}

impl HostBridge {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self {
            bridge,
            ready: VecDeque::new(),
        }
    }

    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    pub fn create_surface(&self, width: u32, height: u32) -> Result<SurfaceHandle> {
        let surface = self.bridge.insert_surface(width, height)?;
        let mut buf = self.bridge.pool.acquire(CommandKind::CreateSurface, surface);
        if let Err(err) = buf.write_payload(&SurfaceSize { width, height }) {
            self.bridge.pool.release(buf);
            self.bridge.remove_surface(surface);
            return Err(err);
        }
        self.bridge.queues.to_engine.push(buf);
        tracing::debug!(%surface, width, height, "surface created");
        Ok(surface)
    }

    /// Invalidates the handle, fails any blocking request scoped to it and
    /// tells the engine to drop the view. Returns false for a stale handle.
    pub fn destroy_surface(&mut self, surface: SurfaceHandle) -> bool {
        if self.bridge.remove_surface(surface).is_none() {
            return false;
        }
        // Handle first, then waits: the matcher re-checks liveness after
        // registering, so no request can slip between the two.
        let failed = self.bridge.pending.fail_surface(surface);
        if failed > 0 {
            tracing::debug!(%surface, failed, "failed blocking requests for destroyed surface");
        }
        self.ready.retain(|event| event.surface() != surface);
        let buf = self.bridge.pool.acquire(CommandKind::DestroySurface, surface);
        self.bridge.queues.to_engine.push(buf);
        true
    }

    pub fn is_live(&self, surface: SurfaceHandle) -> bool {
        self.bridge.is_live(surface)
    }

    pub fn send(&self, surface: SurfaceHandle, action: HostAction) -> Result<()> {
        if !self.bridge.is_live(surface) {
            bail!("surface {surface} is not live");
        }
        let mut buf = self.bridge.pool.acquire(action.kind(), surface);
        if let Err(err) = action.write_payload(&mut buf) {
            self.bridge.pool.release(buf);
            return Err(err);
        }
        self.bridge.queues.to_engine.push(buf);
        Ok(())
    }

    /// Drains the engine-to-host queue once, coalescing painted frames.
    /// Returns the number of events made ready.
    pub fn tick(&mut self) -> usize {
        let batch = drain_and_coalesce(
            &self.bridge.queues.to_host,
            &self.bridge.queues.to_engine,
            &self.bridge.pool,
        );
        self.bridge.stats.record_coalesced(batch.acknowledged);
        self.bridge.stats.record_payload_errors(batch.payload_errors);

        let before = self.ready.len();
        for buf in batch.passthrough {
            if !self.bridge.is_live(buf.surface) {
                self.bridge.stats.record_stale_drop();
                self.bridge.pool.release(buf);
                continue;
            }
            match HostEvent::decode(&buf) {
                Ok(event) => self.ready.push_back(event),
                Err(err) => {
                    tracing::warn!(?err, kind = ?buf.kind, surface = %buf.surface, "dropping host event");
                    self.bridge.stats.record_payload_errors(1);
                }
            }
            self.bridge.pool.release(buf);
        }

        let mut delivered = 0;
        for (surface, buf) in batch.painted {
            let decoded = buf.read_payload::<FramePainted>();
            self.bridge.pool.release(buf);
            let frame = match decoded {
                Ok(frame) => frame,
                Err(err) => {
                    tracing::warn!(?err, %surface, "dropping painted frame");
                    self.bridge.stats.record_payload_errors(1);
                    continue;
                }
            };
            if !self.bridge.is_live(surface) {
                self.bridge.stats.record_stale_drop();
                continue;
            }
            self.ready.push_back(HostEvent::FramePainted { surface, frame });
            delivered += 1;
        }
        self.bridge.stats.record_delivered(delivered);
        self.ready.len() - before
    }

    pub fn poll(&mut self) -> Option<HostEvent> {
        self.ready.pop_front()
    }

    /// Sleeps until the engine pushes something or `timeout` elapses.
    pub fn wait_for_events(&self, timeout: Duration) -> bool {
        if !self.ready.is_empty() || !self.bridge.queues.to_host.is_empty() {
            return true;
        }
        self.bridge.queues.to_host.wake_event().wait_timeout(timeout)
    }

    /// Reads a delivered slot. The slot stays owned by the host until
    /// [`HostBridge::ack_texture`].
    pub fn with_frame<R>(
        &self,
        surface: SurfaceHandle,
        slot: u32,
        f: impl FnOnce(&RenderBuffer) -> R,
    ) -> Result<R> {
        let shared = self
            .bridge
            .resolve(surface)
            .ok_or_else(|| anyhow!("surface {surface} is not live"))?;
        let paint = shared.lock()?;
        let slot_id = SlotId(slot);
        if !paint.ring().is_in_flight(slot_id) {
            bail!("slot {slot} of surface {surface} is not held by the host");
        }
        let buffer = paint
            .ring()
            .slot(slot_id)
            .ok_or_else(|| anyhow!("surface {surface} has no slot {slot}"))?;
        Ok(f(buffer))
    }

    /// Texture consumed: hands the slot back to the engine.
    pub fn ack_texture(&self, surface: SurfaceHandle, slot: u32) -> bool {
        if !self.bridge.is_live(surface) {
            return false;
        }
        acknowledge(
            &self.bridge.queues.to_engine,
            &self.bridge.pool,
            surface,
            slot,
        );
        true
    }

    /// Asks the engine thread to capture the surface. Without a response
    /// before `timeout` the request is abandoned.
    pub fn request_screenshot(&self, surface: SurfaceHandle, timeout: Option<Duration>) -> Result<()> {
        let shared = self
            .bridge
            .resolve(surface)
            .ok_or_else(|| anyhow!("surface {surface} is not live"))?;
        shared
            .lock()?
            .request_screenshot(timeout.map(|timeout| Instant::now() + timeout));
        self.bridge.queues.to_engine.wake_event().notify();
        Ok(())
    }

    pub fn take_screenshot(&self, surface: SurfaceHandle) -> Option<RenderBuffer> {
        let shared = self.bridge.resolve(surface)?;
        let mut paint = shared.lock().ok()?;
        paint.take_screenshot()
    }

    /// Answers a dialog request. Returns false when the request is no longer
    /// outstanding or does not belong to `surface`.
    pub fn respond(
        &self,
        request: RequestId,
        surface: SurfaceHandle,
        response: DialogResponse,
    ) -> bool {
        let mut buf = self.bridge.pool.acquire(response.kind(), surface);
        buf.request = Some(request);
        if let Err(err) = buf.write_payload(&response) {
            tracing::error!(?err, %surface, "failed to encode dialog response");
            self.bridge.pool.release(buf);
            return false;
        }
        match self.bridge.pending.complete(buf) {
            Ok(()) => true,
            Err(rejected) => {
                self.bridge.pool.release(rejected);
                false
            }
        }
    }

    pub fn stats(&self) -> BridgeStatsSnapshot {
        self.bridge.stats()
    }
}
