use crate::pipeline::command::{BufferPool, CommandBuffer, CommandKind, RequestId};
use crate::pipeline::handle::SurfaceHandle;
use crate::pipeline::queue::CommandQueue;
use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

// Upper bound on a single sleep so the shutdown flag is re-read even if a
// wake is lost.
const WAIT_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug)]
struct PendingEntry {
    surface: SurfaceHandle,
    expected: CommandKind,
    reply: Sender<CommandBuffer>,
}

/// Receiving half of one outstanding blocking request.
#[derive(Debug)]
pub struct PendingWait {
    id: RequestId,
    reply: Receiver<CommandBuffer>,
}

impl PendingWait {
    pub fn id(&self) -> RequestId {
        self.id
    }
}

/// Outstanding engine-side blocking requests keyed by correlation id.
///
/// Each request owns a one-shot reply slot, resolved at most once. Removing
/// the entry drops the sending half, which wakes the waiter with a failure.
#[derive(Debug, Default)]
pub struct PendingRequests {
    next_id: AtomicU64,
    entries: Mutex<HashMap<RequestId, PendingEntry>>,
    abandoned: AtomicU64,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        surface: SurfaceHandle,
        expected: CommandKind,
    ) -> Result<(RequestId, PendingWait)> {
        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (reply_tx, reply_rx) = bounded(1);
        self.entries
            .lock()
            .map_err(|_| anyhow!("pending request lock poisoned"))?
            .insert(
                id,
                PendingEntry {
                    surface,
                    expected,
                    reply: reply_tx,
                },
            );
        Ok((
            id,
            PendingWait {
                id,
                reply: reply_rx,
            },
        ))
    }

    /// Pushes `buf` as a blocking request and waits for the reply.
    ///
    /// Returns `None` on shutdown, surface teardown, or deadline expiry.
    /// Absence of a reply is final; the request is never retried.
    ///
    /// `is_live` is consulted after the request is registered. Surface
    /// teardown invalidates the handle before calling `fail_surface`, so a
    /// destroy racing with registration is caught by one side or the other.
    pub fn request(
        &self,
        outbound: &CommandQueue,
        pool: &BufferPool,
        mut buf: CommandBuffer,
        deadline: Option<Instant>,
        shutdown: &AtomicBool,
        is_live: impl Fn(SurfaceHandle) -> bool,
    ) -> Option<CommandBuffer> {
        let Some(expected) = buf.kind.response_kind() else {
            tracing::error!(kind = ?buf.kind, "not a blocking request kind");
            pool.release(buf);
            return None;
        };
        if shutdown.load(Ordering::Acquire) {
            pool.release(buf);
            return None;
        }
        let surface = buf.surface;
        let wait = match self.register(surface, expected) {
            Ok((_, wait)) => wait,
            Err(err) => {
                tracing::error!(?err, %surface, "failed to register blocking request");
                pool.release(buf);
                return None;
            }
        };
        if !is_live(surface) {
            self.forget(wait.id);
            tracing::debug!(%surface, kind = ?buf.kind, "blocking request for destroyed surface");
            pool.release(buf);
            return None;
        }
        buf.request = Some(wait.id);
        outbound.push(buf);
        self.wait(wait, deadline, shutdown)
    }

    pub fn wait(
        &self,
        wait: PendingWait,
        deadline: Option<Instant>,
        shutdown: &AtomicBool,
    ) -> Option<CommandBuffer> {
        loop {
            let slice = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        self.forget(wait.id);
                        self.abandoned.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(request = wait.id.0, "blocking request timed out");
                        return None;
                    }
                    WAIT_SLICE.min(deadline - now)
                }
                None => WAIT_SLICE,
            };

            match wait.reply.recv_timeout(slice) {
                Ok(reply) => return Some(reply),
                Err(RecvTimeoutError::Timeout) => {
                    if shutdown.load(Ordering::Acquire) {
                        self.forget(wait.id);
                        return None;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Delivers a host response to its waiter. The correlation id must be
    /// outstanding, and both the full surface handle and the response kind
    /// must match the request. Rejected buffers are handed back.
    pub fn complete(&self, buf: CommandBuffer) -> Result<(), CommandBuffer> {
        let Some(id) = buf.request else {
            return Err(buf);
        };
        let Ok(mut entries) = self.entries.lock() else {
            return Err(buf);
        };
        let matches = entries
            .get(&id)
            .is_some_and(|entry| entry.surface == buf.surface && entry.expected == buf.kind);
        if !matches {
            tracing::debug!(
                request = id.0,
                surface = %buf.surface,
                kind = ?buf.kind,
                "rejected response with no matching request"
            );
            return Err(buf);
        }
        let Some(entry) = entries.remove(&id) else {
            return Err(buf);
        };
        drop(entries);
        entry.reply.try_send(buf).map_err(|err| err.into_inner())
    }

    /// Fails every wait scoped to `surface`. Returns how many were resolved.
    pub fn fail_surface(&self, surface: SurfaceHandle) -> usize {
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|_, entry| entry.surface != surface);
        before - entries.len()
    }

    pub fn cancel_all(&self) -> usize {
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };
        let cancelled = entries.len();
        entries.clear();
        cancelled
    }

    pub fn pending_len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    /// Requests given up after their deadline.
    pub fn abandoned(&self) -> u64 {
        self.abandoned.load(Ordering::Relaxed)
    }

    fn forget(&self, id: RequestId) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(&id);
        }
    }
}
