use crate::pipeline::command::BufferPool;
use crate::pipeline::handle::{SurfaceHandle, SurfaceTable};
use crate::pipeline::matcher::PendingRequests;
use crate::pipeline::queue::DuplexQueues;
use crate::pipeline::surface::SurfaceShared;
use crate::settings::PipelineSettings;
use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStatsSnapshot {
    pub frames_presented: u64,
    pub frames_deferred: u64,
    pub frames_delivered: u64,
    pub frames_coalesced: u64,
    pub payload_errors: u64,
    pub stale_drops: u64,
    pub requests_abandoned: u64,
    pub screenshots_abandoned: u64,
}

#[derive(Debug, Default)]
pub struct BridgeStats {
    frames_presented: AtomicU64,
    frames_deferred: AtomicU64,
    frames_delivered: AtomicU64,
    frames_coalesced: AtomicU64,
    payload_errors: AtomicU64,
    stale_drops: AtomicU64,
    screenshots_abandoned: AtomicU64,
}

impl BridgeStats {
    pub fn record_presented(&self) {
        self.frames_presented.fetch_add(1, Ordering::Relaxed);
    }

    /// A frame was ready but every paint slot was still held by the host.
    pub fn record_deferred(&self) {
        self.frames_deferred.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self, count: usize) {
        self.frames_delivered
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_coalesced(&self, count: usize) {
        self.frames_coalesced
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_payload_errors(&self, count: usize) {
        self.payload_errors.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_stale_drop(&self) {
        self.stale_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_screenshot_abandoned(&self) {
        self.screenshots_abandoned.fetch_add(1, Ordering::Relaxed);
    }
}

/// State shared by the host side and the engine pump.
#[derive(Debug)]
pub struct Bridge {
    pub pool: BufferPool,
    pub queues: DuplexQueues,
    pub pending: PendingRequests,
    pub stats: BridgeStats,
    surfaces: Mutex<SurfaceTable<Arc<SurfaceShared>>>,
    shutdown: AtomicBool,
    ring_depth: usize,
}

impl Bridge {
    pub fn new(settings: &PipelineSettings) -> Arc<Self> {
        Arc::new(Self {
            pool: BufferPool::new(),
            queues: DuplexQueues::new(),
            pending: PendingRequests::new(),
            stats: BridgeStats::default(),
            surfaces: Mutex::new(SurfaceTable::new()),
            shutdown: AtomicBool::new(false),
            ring_depth: settings.ring_depth(),
        })
    }

    pub fn ring_depth(&self) -> usize {
        self.ring_depth
    }

    /// Per-surface state, or `None` for a stale or unknown handle.
    pub fn resolve(&self, surface: SurfaceHandle) -> Option<Arc<SurfaceShared>> {
        self.surfaces.lock().ok()?.get(surface).cloned()
    }

    pub fn is_live(&self, surface: SurfaceHandle) -> bool {
        self.surfaces
            .lock()
            .map(|table| table.contains(surface))
            .unwrap_or(false)
    }

    pub fn live_surfaces(&self) -> Vec<SurfaceHandle> {
        self.surfaces
            .lock()
            .map(|table| table.handles())
            .unwrap_or_default()
    }

    pub(crate) fn insert_surface(&self, width: u32, height: u32) -> Result<SurfaceHandle> {
        let shared = Arc::new(SurfaceShared::new(self.ring_depth, width, height));
        self.surfaces
            .lock()
            .map_err(|_| anyhow!("surface table lock poisoned"))?
            .insert(shared)
    }

    pub(crate) fn remove_surface(&self, surface: SurfaceHandle) -> Option<Arc<SurfaceShared>> {
        self.surfaces.lock().ok()?.remove(surface)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Raises the shutdown flag, fails every blocking wait and wakes both
    /// sides so they observe it.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        let cancelled = self.pending.cancel_all();
        if cancelled > 0 {
            tracing::debug!(cancelled, "cancelled blocking requests for shutdown");
        }
        self.queues.wake_all();
    }

    pub(crate) fn shutdown_flag(&self) -> &AtomicBool {
        &self.shutdown
    }

    pub fn stats(&self) -> BridgeStatsSnapshot {
        let s = &self.stats;
        BridgeStatsSnapshot {
            frames_presented: s.frames_presented.load(Ordering::Relaxed),
            frames_deferred: s.frames_deferred.load(Ordering::Relaxed),
            frames_delivered: s.frames_delivered.load(Ordering::Relaxed),
            frames_coalesced: s.frames_coalesced.load(Ordering::Relaxed),
            payload_errors: s.payload_errors.load(Ordering::Relaxed),
            stale_drops: s.stale_drops.load(Ordering::Relaxed),
            requests_abandoned: self.pending.abandoned(),
            screenshots_abandoned: s.screenshots_abandoned.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_surface_no_longer_resolves() {
        let bridge = Bridge::new(&PipelineSettings::default());
        let surface = bridge.insert_surface(4, 4).expect("insert");
        assert!(bridge.resolve(surface).is_some());

        assert!(bridge.remove_surface(surface).is_some());
        assert!(bridge.resolve(surface).is_none());
        assert!(!bridge.is_live(surface));
        assert!(bridge.remove_surface(surface).is_none());
    }

    #[test]
    fn shutdown_cancels_pending_requests() {
        let bridge = Bridge::new(&PipelineSettings::default());
        let surface = bridge.insert_surface(4, 4).expect("insert");
        bridge
            .pending
            .register(surface, crate::pipeline::command::CommandKind::AlertResult)
            .expect("register");

        bridge.request_shutdown();
        assert!(bridge.is_shutdown());
        assert_eq!(bridge.pending.pending_len(), 0);
        assert!(bridge
            .queues
            .to_engine
            .wake_event()
            .wait_timeout(std::time::Duration::from_millis(1)));
    }
}
