use crate::pipeline::command::{BufferPool, CommandBuffer, CommandKind};
use crate::pipeline::handle::SurfaceHandle;
use crate::pipeline::messages::ScrollState;
use anyhow::{Context, Result};
use std::collections::HashMap;

/// Suppresses scroll/zoom notifications that would repeat the last one sent.
#[derive(Debug, Default)]
pub struct ScrollSync {
    last_sent: HashMap<SurfaceHandle, Vec<u8>>,
    scratch: Vec<u8>,
}

impl ScrollSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a `ScrollChanged` buffer when the serialized `state` differs
    /// from the last one sent for `surface`, or when `force` is set.
    pub fn maybe_emit(
        &mut self,
        surface: SurfaceHandle,
        state: &ScrollState,
        force: bool,
        pool: &BufferPool,
    ) -> Result<Option<CommandBuffer>> {
        self.scratch.clear();
        serde_json::to_writer(&mut self.scratch, state)
            .with_context(|| format!("failed to encode scroll state for surface {surface}"))?;

        let unchanged = self
            .last_sent
            .get(&surface)
            .is_some_and(|last| *last == self.scratch);
        if unchanged && !force {
            return Ok(None);
        }

        let last = self.last_sent.entry(surface).or_default();
        last.clear();
        last.extend_from_slice(&self.scratch);

        let mut buf = pool.acquire(CommandKind::ScrollChanged, surface);
        buf.payload.extend_from_slice(&self.scratch);
        Ok(Some(buf))
    }

    pub fn forget(&mut self, surface: SurfaceHandle) {
        self.last_sent.remove(&surface);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SURFACE: SurfaceHandle = SurfaceHandle {
        index: 0,
        generation: 1,
    };

    #[test]
    fn unchanged_state_is_suppressed() {
        let pool = BufferPool::new();
        let mut sync = ScrollSync::new();
        let state = ScrollState::default();

        assert!(sync
            .maybe_emit(SURFACE, &state, false, &pool)
            .expect("emit")
            .is_some());
        for _ in 0..10 {
            assert!(sync
                .maybe_emit(SURFACE, &state, false, &pool)
                .expect("emit")
                .is_none());
        }
    }

    #[test]
    fn change_or_force_emits() {
        let pool = BufferPool::new();
        let mut sync = ScrollSync::new();
        let mut state = ScrollState::default();
        sync.maybe_emit(SURFACE, &state, false, &pool).expect("emit");

        state.zoom_percent = 150;
        let buf = sync
            .maybe_emit(SURFACE, &state, false, &pool)
            .expect("emit")
            .expect("zoom change emitted");
        assert_eq!(buf.kind, CommandKind::ScrollChanged);
        assert_eq!(buf.read_payload::<ScrollState>().expect("decode"), state);

        assert!(sync
            .maybe_emit(SURFACE, &state, true, &pool)
            .expect("emit")
            .is_some());
    }

    #[test]
    fn forget_resets_the_snapshot() {
        let pool = BufferPool::new();
        let mut sync = ScrollSync::new();
        let state = ScrollState::default();
        sync.maybe_emit(SURFACE, &state, false, &pool).expect("emit");
        sync.forget(SURFACE);
        assert!(sync
            .maybe_emit(SURFACE, &state, false, &pool)
            .expect("emit")
            .is_some());
    }
}
