use crate::pipeline::bridge::Bridge;
use crate::pipeline::command::{CommandBuffer, CommandKind};
use crate::pipeline::dirty::DirtyRegion;
use crate::pipeline::engine::{BrowserEngine, EngineClient, PaintElement};
use crate::pipeline::handle::SurfaceHandle;
use crate::pipeline::messages::{
    write_cursor, write_navigation, CursorKind, DialogRequest, DialogResponse, FrameAck,
    FramePainted, HostAction, NavigationEvent, SurfaceSize,
};
use crate::pipeline::paint::SlotId;
use crate::pipeline::scroll_sync::ScrollSync;
use crate::pipeline::state::{can_transition, PumpLifecycle};
use crate::pipeline::surface::SurfaceShared;
use crate::settings::PipelineSettings;
use anyhow::{anyhow, bail, Result};
use crossbeam_channel::{bounded, RecvTimeoutError};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct ViewState {
    shared: Arc<SurfaceShared>,
    // Emit scroll/zoom on the next sync even if unchanged.
    force_scroll: bool,
    cursor: Option<CursorKind>,
}

/// Engine-thread half of the pipeline: owns the engine and every live view.
///
/// `step` runs one tick without touching threads, so tests can drive it
/// directly.
pub struct PumpCore<E: BrowserEngine> {
    bridge: Arc<Bridge>,
    engine: E,
    views: HashMap<SurfaceHandle, ViewState>,
    scroll_sync: ScrollSync,
    request_timeout: Option<Duration>,
}

impl<E: BrowserEngine> PumpCore<E> {
    pub fn new(bridge: Arc<Bridge>, engine: E, settings: &PipelineSettings) -> Self {
        Self {
            bridge,
            engine,
            views: HashMap::new(),
            scroll_sync: ScrollSync::new(),
            request_timeout: settings.request_timeout(),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    /// One engine tick. Returns the number of host commands dispatched.
    pub fn step(&mut self) -> usize {
        let dispatched = self.drain_commands();

        let PumpCore {
            bridge,
            engine,
            views,
            request_timeout,
            ..
        } = self;
        let mut client = PumpClient {
            bridge,
            views,
            request_timeout: *request_timeout,
        };
        engine.do_work(&mut client);

        self.present_frames();
        self.service_screenshots(Instant::now());
        self.sync_scroll();
        dispatched
    }

    /// Destroys every remaining view. Called when the pump stops.
    pub fn teardown(&mut self) {
        for (surface, _) in self.views.drain() {
            self.engine.destroy_view(surface);
            self.scroll_sync.forget(surface);
        }
    }

    fn drain_commands(&mut self) -> usize {
        // Commands queued while dispatching wait for the next tick.
        let budget = self.bridge.queues.to_engine.len();
        let mut dispatched = 0;
        for _ in 0..budget {
            let Some(buf) = self.bridge.queues.to_engine.pop() else {
                break;
            };
            if let Err(err) = self.dispatch(&buf) {
                tracing::warn!(?err, kind = ?buf.kind, surface = %buf.surface, "dropping command");
                self.bridge.stats.record_payload_errors(1);
            }
            self.bridge.pool.release(buf);
            dispatched += 1;
        }
        dispatched
    }

    fn dispatch(&mut self, buf: &CommandBuffer) -> Result<()> {
        let surface = buf.surface;
        match buf.kind {
            CommandKind::CreateSurface => return self.create_view(buf),
            CommandKind::DestroySurface => {
                self.destroy_view(surface);
                return Ok(());
            }
            _ => {}
        }

        if !self.bridge.is_live(surface) {
            tracing::debug!(kind = ?buf.kind, %surface, "dropping command for stale surface");
            self.bridge.stats.record_stale_drop();
            return Ok(());
        }
        let Some(view) = self.views.get_mut(&surface) else {
            tracing::debug!(kind = ?buf.kind, %surface, "dropping command for unknown view");
            self.bridge.stats.record_stale_drop();
            return Ok(());
        };

        match buf.kind {
            CommandKind::FrameAck => {
                let FrameAck { slot } = buf.read_payload()?;
                if !view.shared.lock()?.ring_mut().ack(SlotId(slot)) {
                    tracing::debug!(%surface, slot, "ack for slot that was not in flight");
                }
            }
            CommandKind::GetZoom => view.force_scroll = true,
            kind if kind.is_response() => {
                bail!("dialog response {kind:?} arrived outside the request matcher");
            }
            _ => {
                let action = HostAction::decode(buf)?;
                // The ring follows the size of the engine's next paint.
                if matches!(action, HostAction::Resize(_)) {
                    view.force_scroll = true;
                }
                self.engine.handle_action(surface, &action)?;
            }
        }
        Ok(())
    }

    fn create_view(&mut self, buf: &CommandBuffer) -> Result<()> {
        let surface = buf.surface;
        let Some(shared) = self.bridge.resolve(surface) else {
            tracing::debug!(%surface, "surface destroyed before its view was created");
            self.bridge.stats.record_stale_drop();
            return Ok(());
        };
        let size: SurfaceSize = buf.read_payload()?;
        self.engine.create_view(surface, size)?;
        self.views.insert(
            surface,
            ViewState {
                shared,
                force_scroll: true,
                cursor: None,
            },
        );
        tracing::debug!(%surface, width = size.width, height = size.height, "view created");
        Ok(())
    }

    fn destroy_view(&mut self, surface: SurfaceHandle) {
        if self.views.remove(&surface).is_none() {
            return;
        }
        self.engine.destroy_view(surface);
        self.scroll_sync.forget(surface);
        tracing::debug!(%surface, "view destroyed");
    }

    fn present_frames(&mut self) {
        for (surface, view) in &self.views {
            let flipped = match view.shared.lock() {
                Ok(mut paint) => {
                    if !paint.ring().has_pending_frame() {
                        continue;
                    }
                    paint.present().map(|flip| (flip, paint.size()))
                }
                Err(err) => {
                    tracing::error!(?err, %surface, "skipping frame");
                    continue;
                }
            };

            let Some((flip, size)) = flipped else {
                self.bridge.stats.record_deferred();
                continue;
            };
            let mut buf = self
                .bridge
                .pool
                .acquire(CommandKind::FramePainted, *surface);
            let frame = FramePainted {
                slot: flip.slot.0,
                region: flip.region,
                width: size.width,
                height: size.height,
            };
            match buf.write_payload(&frame) {
                Ok(()) => {
                    self.bridge.queues.to_host.push(buf);
                    self.bridge.stats.record_presented();
                }
                Err(err) => {
                    tracing::error!(?err, %surface, "failed to encode painted frame");
                    self.bridge.pool.release(buf);
                    if let Ok(mut paint) = view.shared.lock() {
                        paint.ring_mut().ack(flip.slot);
                    }
                }
            }
        }
    }

    fn service_screenshots(&mut self, now: Instant) {
        for (surface, view) in &self.views {
            let captured = match view.shared.lock() {
                Ok(mut paint) => {
                    if paint.expire_screenshot(now) {
                        tracing::debug!(%surface, "screenshot request expired");
                        self.bridge.stats.record_screenshot_abandoned();
                        continue;
                    }
                    paint.capture_screenshot()
                }
                Err(err) => {
                    tracing::error!(?err, %surface, "skipping screenshot");
                    continue;
                }
            };
            let Some(size) = captured else {
                continue;
            };
            let mut buf = self
                .bridge
                .pool
                .acquire(CommandKind::ScreenshotReady, *surface);
            match buf.write_payload(&size) {
                Ok(()) => self.bridge.queues.to_host.push(buf),
                Err(err) => {
                    tracing::error!(?err, %surface, "failed to encode screenshot notice");
                    self.bridge.pool.release(buf);
                }
            }
        }
    }

    fn sync_scroll(&mut self) {
        for (surface, view) in self.views.iter_mut() {
            let Some(state) = self.engine.scroll_state(*surface) else {
                continue;
            };
            let force = std::mem::take(&mut view.force_scroll);
            match self
                .scroll_sync
                .maybe_emit(*surface, &state, force, &self.bridge.pool)
            {
                Ok(Some(buf)) => self.bridge.queues.to_host.push(buf),
                Ok(None) => {}
                Err(err) => tracing::warn!(?err, %surface, "scroll sync failed"),
            }
        }
    }
}

/// Receives engine callbacks during `do_work` and turns them into paint
/// state updates and host-bound buffers.
struct PumpClient<'a> {
    bridge: &'a Bridge,
    views: &'a mut HashMap<SurfaceHandle, ViewState>,
    request_timeout: Option<Duration>,
}

impl PumpClient<'_> {
    fn view(&mut self, surface: SurfaceHandle) -> Option<&mut ViewState> {
        let view = self.views.get_mut(&surface);
        if view.is_none() {
            tracing::debug!(%surface, "callback for unknown view");
        }
        view
    }

    fn push_event(
        &self,
        surface: SurfaceHandle,
        kind: CommandKind,
        build: impl FnOnce(&mut CommandBuffer) -> Result<()>,
    ) {
        let mut buf = self.bridge.pool.acquire(kind, surface);
        match build(&mut buf) {
            Ok(()) => self.bridge.queues.to_host.push(buf),
            Err(err) => {
                tracing::error!(?err, %surface, "failed to encode engine event");
                self.bridge.pool.release(buf);
            }
        }
    }
}

impl EngineClient for PumpClient<'_> {
    fn on_paint(
        &mut self,
        surface: SurfaceHandle,
        element: PaintElement,
        dirty: &[DirtyRegion],
        pixels: &[u8],
        width: u32,
        height: u32,
    ) {
        let Some(view) = self.view(surface) else {
            return;
        };
        let mut paint = match view.shared.lock() {
            Ok(paint) => paint,
            Err(err) => {
                tracing::error!(?err, %surface, "dropping paint");
                return;
            }
        };
        match element {
            PaintElement::View => {
                if let Err(err) = paint.apply_paint(dirty, pixels, width, height) {
                    tracing::warn!(?err, %surface, "dropping paint");
                }
            }
            PaintElement::Popup => paint.paint_popup(pixels),
        }
    }

    fn on_popup_show(&mut self, surface: SurfaceHandle, visible: bool) {
        if let Some(view) = self.view(surface) {
            match view.shared.lock() {
                Ok(mut paint) => paint.show_popup(visible),
                Err(err) => tracing::error!(?err, %surface, "dropping popup show"),
            }
        }
    }

    fn on_popup_resize(&mut self, surface: SurfaceHandle, x: i32, y: i32, width: u32, height: u32) {
        if let Some(view) = self.view(surface) {
            match view.shared.lock() {
                Ok(mut paint) => paint.resize_popup(x, y, width, height),
                Err(err) => tracing::error!(?err, %surface, "dropping popup resize"),
            }
        }
    }

    fn on_cursor_change(&mut self, surface: SurfaceHandle, cursor: CursorKind) {
        let Some(view) = self.view(surface) else {
            return;
        };
        if view.cursor == Some(cursor) {
            return;
        }
        view.cursor = Some(cursor);
        self.push_event(surface, CommandKind::CursorChanged, |buf| {
            write_cursor(buf, cursor)
        });
    }

    fn on_dialog(
        &mut self,
        surface: SurfaceHandle,
        dialog: DialogRequest,
    ) -> Option<DialogResponse> {
        self.view(surface)?;
        let bridge = self.bridge;
        // The view map lags host teardown by a tick; the surface table does not.
        if !bridge.is_live(surface) {
            tracing::debug!(%surface, "dialog for destroyed surface");
            return None;
        }
        let mut buf = bridge.pool.acquire(dialog.kind(), surface);
        if let Err(err) = buf.write_payload(&dialog) {
            tracing::error!(?err, %surface, "failed to encode dialog request");
            bridge.pool.release(buf);
            return None;
        }

        let deadline = self.request_timeout.map(|timeout| Instant::now() + timeout);
        let reply = bridge.pending.request(
            &bridge.queues.to_host,
            &bridge.pool,
            buf,
            deadline,
            bridge.shutdown_flag(),
            |handle| bridge.is_live(handle),
        )?;
        let response = DialogResponse::decode(&reply);
        bridge.pool.release(reply);
        match response {
            Ok(response) => Some(response),
            Err(err) => {
                tracing::warn!(?err, %surface, "dropping dialog response");
                bridge.stats.record_payload_errors(1);
                None
            }
        }
    }

    fn on_fullscreen_request(&mut self, surface: SurfaceHandle, fullscreen: bool) -> bool {
        matches!(
            self.on_dialog(surface, DialogRequest::Fullscreen { fullscreen }),
            Some(DialogResponse::Fullscreen { allowed: true })
        )
    }

    fn on_navigation(&mut self, surface: SurfaceHandle, event: NavigationEvent) {
        let Some(view) = self.view(surface) else {
            return;
        };
        if let NavigationEvent::Loading(state) = &event {
            if !state.is_loading {
                view.force_scroll = true;
            }
        }
        self.push_event(surface, event.kind(), |buf| write_navigation(buf, &event));
    }
}

struct PumpState {
    lifecycle: PumpLifecycle,
    thread: Option<JoinHandle<()>>,
}

/// Owns the engine thread. Constructed explicitly and shut down explicitly
/// (or on drop).
pub struct EnginePump {
    bridge: Arc<Bridge>,
    settings: PipelineSettings,
    state: Mutex<PumpState>,
}

impl EnginePump {
    pub fn new(bridge: Arc<Bridge>, settings: PipelineSettings) -> Self {
        Self {
            bridge,
            settings,
            state: Mutex::new(PumpState {
                lifecycle: PumpLifecycle::Idle,
                thread: None,
            }),
        }
    }

    pub fn lifecycle(&self) -> PumpLifecycle {
        self.state
            .lock()
            .map(|state| state.lifecycle)
            .unwrap_or(PumpLifecycle::Idle)
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle() == PumpLifecycle::Running
    }

    /// Spawns the engine thread. The engine is built on that thread by
    /// `factory`; its error is returned here if construction fails.
    pub fn start<E, F>(&self, factory: F) -> Result<()>
    where
        E: BrowserEngine + 'static,
        F: FnOnce() -> Result<E> + Send + 'static,
    {
        if self.bridge.is_shutdown() {
            bail!("engine bridge has already been shut down");
        }
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("engine pump lock poisoned"))?;
        if state.lifecycle == PumpLifecycle::Running {
            return Ok(());
        }
        transition_locked(&mut state, PumpLifecycle::Starting)?;

        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);
        let bridge = Arc::clone(&self.bridge);
        let settings = self.settings.clone();
        let spawned = std::thread::Builder::new()
            .name("engine-pump".into())
            .spawn(move || run_pump_thread(bridge, settings, factory, ready_tx));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                transition_locked(&mut state, PumpLifecycle::Idle)?;
                return Err(anyhow!(err).context("failed to spawn engine pump thread"));
            }
        };

        let ready = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(anyhow!("engine pump thread exited during startup")));
        if let Err(err) = ready {
            transition_locked(&mut state, PumpLifecycle::Idle)?;
            join_with_timeout(Some(handle), self.settings.shutdown_join_timeout());
            return Err(err);
        }

        state.thread = Some(handle);
        transition_locked(&mut state, PumpLifecycle::Running)?;
        tracing::info!(ring_depth = self.bridge.ring_depth(), "engine pump started");
        Ok(())
    }

    /// Stops the engine thread. Blocking requests are failed first so the
    /// thread cannot stay parked in the matcher.
    pub fn shutdown(&self) -> Result<()> {
        let thread = {
            let mut state = self
                .state
                .lock()
                .map_err(|_| anyhow!("engine pump lock poisoned"))?;
            if state.lifecycle != PumpLifecycle::Running {
                return Ok(());
            }
            transition_locked(&mut state, PumpLifecycle::Stopping)?;
            state.thread.take()
        };

        self.bridge.request_shutdown();
        join_with_timeout(thread, self.settings.shutdown_join_timeout());

        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("engine pump lock poisoned"))?;
        transition_locked(&mut state, PumpLifecycle::Idle)?;
        tracing::info!("engine pump stopped");
        Ok(())
    }
}

impl Drop for EnginePump {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            tracing::error!(?err, "engine pump shutdown failed");
        }
    }
}

fn transition_locked(state: &mut PumpState, next: PumpLifecycle) -> Result<()> {
    if !can_transition(state.lifecycle, next) {
        return Err(anyhow!(
            "invalid engine pump transition: {:?} -> {:?}",
            state.lifecycle,
            next
        ));
    }
    state.lifecycle = next;
    Ok(())
}

fn run_pump_thread<E, F>(
    bridge: Arc<Bridge>,
    settings: PipelineSettings,
    factory: F,
    ready: crossbeam_channel::Sender<Result<()>>,
) where
    E: BrowserEngine,
    F: FnOnce() -> Result<E>,
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let engine = match factory() {
            Ok(engine) => engine,
            Err(err) => {
                let _ = ready.send(Err(err));
                return;
            }
        };
        let _ = ready.send(Ok(()));
        run_pump(PumpCore::new(Arc::clone(&bridge), engine, &settings), &settings);
    }));

    if let Err(payload) = outcome {
        let panic_message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "unknown panic payload".to_string()
        };
        tracing::error!(panic_message, "engine pump thread panicked");
        // Unblock any host code waiting on this pipeline.
        bridge.request_shutdown();
    }
}

fn run_pump<E: BrowserEngine>(mut core: PumpCore<E>, settings: &PipelineSettings) {
    let interval = settings.tick_interval();
    let wake = Arc::clone(core.bridge.queues.to_engine.wake_event());
    while !core.bridge.is_shutdown() {
        let tick_started = Instant::now();
        core.step();

        let next_tick = tick_started + interval;
        let now = Instant::now();
        if next_tick > now && core.bridge.queues.to_engine.is_empty() {
            wake.wait_timeout(next_tick - now);
        }
    }
    core.teardown();
}

fn join_with_timeout(handle: Option<JoinHandle<()>>, timeout: Duration) {
    let Some(handle) = handle else {
        return;
    };

    let (done_tx, done_rx) = bounded(1);
    std::thread::spawn(move || {
        let join_result = handle.join();
        let _ = done_tx.send(join_result);
    });

    match done_rx.recv_timeout(timeout) {
        Ok(Ok(())) => {}
        Ok(Err(_)) => tracing::error!("engine pump thread panicked while joining"),
        Err(RecvTimeoutError::Timeout) => tracing::error!("engine pump thread join timed out"),
        Err(RecvTimeoutError::Disconnected) => {
            tracing::error!("engine pump thread join channel disconnected")
        }
    }
}
