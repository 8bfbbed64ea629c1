#![allow(dead_code)]

use anyhow::{bail, Result};
use engine_bridge::pipeline::messages::{
    CursorKind, DialogRequest, DialogResponse, HostAction, NavigationEvent, ScrollState,
    SurfaceSize,
};
use engine_bridge::pipeline::paint::byte_len;
use engine_bridge::pipeline::{BrowserEngine, DirtyRegion, EngineClient, PaintElement, SurfaceHandle};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Arbitrary test code run on the engine thread in the middle of `do_work`.
#[derive(Clone)]
pub struct Hook(pub Arc<dyn Fn() + Send + Sync>);

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Hook")
    }
}

/// One engine callback to raise during the next `do_work`.
#[derive(Debug, Clone)]
pub enum Script {
    Paint {
        surface: SurfaceHandle,
        rects: Vec<DirtyRegion>,
        rgba: [u8; 4],
        width: u32,
        height: u32,
    },
    PopupShow {
        surface: SurfaceHandle,
        visible: bool,
    },
    PopupResize {
        surface: SurfaceHandle,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },
    PopupPaint {
        surface: SurfaceHandle,
        pixels: Vec<u8>,
    },
    Dialog {
        surface: SurfaceHandle,
        dialog: DialogRequest,
    },
    Navigation {
        surface: SurfaceHandle,
        event: NavigationEvent,
    },
    Cursor {
        surface: SurfaceHandle,
        cursor: CursorKind,
    },
    Run(Hook),
}

#[derive(Debug, Default)]
pub struct ProbeState {
    pub script: VecDeque<Script>,
    pub actions: Vec<(SurfaceHandle, HostAction)>,
    pub dialog_results: Vec<Option<DialogResponse>>,
    pub scroll: HashMap<SurfaceHandle, ScrollState>,
    pub created: Vec<SurfaceHandle>,
    pub destroyed: Vec<SurfaceHandle>,
}

/// Test-side view of a [`ScriptedEngine`] that may live on another thread.
#[derive(Debug, Clone, Default)]
pub struct EngineProbe(Arc<Mutex<ProbeState>>);

impl EngineProbe {
    pub fn state(&self) -> MutexGuard<'_, ProbeState> {
        self.0.lock().expect("probe lock")
    }

    pub fn push(&self, script: Script) {
        self.state().script.push_back(script);
    }

    pub fn full_paint(&self, surface: SurfaceHandle, width: u32, height: u32, rgba: [u8; 4]) {
        self.push(Script::Paint {
            surface,
            rects: vec![DirtyRegion::full(width, height)],
            rgba,
            width,
            height,
        });
    }

    pub fn actions_for(&self, surface: SurfaceHandle) -> Vec<HostAction> {
        self.state()
            .actions
            .iter()
            .filter(|(s, _)| *s == surface)
            .map(|(_, action)| action.clone())
            .collect()
    }

    /// Polls until `check` holds or five seconds pass.
    pub fn wait_until(&self, mut check: impl FnMut(&ProbeState) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if check(&self.state()) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }
}

pub struct ScriptedEngine {
    probe: EngineProbe,
}

impl ScriptedEngine {
    pub fn new(probe: EngineProbe) -> Self {
        Self { probe }
    }
}

pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    rgba.iter()
        .copied()
        .cycle()
        .take(byte_len(width, height))
        .collect()
}

impl BrowserEngine for ScriptedEngine {
    fn create_view(&mut self, surface: SurfaceHandle, _size: SurfaceSize) -> Result<()> {
        let mut state = self.probe.state();
        if state.scroll.contains_key(&surface) {
            bail!("duplicate view {surface}");
        }
        state.scroll.insert(surface, ScrollState::default());
        state.created.push(surface);
        Ok(())
    }

    fn destroy_view(&mut self, surface: SurfaceHandle) {
        let mut state = self.probe.state();
        state.scroll.remove(&surface);
        state.destroyed.push(surface);
    }

    fn handle_action(&mut self, surface: SurfaceHandle, action: &HostAction) -> Result<()> {
        let mut state = self.probe.state();
        state.actions.push((surface, action.clone()));
        if let Some(scroll) = state.scroll.get_mut(&surface) {
            match action {
                HostAction::SetZoom(percent) => scroll.zoom_percent = *percent,
                HostAction::ScrollTo { x, y } => {
                    scroll.scroll_x = *x;
                    scroll.scroll_y = *y;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn scroll_state(&self, surface: SurfaceHandle) -> Option<ScrollState> {
        self.probe.state().scroll.get(&surface).copied()
    }

    fn do_work(&mut self, client: &mut dyn EngineClient) {
        // The probe lock is released before each callback; dialogs block.
        loop {
            let Some(script) = self.probe.state().script.pop_front() else {
                break;
            };
            match script {
                Script::Paint {
                    surface,
                    rects,
                    rgba,
                    width,
                    height,
                } => {
                    let pixels = solid(width, height, rgba);
                    client.on_paint(surface, PaintElement::View, &rects, &pixels, width, height);
                }
                Script::PopupShow { surface, visible } => client.on_popup_show(surface, visible),
                Script::PopupResize {
                    surface,
                    x,
                    y,
                    width,
                    height,
                } => client.on_popup_resize(surface, x, y, width, height),
                Script::PopupPaint { surface, pixels } => {
                    client.on_paint(surface, PaintElement::Popup, &[], &pixels, 0, 0)
                }
                Script::Dialog { surface, dialog } => {
                    let result = match dialog {
                        DialogRequest::Fullscreen { fullscreen } => Some(DialogResponse::Fullscreen {
                            allowed: client.on_fullscreen_request(surface, fullscreen),
                        }),
                        dialog => client.on_dialog(surface, dialog),
                    };
                    self.probe.state().dialog_results.push(result);
                }
                Script::Navigation { surface, event } => client.on_navigation(surface, event),
                Script::Cursor { surface, cursor } => client.on_cursor_change(surface, cursor),
                Script::Run(hook) => (hook.0)(),
            }
        }
    }
}
