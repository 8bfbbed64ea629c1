use crate::pipeline::dirty::DirtyRegion;
use crate::pipeline::engine::{BrowserEngine, EngineClient, PaintElement};
use crate::pipeline::handle::SurfaceHandle;
use crate::pipeline::messages::{
    CursorKind, DialogRequest, HostAction, LoadingState, NavigationEvent, PointerEventKind,
    ScrollState, SurfaceSize,
};
use crate::pipeline::paint::byte_len;
use anyhow::{bail, Result};
use std::collections::{HashMap, VecDeque};

const BLANK_URL: &str = "about:blank";

#[derive(Debug)]
struct HeadlessView {
    size: SurfaceSize,
    history: Vec<String>,
    position: usize,
    scroll: ScrollState,
    needs_paint: bool,
    events: VecDeque<NavigationEvent>,
    cursor: Option<CursorKind>,
    dialogs: VecDeque<DialogRequest>,
}

impl HeadlessView {
    fn new(size: SurfaceSize) -> Self {
        Self {
            size,
            history: vec![BLANK_URL.to_string()],
            position: 0,
            scroll: ScrollState::default(),
            needs_paint: true,
            events: VecDeque::new(),
            cursor: None,
            dialogs: VecDeque::new(),
        }
    }

    fn url(&self) -> &str {
        self.history
            .get(self.position)
            .map(String::as_str)
            .unwrap_or(BLANK_URL)
    }

    fn loading_state(&self, is_loading: bool) -> LoadingState {
        LoadingState {
            is_loading,
            can_go_back: self.position > 0,
            can_go_forward: self.position + 1 < self.history.len(),
        }
    }

    /// A navigation completes within one work slice: started, committed,
    /// finished.
    fn navigated(&mut self) {
        let url = self.url().to_string();
        let started = self.loading_state(true);
        let finished = self.loading_state(false);
        self.events.extend([
            NavigationEvent::Loading(started),
            NavigationEvent::AddressChanged { url: url.clone() },
            NavigationEvent::TitleChanged { title: url },
            NavigationEvent::Loading(finished),
        ]);
        self.scroll.scroll_x = 0;
        self.scroll.scroll_y = 0;
        self.needs_paint = true;
    }

    fn colour(&self) -> [u8; 4] {
        let hash = self
            .url()
            .bytes()
            .fold(0x811c_9dc5u32, |hash, byte| {
                (hash ^ u32::from(byte)).wrapping_mul(0x0100_0193)
            });
        let [r, g, b, _] = hash.to_le_bytes();
        [r, g, b, 255]
    }
}

/// Engine stand-in that paints each view a solid colour derived from its
/// URL. Used by the binary and for exercising the pipeline without a real
/// browser.
#[derive(Debug, Default)]
pub struct HeadlessEngine {
    views: HashMap<SurfaceHandle, HeadlessView>,
}

impl HeadlessEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BrowserEngine for HeadlessEngine {
    fn create_view(&mut self, surface: SurfaceHandle, size: SurfaceSize) -> Result<()> {
        if self.views.contains_key(&surface) {
            bail!("view {surface} already exists");
        }
        self.views.insert(surface, HeadlessView::new(size));
        Ok(())
    }

    fn destroy_view(&mut self, surface: SurfaceHandle) {
        self.views.remove(&surface);
    }

    fn handle_action(&mut self, surface: SurfaceHandle, action: &HostAction) -> Result<()> {
        let Some(view) = self.views.get_mut(&surface) else {
            bail!("no view for surface {surface}");
        };
        match action {
            HostAction::Resize(size) => {
                view.size = *size;
                view.needs_paint = true;
            }
            HostAction::LoadUrl(url) => {
                view.history.truncate(view.position + 1);
                view.history.push(url.clone());
                view.position = view.history.len() - 1;
                view.navigated();
            }
            HostAction::Reload => view.navigated(),
            HostAction::Stop => {
                let stopped = view.loading_state(false);
                view.events.push_back(NavigationEvent::Loading(stopped));
            }
            HostAction::GoBack => {
                if view.position > 0 {
                    view.position -= 1;
                    view.navigated();
                }
            }
            HostAction::GoForward => {
                if view.position + 1 < view.history.len() {
                    view.position += 1;
                    view.navigated();
                }
            }
            HostAction::Pointer(input) => {
                view.cursor = Some(match input.kind {
                    PointerEventKind::Leave => CursorKind::Pointer,
                    _ if input.y < 32 => CursorKind::Text,
                    _ => CursorKind::Hand,
                });
            }
            HostAction::Wheel(input) => {
                view.scroll.scroll_x = view.scroll.scroll_x.saturating_sub(input.delta_x).max(0);
                view.scroll.scroll_y = view.scroll.scroll_y.saturating_sub(input.delta_y).max(0);
            }
            HostAction::Key(_) | HostAction::SetFocus(_) | HostAction::GetZoom => {}
            HostAction::SetZoom(percent) => view.scroll.zoom_percent = (*percent).clamp(25, 500),
            HostAction::ScrollTo { x, y } => {
                view.scroll.scroll_x = (*x).max(0);
                view.scroll.scroll_y = (*y).max(0);
            }
            HostAction::ExecuteScript(script) => {
                if let Some(message) = script.strip_prefix("alert:") {
                    view.dialogs.push_back(DialogRequest::Alert {
                        message: message.to_string(),
                    });
                } else if let Some(message) = script.strip_prefix("confirm:") {
                    view.dialogs.push_back(DialogRequest::Confirm {
                        message: message.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn scroll_state(&self, surface: SurfaceHandle) -> Option<ScrollState> {
        self.views.get(&surface).map(|view| view.scroll)
    }

    fn do_work(&mut self, client: &mut dyn EngineClient) {
        for (surface, view) in self.views.iter_mut() {
            while let Some(event) = view.events.pop_front() {
                client.on_navigation(*surface, event);
            }
            if let Some(cursor) = view.cursor.take() {
                client.on_cursor_change(*surface, cursor);
            }
            while let Some(dialog) = view.dialogs.pop_front() {
                let response = client.on_dialog(*surface, dialog);
                tracing::debug!(%surface, ?response, "headless dialog answered");
            }
            if std::mem::take(&mut view.needs_paint) {
                let SurfaceSize { width, height } = view.size;
                let pixels: Vec<u8> = view
                    .colour()
                    .iter()
                    .copied()
                    .cycle()
                    .take(byte_len(width, height))
                    .collect();
                client.on_paint(
                    *surface,
                    PaintElement::View,
                    &[DirtyRegion::full(width, height)],
                    &pixels,
                    width,
                    height,
                );
            }
        }
    }
}
