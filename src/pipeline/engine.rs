use crate::pipeline::dirty::DirtyRegion;
use crate::pipeline::handle::SurfaceHandle;
use crate::pipeline::messages::{
    CursorKind, DialogRequest, DialogResponse, HostAction, NavigationEvent, ScrollState,
    SurfaceSize,
};
use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintElement {
    View,
    Popup,
}

/// Callbacks the embedded engine raises while it runs on the pump thread.
///
/// Every method is invoked synchronously from inside
/// [`BrowserEngine::do_work`], never from the host thread.
pub trait EngineClient {
    /// Raw paint. `pixels` is a full `width` x `height` RGBA frame; only the
    /// `dirty` rectangles are guaranteed fresh.
    fn on_paint(
        &mut self,
        surface: SurfaceHandle,
        element: PaintElement,
        dirty: &[DirtyRegion],
        pixels: &[u8],
        width: u32,
        height: u32,
    );

    fn on_popup_show(&mut self, surface: SurfaceHandle, visible: bool);

    fn on_popup_resize(&mut self, surface: SurfaceHandle, x: i32, y: i32, width: u32, height: u32);

    fn on_cursor_change(&mut self, surface: SurfaceHandle, cursor: CursorKind);

    /// Modal dialog. Blocks until the host answers; `None` means the surface
    /// went away, the pipeline shut down, or the request timed out.
    fn on_dialog(&mut self, surface: SurfaceHandle, dialog: DialogRequest)
        -> Option<DialogResponse>;

    fn on_fullscreen_request(&mut self, surface: SurfaceHandle, fullscreen: bool) -> bool;

    fn on_navigation(&mut self, surface: SurfaceHandle, event: NavigationEvent);
}

/// Synchronous API of the embedded engine. Lives on the pump thread only.
pub trait BrowserEngine {
    fn create_view(&mut self, surface: SurfaceHandle, size: SurfaceSize) -> Result<()>;

    fn destroy_view(&mut self, surface: SurfaceHandle);

    fn handle_action(&mut self, surface: SurfaceHandle, action: &HostAction) -> Result<()>;

    fn scroll_state(&self, surface: SurfaceHandle) -> Option<ScrollState>;

    /// Runs one slice of the engine's internal loop, raising callbacks on
    /// `client`.
    fn do_work(&mut self, client: &mut dyn EngineClient);
}
