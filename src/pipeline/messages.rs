use crate::pipeline::command::{CommandBuffer, CommandKind, RequestId};
use crate::pipeline::dirty::DirtyRegion;
use crate::pipeline::handle::SurfaceHandle;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerButton {
    Left,
    Middle,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PointerEventKind {
    Move,
    Down { button: PointerButton },
    Up { button: PointerButton },
    Leave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerInput {
    pub x: i32,
    pub y: i32,
    pub kind: PointerEventKind,
    #[serde(default)]
    pub modifiers: u32,
    #[serde(default)]
    pub click_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WheelInput {
    pub x: i32,
    pub y: i32,
    pub delta_x: i32,
    pub delta_y: i32,
    #[serde(default)]
    pub modifiers: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInput {
    pub key_code: u32,
    #[serde(default)]
    pub character: Option<char>,
    pub pressed: bool,
    #[serde(default)]
    pub modifiers: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameAck {
    pub slot: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramePainted {
    pub slot: u32,
    pub region: DirtyRegion,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorKind {
    Pointer,
    Hand,
    Text,
    Wait,
    Progress,
    Crosshair,
    Move,
    ResizeHorizontal,
    ResizeVertical,
    NotAllowed,
    Hidden,
}

/// Scroll offset and zoom of one surface, diffed by `ScrollSync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollState {
    pub scroll_x: i32,
    pub scroll_y: i32,
    pub zoom_percent: u32,
}

impl Default for ScrollState {
    fn default() -> Self {
        Self {
            scroll_x: 0,
            scroll_y: 0,
            zoom_percent: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoadingState {
    pub is_loading: bool,
    pub can_go_back: bool,
    pub can_go_forward: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavigationEvent {
    AddressChanged { url: String },
    TitleChanged { title: String },
    Loading(LoadingState),
}

impl NavigationEvent {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::AddressChanged { .. } => CommandKind::AddressChanged,
            Self::TitleChanged { .. } => CommandKind::TitleChanged,
            Self::Loading(_) => CommandKind::LoadingState,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChooserMode {
    Open,
    OpenMultiple,
    OpenFolder,
    Save,
}

/// Modal request raised by the engine; the engine thread blocks until the
/// host answers with the matching [`DialogResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "dialog", rename_all = "snake_case")]
pub enum DialogRequest {
    Alert {
        message: String,
    },
    Confirm {
        message: String,
    },
    FileChooser {
        mode: FileChooserMode,
        title: String,
        #[serde(default)]
        default_path: Option<String>,
        #[serde(default)]
        accept_filters: Vec<String>,
    },
    Fullscreen {
        fullscreen: bool,
    },
}

impl DialogRequest {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Alert { .. } => CommandKind::AlertRequest,
            Self::Confirm { .. } => CommandKind::ConfirmRequest,
            Self::FileChooser { .. } => CommandKind::FileChooserRequest,
            Self::Fullscreen { .. } => CommandKind::FullscreenRequest,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "dialog", rename_all = "snake_case")]
pub enum DialogResponse {
    Alert,
    Confirm { accepted: bool },
    /// An empty list means the chooser was cancelled.
    FileChooser { paths: Vec<String> },
    Fullscreen { allowed: bool },
}

impl DialogResponse {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Alert => CommandKind::AlertResult,
            Self::Confirm { .. } => CommandKind::ConfirmResult,
            Self::FileChooser { .. } => CommandKind::FileChooserResult,
            Self::Fullscreen { .. } => CommandKind::FullscreenResult,
        }
    }

    pub fn decode(buf: &CommandBuffer) -> Result<Self> {
        if !buf.kind.is_response() {
            bail!("{:?} does not carry a dialog response", buf.kind);
        }
        let response: DialogResponse = buf.read_payload()?;
        if response.kind() != buf.kind {
            bail!(
                "dialog response {:?} does not match envelope kind {:?}",
                response.kind(),
                buf.kind
            );
        }
        Ok(response)
    }
}

/// User actions the host pushes toward a surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAction {
    Resize(SurfaceSize),
    LoadUrl(String),
    Reload,
    Stop,
    GoBack,
    GoForward,
    Pointer(PointerInput),
    Wheel(WheelInput),
    Key(KeyInput),
    SetZoom(u32),
    GetZoom,
    ScrollTo { x: i32, y: i32 },
    ExecuteScript(String),
    SetFocus(bool),
}

#[derive(Serialize, Deserialize)]
struct UrlPayload {
    url: String,
}

#[derive(Serialize, Deserialize)]
struct ZoomPayload {
    percent: u32,
}

#[derive(Serialize, Deserialize)]
struct ScrollPayload {
    x: i32,
    y: i32,
}

#[derive(Serialize, Deserialize)]
struct ScriptPayload {
    script: String,
}

#[derive(Serialize, Deserialize)]
struct FocusPayload {
    focused: bool,
}

impl HostAction {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Resize(_) => CommandKind::Resize,
            Self::LoadUrl(_) => CommandKind::LoadUrl,
            Self::Reload => CommandKind::Reload,
            Self::Stop => CommandKind::Stop,
            Self::GoBack => CommandKind::GoBack,
            Self::GoForward => CommandKind::GoForward,
            Self::Pointer(_) => CommandKind::Pointer,
            Self::Wheel(_) => CommandKind::Wheel,
            Self::Key(_) => CommandKind::Key,
            Self::SetZoom(_) => CommandKind::SetZoom,
            Self::GetZoom => CommandKind::GetZoom,
            Self::ScrollTo { .. } => CommandKind::ScrollTo,
            Self::ExecuteScript(_) => CommandKind::ExecuteScript,
            Self::SetFocus(_) => CommandKind::SetFocus,
        }
    }

    pub fn write_payload(&self, buf: &mut CommandBuffer) -> Result<()> {
        buf.kind = self.kind();
        match self {
            Self::Resize(size) => buf.write_payload(size),
            Self::LoadUrl(url) => buf.write_payload(&UrlPayload { url: url.clone() }),
            Self::Reload | Self::Stop | Self::GoBack | Self::GoForward | Self::GetZoom => {
                buf.payload.clear();
                Ok(())
            }
            Self::Pointer(input) => buf.write_payload(input),
            Self::Wheel(input) => buf.write_payload(input),
            Self::Key(input) => buf.write_payload(input),
            Self::SetZoom(percent) => buf.write_payload(&ZoomPayload { percent: *percent }),
            Self::ScrollTo { x, y } => buf.write_payload(&ScrollPayload { x: *x, y: *y }),
            Self::ExecuteScript(script) => buf.write_payload(&ScriptPayload {
                script: script.clone(),
            }),
            Self::SetFocus(focused) => buf.write_payload(&FocusPayload { focused: *focused }),
        }
    }

    pub fn decode(buf: &CommandBuffer) -> Result<Self> {
        let action = match buf.kind {
            CommandKind::Resize => Self::Resize(buf.read_payload()?),
            CommandKind::LoadUrl => Self::LoadUrl(buf.read_payload::<UrlPayload>()?.url),
            CommandKind::Reload => Self::Reload,
            CommandKind::Stop => Self::Stop,
            CommandKind::GoBack => Self::GoBack,
            CommandKind::GoForward => Self::GoForward,
            CommandKind::Pointer => Self::Pointer(buf.read_payload()?),
            CommandKind::Wheel => Self::Wheel(buf.read_payload()?),
            CommandKind::Key => Self::Key(buf.read_payload()?),
            CommandKind::SetZoom => Self::SetZoom(buf.read_payload::<ZoomPayload>()?.percent),
            CommandKind::GetZoom => Self::GetZoom,
            CommandKind::ScrollTo => {
                let ScrollPayload { x, y } = buf.read_payload()?;
                Self::ScrollTo { x, y }
            }
            CommandKind::ExecuteScript => {
                Self::ExecuteScript(buf.read_payload::<ScriptPayload>()?.script)
            }
            CommandKind::SetFocus => Self::SetFocus(buf.read_payload::<FocusPayload>()?.focused),
            other => bail!("{other:?} is not a host action"),
        };
        Ok(action)
    }
}

#[derive(Serialize, Deserialize)]
struct CursorPayload {
    cursor: CursorKind,
}

#[derive(Serialize, Deserialize)]
struct TitlePayload {
    title: String,
}

/// Host-bound notifications after coalescing and decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    FramePainted {
        surface: SurfaceHandle,
        frame: FramePainted,
    },
    CursorChanged {
        surface: SurfaceHandle,
        cursor: CursorKind,
    },
    ScrollChanged {
        surface: SurfaceHandle,
        state: ScrollState,
    },
    Navigation {
        surface: SurfaceHandle,
        event: NavigationEvent,
    },
    ScreenshotReady {
        surface: SurfaceHandle,
        size: SurfaceSize,
    },
    Dialog {
        surface: SurfaceHandle,
        request: RequestId,
        dialog: DialogRequest,
    },
}

impl HostEvent {
    pub fn surface(&self) -> SurfaceHandle {
        match self {
            Self::FramePainted { surface, .. }
            | Self::CursorChanged { surface, .. }
            | Self::ScrollChanged { surface, .. }
            | Self::Navigation { surface, .. }
            | Self::ScreenshotReady { surface, .. }
            | Self::Dialog { surface, .. } => *surface,
        }
    }

    pub fn decode(buf: &CommandBuffer) -> Result<Self> {
        let surface = buf.surface;
        let event = match buf.kind {
            CommandKind::FramePainted => Self::FramePainted {
                surface,
                frame: buf.read_payload()?,
            },
            CommandKind::CursorChanged => Self::CursorChanged {
                surface,
                cursor: buf.read_payload::<CursorPayload>()?.cursor,
            },
            CommandKind::ScrollChanged => Self::ScrollChanged {
                surface,
                state: buf.read_payload()?,
            },
            CommandKind::AddressChanged => Self::Navigation {
                surface,
                event: NavigationEvent::AddressChanged {
                    url: buf.read_payload::<UrlPayload>()?.url,
                },
            },
            CommandKind::TitleChanged => Self::Navigation {
                surface,
                event: NavigationEvent::TitleChanged {
                    title: buf.read_payload::<TitlePayload>()?.title,
                },
            },
            CommandKind::LoadingState => Self::Navigation {
                surface,
                event: NavigationEvent::Loading(buf.read_payload()?),
            },
            CommandKind::ScreenshotReady => Self::ScreenshotReady {
                surface,
                size: buf.read_payload()?,
            },
            kind if kind.is_blocking_request() => {
                let Some(request) = buf.request else {
                    bail!("{kind:?} for surface {surface} has no correlation id");
                };
                let dialog: DialogRequest = buf.read_payload()?;
                if dialog.kind() != kind {
                    bail!("dialog {:?} does not match envelope kind {kind:?}", dialog.kind());
                }
                Self::Dialog {
                    surface,
                    request,
                    dialog,
                }
            }
            other => bail!("{other:?} is not a host-bound event"),
        };
        Ok(event)
    }
}

/// Payload for a `CursorChanged` envelope.
pub fn write_cursor(buf: &mut CommandBuffer, cursor: CursorKind) -> Result<()> {
    buf.write_payload(&CursorPayload { cursor })
}

/// Payload for an envelope of kind `event.kind()`.
pub fn write_navigation(buf: &mut CommandBuffer, event: &NavigationEvent) -> Result<()> {
    match event {
        NavigationEvent::AddressChanged { url } => {
            buf.write_payload(&UrlPayload { url: url.clone() })
        }
        NavigationEvent::TitleChanged { title } => buf.write_payload(&TitlePayload {
            title: title.clone(),
        }),
        NavigationEvent::Loading(state) => buf.write_payload(state),
    }
}
