use crate::pipeline::handle::SurfaceHandle;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

// Recycled buffers above this payload capacity are shrunk back.
const MAX_RETAINED_PAYLOAD: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToEngine,
    ToHost,
}

/// Integer tag identifying what a [`CommandBuffer`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum CommandKind {
    CreateSurface = 1,
    DestroySurface = 2,
    Resize = 3,
    LoadUrl = 4,
    Reload = 5,
    Stop = 6,
    GoBack = 7,
    GoForward = 8,
    Pointer = 9,
    Wheel = 10,
    Key = 11,
    SetZoom = 12,
    GetZoom = 13,
    ScrollTo = 14,
    ExecuteScript = 15,
    SetFocus = 16,
    FrameAck = 17,

    AlertResult = 32,
    ConfirmResult = 33,
    FileChooserResult = 34,
    FullscreenResult = 35,

    FramePainted = 64,
    CursorChanged = 65,
    ScrollChanged = 66,
    AddressChanged = 67,
    TitleChanged = 68,
    LoadingState = 69,
    ScreenshotReady = 70,

    AlertRequest = 96,
    ConfirmRequest = 97,
    FileChooserRequest = 98,
    FullscreenRequest = 99,
}

impl CommandKind {
    pub const ALL: [CommandKind; 32] = [
        CommandKind::CreateSurface,
        CommandKind::DestroySurface,
        CommandKind::Resize,
        CommandKind::LoadUrl,
        CommandKind::Reload,
        CommandKind::Stop,
        CommandKind::GoBack,
        CommandKind::GoForward,
        CommandKind::Pointer,
        CommandKind::Wheel,
        CommandKind::Key,
        CommandKind::SetZoom,
        CommandKind::GetZoom,
        CommandKind::ScrollTo,
        CommandKind::ExecuteScript,
        CommandKind::SetFocus,
        CommandKind::FrameAck,
        CommandKind::AlertResult,
        CommandKind::ConfirmResult,
        CommandKind::FileChooserResult,
        CommandKind::FullscreenResult,
        CommandKind::FramePainted,
        CommandKind::CursorChanged,
        CommandKind::ScrollChanged,
        CommandKind::AddressChanged,
        CommandKind::TitleChanged,
        CommandKind::LoadingState,
        CommandKind::ScreenshotReady,
        CommandKind::AlertRequest,
        CommandKind::ConfirmRequest,
        CommandKind::FileChooserRequest,
        CommandKind::FullscreenRequest,
    ];

    pub fn tag(self) -> u16 {
        self as u16
    }

    pub fn from_tag(tag: u16) -> Option<Self> {
        let kind = match tag {
            1 => Self::CreateSurface,
            2 => Self::DestroySurface,
            3 => Self::Resize,
            4 => Self::LoadUrl,
            5 => Self::Reload,
            6 => Self::Stop,
            7 => Self::GoBack,
            8 => Self::GoForward,
            9 => Self::Pointer,
            10 => Self::Wheel,
            11 => Self::Key,
            12 => Self::SetZoom,
            13 => Self::GetZoom,
            14 => Self::ScrollTo,
            15 => Self::ExecuteScript,
            16 => Self::SetFocus,
            17 => Self::FrameAck,
            32 => Self::AlertResult,
            33 => Self::ConfirmResult,
            34 => Self::FileChooserResult,
            35 => Self::FullscreenResult,
            64 => Self::FramePainted,
            65 => Self::CursorChanged,
            66 => Self::ScrollChanged,
            67 => Self::AddressChanged,
            68 => Self::TitleChanged,
            69 => Self::LoadingState,
            70 => Self::ScreenshotReady,
            96 => Self::AlertRequest,
            97 => Self::ConfirmRequest,
            98 => Self::FileChooserRequest,
            99 => Self::FullscreenRequest,
            _ => return None,
        };
        Some(kind)
    }

    pub fn direction(self) -> Direction {
        if self.tag() < 64 {
            Direction::ToEngine
        } else {
            Direction::ToHost
        }
    }

    /// Kind of the reply a blocking request waits for.
    pub fn response_kind(self) -> Option<CommandKind> {
        match self {
            Self::AlertRequest => Some(Self::AlertResult),
            Self::ConfirmRequest => Some(Self::ConfirmResult),
            Self::FileChooserRequest => Some(Self::FileChooserResult),
            Self::FullscreenRequest => Some(Self::FullscreenResult),
            _ => None,
        }
    }

    pub fn is_blocking_request(self) -> bool {
        self.response_kind().is_some()
    }

    pub fn is_response(self) -> bool {
        matches!(
            self,
            Self::AlertResult | Self::ConfirmResult | Self::FileChooserResult | Self::FullscreenResult
        )
    }
}

/// Correlation id tying a blocking request to its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

/// Pooled message envelope crossing the thread boundary.
///
/// Exactly one owner holds a buffer at a time: the pool's free list, one
/// queue, or the code currently processing it.
#[derive(Debug, PartialEq, Eq)]
pub struct CommandBuffer {
    pub kind: CommandKind,
    pub surface: SurfaceHandle,
    pub request: Option<RequestId>,
    pub payload: Vec<u8>,
}

impl CommandBuffer {
    pub fn new(kind: CommandKind, surface: SurfaceHandle) -> Self {
        Self {
            kind,
            surface,
            request: None,
            payload: Vec::new(),
        }
    }

    pub fn write_payload<T: Serialize>(&mut self, value: &T) -> Result<()> {
        self.payload.clear();
        serde_json::to_writer(&mut self.payload, value)
            .with_context(|| format!("failed to encode {:?} payload", self.kind))
    }

    pub fn read_payload<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.payload).with_context(|| {
            format!(
                "failed to decode {:?} payload for surface {}",
                self.kind, self.surface
            )
        })
    }
}

/// Free list of envelopes shared by both threads. Grows without bound.
#[derive(Debug, Default)]
pub struct BufferPool {
    free: Mutex<Vec<CommandBuffer>>,
    allocated: AtomicUsize,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, kind: CommandKind, surface: SurfaceHandle) -> CommandBuffer {
        let recycled = self.free.lock().ok().and_then(|mut free| free.pop());
        match recycled {
            Some(mut buf) => {
                buf.kind = kind;
                buf.surface = surface;
                buf
            }
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                CommandBuffer::new(kind, surface)
            }
        }
    }

    pub fn release(&self, mut buf: CommandBuffer) {
        buf.payload.clear();
        if buf.payload.capacity() > MAX_RETAINED_PAYLOAD {
            buf.payload.shrink_to(MAX_RETAINED_PAYLOAD);
        }
        buf.request = None;
        buf.surface = SurfaceHandle::NONE;
        if let Ok(mut free) = self.free.lock() {
            free.push(buf);
        }
    }

    pub fn free_len(&self) -> usize {
        self.free.lock().map(|free| free.len()).unwrap_or(0)
    }

    /// Envelopes ever allocated by this pool.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip_for_every_kind() {
        for kind in CommandKind::ALL {
            assert_eq!(CommandKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(CommandKind::from_tag(0), None);
        assert_eq!(CommandKind::from_tag(500), None);
    }

    #[test]
    fn blocking_requests_name_their_reply() {
        assert_eq!(
            CommandKind::FileChooserRequest.response_kind(),
            Some(CommandKind::FileChooserResult)
        );
        assert!(CommandKind::FileChooserResult.is_response());
        assert_eq!(CommandKind::LoadUrl.response_kind(), None);
        assert_eq!(CommandKind::LoadUrl.direction(), Direction::ToEngine);
        assert_eq!(CommandKind::FramePainted.direction(), Direction::ToHost);
    }

    #[test]
    fn released_buffers_are_recycled_with_cleared_payload() {
        let pool = BufferPool::new();
        let surface = SurfaceHandle {
            index: 3,
            generation: 2,
        };
        let mut buf = pool.acquire(CommandKind::LoadUrl, surface);
        buf.payload.extend_from_slice(b"payload");
        buf.request = Some(RequestId(9));
        pool.release(buf);
        assert_eq!(pool.free_len(), 1);

        let recycled = pool.acquire(CommandKind::Reload, SurfaceHandle::NONE);
        assert_eq!(recycled.kind, CommandKind::Reload);
        assert!(recycled.payload.is_empty());
        assert_eq!(recycled.request, None);
        assert_eq!(pool.allocated(), 1);
        assert_eq!(pool.free_len(), 0);
    }

    #[test]
    fn pool_grows_when_free_list_is_empty() {
        let pool = BufferPool::new();
        let held: Vec<_> = (0..16)
            .map(|_| pool.acquire(CommandKind::Key, SurfaceHandle::NONE))
            .collect();
        assert_eq!(pool.allocated(), 16);
        for buf in held {
            pool.release(buf);
        }
        assert_eq!(pool.free_len(), 16);
    }

    #[test]
    fn payload_decode_failure_is_reported() {
        let mut buf = CommandBuffer::new(CommandKind::Resize, SurfaceHandle::NONE);
        buf.payload.extend_from_slice(b"{not json");
        let decoded: Result<u32> = buf.read_payload();
        assert!(decoded.is_err());
    }
}
