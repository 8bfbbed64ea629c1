pub mod bridge;
pub mod coalesce;
pub mod command;
pub mod dirty;
pub mod engine;
pub mod handle;
pub mod headless;
pub mod host;
pub mod matcher;
pub mod messages;
pub mod paint;
pub mod popup;
pub mod pump;
pub mod queue;
pub mod scroll_sync;
pub mod state;
pub mod surface;

pub use bridge::{Bridge, BridgeStatsSnapshot};
pub use command::{BufferPool, CommandBuffer, CommandKind, RequestId};
pub use dirty::DirtyRegion;
pub use engine::{BrowserEngine, EngineClient, PaintElement};
pub use handle::{SurfaceHandle, SurfaceTable};
pub use headless::HeadlessEngine;
pub use host::HostBridge;
pub use pump::{EnginePump, PumpCore};
pub use state::PumpLifecycle;
