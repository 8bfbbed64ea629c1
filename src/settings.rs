use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::pipeline::paint::{MAX_RING_DEPTH, MIN_RING_DEPTH};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Paint slots per surface. Clamped to 2..=32 when used.
    #[serde(default = "default_ring_depth")]
    pub ring_depth: usize,
    /// Engine pump ticks per second while idle.
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,
    /// Deadline for modal dialog requests. `None` waits until the host
    /// answers or the surface is destroyed.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    #[serde(default = "default_screenshot_timeout_ms")]
    pub screenshot_timeout_ms: Option<u64>,
    #[serde(default = "default_shutdown_join_timeout_ms")]
    pub shutdown_join_timeout_ms: u64,
    #[serde(default)]
    pub debug_logging: bool,
    /// Optional log file written next to the console output.
    #[serde(default)]
    pub log_file: Option<String>,
}

fn default_ring_depth() -> usize {
    2
}

fn default_target_fps() -> u32 {
    60
}

fn default_screenshot_timeout_ms() -> Option<u64> {
    Some(1000)
}

fn default_shutdown_join_timeout_ms() -> u64 {
    2000
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            ring_depth: default_ring_depth(),
            target_fps: default_target_fps(),
            request_timeout_ms: None,
            screenshot_timeout_ms: default_screenshot_timeout_ms(),
            shutdown_join_timeout_ms: default_shutdown_join_timeout_ms(),
            debug_logging: false,
            log_file: None,
        }
    }
}

impl PipelineSettings {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).unwrap_or_default();
        if content.is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &str) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn ring_depth(&self) -> usize {
        self.ring_depth.clamp(MIN_RING_DEPTH, MAX_RING_DEPTH)
    }

    /// Idle wait between pump ticks.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.target_fps.max(1)))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn screenshot_timeout(&self) -> Option<Duration> {
        self.screenshot_timeout_ms.map(Duration::from_millis)
    }

    pub fn shutdown_join_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_join_timeout_ms)
    }
}
