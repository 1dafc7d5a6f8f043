use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Statistics about the current (or last) capture session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStats {
    /// Whether the capture device is currently running
    pub is_capturing: bool,

    /// When the last explicit start happened
    pub started_at: Option<DateTime<Utc>>,

    /// When capture last stopped, if it is not running
    pub stopped_at: Option<DateTime<Utc>>,

    /// Seconds from `started_at` to `stopped_at` (or now, while capturing)
    pub duration_secs: f64,

    /// Chunks delivered by the device
    pub chunks_captured: usize,

    /// Samples delivered by the device
    pub samples_captured: usize,

    /// Chunks queued to the backend
    pub chunks_forwarded: usize,

    /// Automatic restarts after device errors
    pub restarts: u32,

    /// Debug recordings written during this session
    pub debug_recordings: Vec<PathBuf>,
}
