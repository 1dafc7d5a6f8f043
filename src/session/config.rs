use std::time::Duration;

use crate::audio::DebugConfig;

/// What a capture session does when the device reports an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureErrorPolicy {
    /// Stop capturing until the session is explicitly started again
    Halt,
    /// Restart capture after `delay`, at most `max_restarts` times per explicit start
    Restart { max_restarts: u32, delay: Duration },
}

impl Default for CaptureErrorPolicy {
    fn default() -> Self {
        Self::Halt
    }
}

/// Configuration for a capture session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Identifier used in logs (e.g., "session-<uuid>")
    pub session_id: String,

    /// Debug window recording
    pub debug: DebugConfig,

    /// Device error handling
    pub on_capture_error: CaptureErrorPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            debug: DebugConfig::default(),
            on_capture_error: CaptureErrorPolicy::default(),
        }
    }
}
