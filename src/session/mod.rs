//! Capture session management
//!
//! This module provides the `CaptureSession` abstraction that manages:
//! - The capture device lifecycle (start, stop, restart after errors)
//! - The per-session debug window
//! - Conversion and forwarding of chunks to a `FrameSink`
//! - Session statistics

mod config;
mod session;
mod stats;

pub use config::{CaptureErrorPolicy, SessionConfig};
pub use session::{CaptureSession, FailureOutcome, FrameSink, SessionEvent};
pub use stats::SessionStats;
