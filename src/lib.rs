pub mod audio;
pub mod client;
pub mod config;
pub mod connection;
pub mod session;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioChunk, AudioFile, AudioSource,
    CaptureEvent, CreateBackend, DebugCaptureBuffer, DebugConfig, DebugWindow,
};
pub use client::{ChatSurface, ClientConfig, ClientHandle, ClientStatus, StreamStatus, StreamingClient};
pub use config::Config;
pub use connection::{
    ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionState, Connector,
    DetectionEvent, Link, RetryBudget, WsConnector,
};
pub use session::{CaptureErrorPolicy, CaptureSession, SessionConfig, SessionStats};
