pub mod backend;
pub mod convert;
pub mod debug;
pub mod file;
pub mod microphone;
pub mod resample;

pub use backend::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioChunk, AudioSource, CaptureEvent,
    CreateBackend, SAMPLE_RATE,
};
pub use debug::{DebugCaptureBuffer, DebugConfig, DebugWindow, PendingRecording};
pub use file::{AudioFile, FileBackend};
pub use microphone::MicrophoneBackend;
