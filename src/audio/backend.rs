use anyhow::Result;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Sample rate expected by the wake word backend
pub const SAMPLE_RATE: u32 = 16000;

/// One block of captured audio (16-bit PCM, little-endian on the wire)
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Raw audio samples (i16 PCM, mono)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioChunk {
    pub fn new(samples: Vec<i16>, timestamp_ms: u64) -> Self {
        Self {
            samples,
            sample_rate: SAMPLE_RATE,
            channels: 1,
            timestamp_ms,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        let per_second = self.sample_rate as u64 * self.channels.max(1) as u64;
        if per_second == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / per_second
    }
}

/// What a capture backend delivers to its session
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// A new block of samples, in arrival order
    Chunk(AudioChunk),
    /// The device reported an error; capture may or may not continue
    Failed(String),
}

/// Configuration for audio backend
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Sample rate requested from the device
    pub target_sample_rate: u32,
    /// Channel count requested from the device (1 = mono)
    pub target_channels: u16,
    /// Buffer size in milliseconds (affects latency and chunk size)
    pub buffer_duration_ms: u64,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: SAMPLE_RATE,
            target_channels: 1,
            buffer_duration_ms: 100,
        }
    }
}

impl AudioBackendConfig {
    /// Number of samples in one buffer at the configured rate
    pub fn samples_per_buffer(&self) -> usize {
        let samples = self.target_sample_rate as u64 * self.target_channels as u64
            * self.buffer_duration_ms
            / 1000;
        samples.max(1) as usize
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - Microphone: default cpal input device
/// - File: replay a 16 kHz mono WAV file at real-time pace
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive capture events. The
    /// channel closes when capture ends.
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureEvent>>;

    /// Stop capturing audio. Stopping an idle backend is a no-op.
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Produces a fresh backend for every capture session
pub trait CreateBackend: Send + Sync {
    fn create(&self) -> Result<Box<dyn AudioBackend>>;
}

/// Audio source type
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Microphone input (default input device)
    Microphone,
    /// File input (for testing and offline replay)
    File(PathBuf),
}

/// Audio backend factory
#[derive(Debug, Clone)]
pub struct AudioBackendFactory {
    source: AudioSource,
    config: AudioBackendConfig,
}

impl AudioBackendFactory {
    pub fn new(source: AudioSource, config: AudioBackendConfig) -> Self {
        Self { source, config }
    }

    /// Create audio backend based on source and configuration
    pub fn build(source: &AudioSource, config: AudioBackendConfig) -> Result<Box<dyn AudioBackend>> {
        match source {
            AudioSource::Microphone => {
                let backend = super::microphone::MicrophoneBackend::new(config);
                Ok(Box::new(backend))
            }

            AudioSource::File(path) => {
                let backend = super::file::FileBackend::open(path, config)?;
                Ok(Box::new(backend))
            }
        }
    }
}

impl CreateBackend for AudioBackendFactory {
    fn create(&self) -> Result<Box<dyn AudioBackend>> {
        Self::build(&self.source, self.config.clone())
    }
}
