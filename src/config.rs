use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::{AudioBackendConfig, AudioSource, DebugConfig};
use crate::client::ClientConfig;
use crate::connection::{ConnectionConfig, DEFAULT_BACKEND_URL};
use crate::session::{CaptureErrorPolicy, SessionConfig};

/// Environment variable prefix, e.g. `BUD_BACKEND__URL`
pub const ENV_PREFIX: &str = "BUD";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub audio: AudioConfig,
    pub debug: DebugSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub url: String,
    pub initial_retry_delay_ms: u64,
    pub max_retries: u32,
    /// Frames queued for the socket before new frames are dropped
    pub send_queue_frames: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_BACKEND_URL.to_string(),
            initial_retry_delay_ms: 1000,
            max_retries: 5,
            send_queue_frames: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureErrorMode {
    Halt,
    Restart,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub buffer_duration_ms: u64,
    /// Replay this WAV file instead of opening the microphone
    pub input: Option<PathBuf>,
    pub on_capture_error: CaptureErrorMode,
    pub max_restarts: u32,
    pub restart_delay_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            buffer_duration_ms: 100,
            input: None,
            on_capture_error: CaptureErrorMode::Halt,
            max_restarts: 3,
            restart_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DebugSettings {
    pub enabled: bool,
    pub dir: PathBuf,
    pub window_ms: u64,
}

impl Default for DebugSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("debug"),
            window_ms: 5000,
        }
    }
}

impl Config {
    /// Load from an optional config file, then `BUD_*` environment variables
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to load config from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn audio_source(&self) -> AudioSource {
        match &self.audio.input {
            Some(path) => AudioSource::File(path.clone()),
            None => AudioSource::Microphone,
        }
    }

    pub fn backend_config(&self) -> AudioBackendConfig {
        AudioBackendConfig {
            target_sample_rate: self.audio.sample_rate,
            target_channels: self.audio.channels,
            buffer_duration_ms: self.audio.buffer_duration_ms,
        }
    }

    pub fn capture_error_policy(&self) -> CaptureErrorPolicy {
        match self.audio.on_capture_error {
            CaptureErrorMode::Halt => CaptureErrorPolicy::Halt,
            CaptureErrorMode::Restart => CaptureErrorPolicy::Restart {
                max_restarts: self.audio.max_restarts,
                delay: Duration::from_millis(self.audio.restart_delay_ms),
            },
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            connection: ConnectionConfig {
                url: self.backend.url.clone(),
                initial_retry_delay: Duration::from_millis(self.backend.initial_retry_delay_ms),
                max_retries: self.backend.max_retries,
            },
            session: SessionConfig {
                debug: DebugConfig {
                    enabled: self.debug.enabled,
                    output_dir: self.debug.dir.clone(),
                    window: Duration::from_millis(self.debug.window_ms),
                },
                on_capture_error: self.capture_error_policy(),
                ..SessionConfig::default()
            },
        }
    }
}
