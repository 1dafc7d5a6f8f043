use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info};

use super::backend::AudioChunk;
use super::convert::pcm16_le_bytes;

/// How long each session is sampled for offline inspection
pub const DEFAULT_DEBUG_WINDOW: Duration = Duration::from_millis(5000);

/// Debug capture configuration
#[derive(Debug, Clone)]
pub struct DebugConfig {
    /// Whether sessions record a debug window at all
    pub enabled: bool,
    /// Directory for `debug-recording-*.raw` files (created on demand)
    pub output_dir: PathBuf,
    /// Length of the window measured from session start
    pub window: Duration,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_dir: PathBuf::from("debug"),
            window: DEFAULT_DEBUG_WINDOW,
        }
    }
}

/// In-memory recorder that dumps buffered chunks to a raw PCM16 file
#[derive(Debug)]
pub struct DebugCaptureBuffer {
    output_dir: PathBuf,
    chunks: Vec<AudioChunk>,
}

impl DebugCaptureBuffer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            chunks: Vec::new(),
        }
    }

    pub fn record(&mut self, chunk: AudioChunk) {
        self.chunks.push(chunk);
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Take the buffered chunks as a recording ready to be written
    ///
    /// Clears the buffer. Returns `None` when nothing is buffered.
    pub fn take(&mut self) -> Option<PendingRecording> {
        if self.chunks.is_empty() {
            return None;
        }

        let chunks = std::mem::take(&mut self.chunks);
        let bytes: Vec<u8> = chunks
            .iter()
            .flat_map(|chunk| pcm16_le_bytes(&chunk.samples))
            .collect();

        Some(PendingRecording {
            output_dir: self.output_dir.clone(),
            chunks: chunks.len(),
            bytes,
        })
    }

    /// Write all buffered chunks to a new timestamped file and clear the buffer
    ///
    /// Blocks on file I/O. Empty buffers write nothing.
    pub fn flush(&mut self) -> Option<PathBuf> {
        self.take().and_then(PendingRecording::write)
    }
}

/// Buffered debug audio, already encoded as PCM16 LE, waiting to be written
#[derive(Debug)]
pub struct PendingRecording {
    output_dir: PathBuf,
    chunks: usize,
    bytes: Vec<u8>,
}

impl PendingRecording {
    pub fn len_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// Write to a new timestamped file in the debug directory
    ///
    /// Blocking. Write failures are logged and reported as `None`.
    pub fn write(self) -> Option<PathBuf> {
        match write_recording(&self.output_dir, &self.bytes) {
            Ok(path) => {
                info!(
                    "Saved debug recording to {} ({} chunks, {} bytes)",
                    path.display(),
                    self.chunks,
                    self.bytes.len()
                );
                Some(path)
            }
            Err(e) => {
                error!("Failed to save debug recording: {:#}", e);
                None
            }
        }
    }
}

/// File name for a recording made at `at`, e.g.
/// `debug-recording-2025-10-27T14-30-00-123Z.raw`
pub fn recording_file_name(at: chrono::DateTime<chrono::Utc>) -> String {
    let stamp = at
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("debug-recording-{}.raw", stamp)
}

fn write_recording(dir: &Path, bytes: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create debug directory: {:?}", dir))?;

    let name = recording_file_name(chrono::Utc::now());
    let mut path = dir.join(&name);
    let mut suffix = 1;
    while path.exists() {
        let stem = name.trim_end_matches(".raw");
        path = dir.join(format!("{}-{}.raw", stem, suffix));
        suffix += 1;
    }

    fs::write(&path, bytes).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(path)
}

/// The first few seconds of a capture session, kept for format verification
///
/// Opens when the session starts and closes exactly once: either when the
/// first chunk at or past the window boundary arrives, or when the session
/// stops. A closed window never reopens.
#[derive(Debug)]
pub struct DebugWindow {
    buffer: DebugCaptureBuffer,
    started_at: Instant,
    window: Duration,
    active: bool,
}

impl DebugWindow {
    pub fn open(config: &DebugConfig, started_at: Instant) -> Self {
        Self {
            buffer: DebugCaptureBuffer::new(config.output_dir.clone()),
            started_at,
            window: config.window,
            active: true,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn buffered_chunks(&self) -> usize {
        self.buffer.len()
    }

    /// Offer a chunk that arrived at `now`
    ///
    /// Returns the buffered recording when this chunk closed the window.
    pub fn observe(&mut self, chunk: &AudioChunk, now: Instant) -> Option<PendingRecording> {
        if !self.active {
            return None;
        }

        if now.saturating_duration_since(self.started_at) < self.window {
            self.buffer.record(chunk.clone());
            None
        } else {
            self.close()
        }
    }

    /// Close the window and hand over anything buffered. Idempotent.
    pub fn close(&mut self) -> Option<PendingRecording> {
        if !self.active {
            return None;
        }
        self.active = false;
        self.buffer.take()
    }
}
