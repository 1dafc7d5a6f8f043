use anyhow::{bail, Context, Result};
use hound::WavReader;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::{AudioBackend, AudioBackendConfig, AudioChunk, CaptureEvent};

/// A PCM16 WAV file loaded into memory
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)
            .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;

        let spec = reader.spec();
        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            bail!(
                "Expected 16-bit integer PCM, got {}-bit {:?}",
                spec.bits_per_sample,
                spec.sample_format
            );
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }
}

/// Replays a WAV file as if it were a live microphone
///
/// The file must already match the backend's rate and channel count; chunks
/// are paced at real time.
pub struct FileBackend {
    config: AudioBackendConfig,
    file: AudioFile,
    task: Option<JoinHandle<()>>,
}

impl FileBackend {
    pub fn open(path: impl AsRef<Path>, config: AudioBackendConfig) -> Result<Self> {
        let file = AudioFile::open(path)?;

        if file.sample_rate != config.target_sample_rate || file.channels != config.target_channels
        {
            bail!(
                "Replay file must be {}Hz / {} channels, got {}Hz / {} channels",
                config.target_sample_rate,
                config.target_channels,
                file.sample_rate,
                file.channels
            );
        }

        Ok(Self {
            config,
            file,
            task: None,
        })
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureEvent>> {
        if self.is_capturing() {
            bail!("Already capturing");
        }

        info!("Replaying {} as capture input", self.file.path);

        let (tx, rx) = mpsc::channel(64);
        let samples = self.file.samples.clone();
        let per_buffer = self.config.samples_per_buffer();
        let period = Duration::from_millis(self.config.buffer_duration_ms.max(1));
        let sample_rate = self.config.target_sample_rate;
        let channels = self.config.target_channels;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            let mut timestamp_ms = 0;

            for block in samples.chunks(per_buffer) {
                ticker.tick().await;

                let chunk = AudioChunk {
                    samples: block.to_vec(),
                    sample_rate,
                    channels,
                    timestamp_ms,
                };
                timestamp_ms += chunk.duration_ms();

                if tx.send(CaptureEvent::Chunk(chunk)).await.is_err() {
                    break;
                }
            }

            debug!("Replay finished");
        });

        self.task = Some(task);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("Replay stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn name(&self) -> &str {
        "file replay"
    }
}
