// Microphone backend using cpal's default input device

use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioChunk, CaptureEvent};
use super::convert::{f32_to_pcm16, normalize};
use super::resample::MonoConverter;

/// Microphone audio backend
///
/// cpal streams are not `Send`, so the stream lives on a dedicated thread
/// that owns it until `stop` is called. Devices without a native 16 kHz
/// mono input are captured at their default format and converted.
pub struct MicrophoneBackend {
    config: AudioBackendConfig,
    worker: Option<Worker>,
}

struct Worker {
    stop_tx: std_mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

impl MicrophoneBackend {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self {
            config,
            worker: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureEvent>> {
        if self.worker.is_some() {
            bail!("Already capturing");
        }

        info!(
            "Starting microphone capture ({}Hz, {} channels)",
            self.config.target_sample_rate, self.config.target_channels
        );

        let (event_tx, event_rx) = mpsc::channel(256);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel();
        let config = self.config.clone();

        let thread = std::thread::Builder::new()
            .name("bud-microphone".to_string())
            .spawn(move || run_stream(config, event_tx, ready_tx, stop_rx))
            .context("Failed to spawn microphone thread")?;

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                bail!("Microphone thread exited before capture started");
            }
        }

        self.worker = Some(Worker { stop_tx, thread });

        info!("Microphone capture started successfully");

        Ok(event_rx)
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        info!("Stopping microphone capture");

        let _ = worker.stop_tx.send(());
        tokio::task::spawn_blocking(move || worker.thread.join())
            .await
            .context("Microphone join task failed")?
            .map_err(|_| anyhow!("Microphone thread panicked"))?;

        info!("Microphone capture stopped");

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.worker.is_some()
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

impl Drop for MicrophoneBackend {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
        }
    }
}

fn run_stream(
    config: AudioBackendConfig,
    event_tx: mpsc::Sender<CaptureEvent>,
    ready_tx: oneshot::Sender<Result<()>>,
    stop_rx: std_mpsc::Receiver<()>,
) {
    let stream = match build_stream(&config, event_tx) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(anyhow!("Failed to start input stream: {}", e)));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    // Park until stop is requested or the backend is dropped
    let _ = stop_rx.recv();
    drop(stream);
    debug!("Microphone stream released");
}

fn build_stream(
    config: &AudioBackendConfig,
    event_tx: mpsc::Sender<CaptureEvent>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    let rate = SampleRate(config.target_sample_rate);
    let native = device
        .supported_input_configs()
        .context("Failed to query input configs")?
        .filter(|c| {
            c.channels() == config.target_channels
                && c.min_sample_rate() <= rate
                && c.max_sample_rate() >= rate
                && matches!(c.sample_format(), SampleFormat::I16 | SampleFormat::F32)
        })
        // Prefer native i16 over f32
        .min_by_key(|c| match c.sample_format() {
            SampleFormat::I16 => 0,
            _ => 1,
        });

    let (stream_config, format, converter) = match native {
        Some(supported) => {
            let format = supported.sample_format();
            let stream_config: StreamConfig = supported.with_sample_rate(rate).config();
            (stream_config, format, None)
        }
        None => {
            if config.target_channels != 1 {
                bail!(
                    "No input config for {}Hz / {} channels",
                    config.target_sample_rate,
                    config.target_channels
                );
            }

            let default = device
                .default_input_config()
                .context("Failed to query default input config")?;
            info!(
                "No native {}Hz mono input, converting from {}Hz / {} channels",
                config.target_sample_rate,
                default.sample_rate().0,
                default.channels()
            );

            let converter = MonoConverter::new(
                default.sample_rate().0,
                default.channels(),
                config.target_sample_rate,
                config.buffer_duration_ms,
            )?;
            (default.config(), default.sample_format(), Some(converter))
        }
    };

    info!(
        "Microphone device: {} ({:?}, {}Hz, {} channels)",
        device.name().unwrap_or_default(),
        format,
        stream_config.sample_rate.0,
        stream_config.channels
    );

    let mut emitter = ChunkEmitter {
        event_tx: event_tx.clone(),
        sample_rate: config.target_sample_rate,
        channels: config.target_channels,
        samples_seen: 0,
        converter,
    };

    let on_error = move |err: cpal::StreamError| {
        error!("Recording error: {}", err);
        if event_tx.try_send(CaptureEvent::Failed(err.to_string())).is_err() {
            warn!("Could not report capture error to session");
        }
    };

    let stream = match format {
        SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| emitter.push_i16(data),
            on_error,
            None,
        ),
        SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| emitter.push_f32(data),
            on_error,
            None,
        ),
        other => bail!("Unsupported input sample format: {:?}", other),
    }
    .context("Failed to build input stream")?;

    Ok(stream)
}

/// Turns device callbacks into chunks in the backend's format
///
/// Runs on cpal's callback thread, so it never blocks: a full queue drops
/// the chunk.
struct ChunkEmitter {
    event_tx: mpsc::Sender<CaptureEvent>,
    sample_rate: u32,
    channels: u16,
    samples_seen: u64,
    converter: Option<MonoConverter>,
}

impl ChunkEmitter {
    fn push_i16(&mut self, data: &[i16]) {
        if self.converter.is_none() {
            self.emit(data.to_vec());
        } else {
            self.push_f32(&normalize(data));
        }
    }

    fn push_f32(&mut self, data: &[f32]) {
        let converted = match self.converter.as_mut() {
            None => Ok(data.to_vec()),
            Some(converter) => converter.push(data),
        };

        match converted {
            Ok(samples) if samples.is_empty() => {}
            Ok(samples) => self.emit(samples.iter().map(|&s| f32_to_pcm16(s)).collect()),
            Err(e) => {
                error!("Recording error: {:#}", e);
                let _ = self
                    .event_tx
                    .try_send(CaptureEvent::Failed(format!("{:#}", e)));
            }
        }
    }

    fn emit(&mut self, samples: Vec<i16>) {
        let per_second = (self.sample_rate as u64 * self.channels as u64).max(1);
        let chunk = AudioChunk {
            sample_rate: self.sample_rate,
            channels: self.channels,
            timestamp_ms: self.samples_seen * 1000 / per_second,
            samples,
        };
        self.samples_seen += chunk.samples.len() as u64;

        if self.event_tx.try_send(CaptureEvent::Chunk(chunk)).is_err() {
            debug!("Capture queue full, dropping chunk");
        }
    }
}
