use super::config::{CaptureErrorPolicy, SessionConfig};
use super::stats::SessionStats;
use crate::audio::convert::normalize;
use crate::audio::{AudioBackend, AudioChunk, CaptureEvent, CreateBackend, DebugWindow};
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Destination for converted audio
pub trait FrameSink {
    fn is_open(&self) -> bool;

    /// Queue one block of normalized samples; returns whether it was accepted
    fn send(&mut self, samples: &[f32]) -> bool;
}

/// What the capture device produced since the last call to `next_event`
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Chunk(AudioChunk),
    Failed(String),
    /// The device stream closed on its own (e.g. a replay file finished)
    Ended,
    /// A scheduled restart is due; call [`CaptureSession::restart`]
    RestartDue,
}

/// Result of handling a device error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    Halted,
    RestartScheduled(Duration),
}

/// Owns the capture device for one stream of audio
///
/// Each `start` opens a fresh backend and a fresh debug window; a restart
/// after a device error opens a backend only. `stop` is idempotent and
/// flushes the debug window if it is still open. Recordings are written on
/// the blocking pool so chunk handling never waits on the disk.
pub struct CaptureSession {
    config: SessionConfig,
    backends: Arc<dyn CreateBackend>,
    backend: Option<Box<dyn AudioBackend>>,
    events: Option<mpsc::Receiver<CaptureEvent>>,
    debug_window: Option<DebugWindow>,
    restart_at: Option<Instant>,
    writes: JoinSet<Option<PathBuf>>,
    stats: SessionStats,
}

impl CaptureSession {
    pub fn new(config: SessionConfig, backends: Arc<dyn CreateBackend>) -> Self {
        Self {
            config,
            backends,
            backend: None,
            events: None,
            debug_window: None,
            restart_at: None,
            writes: JoinSet::new(),
            stats: SessionStats::default(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.backend.is_some()
    }

    /// Running, or waiting to restart after a device error
    pub fn is_active(&self) -> bool {
        self.is_running() || self.restart_at.is_some()
    }

    pub fn debug_window(&self) -> Option<&DebugWindow> {
        self.debug_window.as_ref()
    }

    pub fn stats(&self) -> SessionStats {
        let mut stats = self.stats.clone();
        stats.is_capturing = self.is_running();
        if let Some(started_at) = stats.started_at {
            let until = stats.stopped_at.unwrap_or_else(Utc::now);
            let elapsed = until.signed_duration_since(started_at);
            stats.duration_secs = elapsed.num_milliseconds() as f64 / 1000.0;
        }
        stats
    }

    /// Start capturing. Starting a running session is a no-op.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            warn!("Capture already started");
            return Ok(());
        }

        info!("Starting audio recording: {}", self.config.session_id);

        self.restart_at = None;
        self.stats = SessionStats {
            started_at: Some(Utc::now()),
            ..SessionStats::default()
        };

        self.open().await?;
        self.debug_window = self
            .config
            .debug
            .enabled
            .then(|| DebugWindow::open(&self.config.debug, Instant::now()));

        Ok(())
    }

    /// Restart after a device error, keeping the session's statistics
    ///
    /// The debug window is not reopened.
    pub async fn restart(&mut self) -> Result<()> {
        self.restart_at = None;
        if self.is_running() {
            return Ok(());
        }

        info!(
            "Restarting audio recording: {} (restart {})",
            self.config.session_id, self.stats.restarts
        );

        self.open().await?;
        self.stats.stopped_at = None;

        Ok(())
    }

    async fn open(&mut self) -> Result<()> {
        let mut backend = self
            .backends
            .create()
            .context("Failed to create audio backend")?;

        let events = backend
            .start()
            .await
            .with_context(|| format!("Failed to start {} capture", backend.name()))?;

        self.backend = Some(backend);
        self.events = Some(events);

        info!("Audio recording started");

        Ok(())
    }

    /// Release the device and flush the debug window. Idempotent.
    ///
    /// Also cancels a scheduled restart and waits for pending recording
    /// writes. Returns the debug recording written by this call, if any.
    pub async fn stop(&mut self) -> Option<PathBuf> {
        self.restart_at = None;

        let mut backend = self.backend.take()?;

        info!("Stopping audio recording: {}", self.config.session_id);

        self.events = None;
        if let Err(e) = backend.stop().await {
            error!("Error stopping recording: {:#}", e);
        }

        self.stats.stopped_at = Some(Utc::now());

        let closed = self.debug_window.take().and_then(|mut window| window.close());
        self.finish_writes().await;

        let recording = closed?;
        let result = tokio::task::spawn_blocking(move || recording.write()).await;
        self.on_write_finished(result)
    }

    /// Wait for the next capture event. Pends forever while idle. Cancel-safe.
    ///
    /// Finished recording writes are collected along the way.
    pub async fn next_event(&mut self) -> SessionEvent {
        loop {
            let capture = Self::next_capture_event(self.restart_at, self.events.as_mut());

            tokio::select! {
                Some(result) = self.writes.join_next(), if !self.writes.is_empty() => {
                    self.on_write_finished(result);
                }
                event = capture => return event,
            }
        }
    }

    async fn next_capture_event(
        restart_at: Option<Instant>,
        events: Option<&mut mpsc::Receiver<CaptureEvent>>,
    ) -> SessionEvent {
        if let Some(at) = restart_at {
            tokio::time::sleep_until(at).await;
            return SessionEvent::RestartDue;
        }

        let Some(events) = events else {
            return std::future::pending().await;
        };

        match events.recv().await {
            Some(CaptureEvent::Chunk(chunk)) => SessionEvent::Chunk(chunk),
            Some(CaptureEvent::Failed(message)) => SessionEvent::Failed(message),
            None => SessionEvent::Ended,
        }
    }

    async fn finish_writes(&mut self) {
        while let Some(result) = self.writes.join_next().await {
            self.on_write_finished(result);
        }
    }

    fn on_write_finished(&mut self, result: Result<Option<PathBuf>, JoinError>) -> Option<PathBuf> {
        match result {
            Ok(Some(path)) => {
                self.stats.debug_recordings.push(path.clone());
                Some(path)
            }
            Ok(None) => None,
            Err(e) => {
                error!("Debug recording task failed: {}", e);
                None
            }
        }
    }

    /// Record a chunk in the debug window and forward it if the sink is open
    ///
    /// Returns whether the chunk was forwarded.
    pub fn handle_chunk(&mut self, chunk: AudioChunk, sink: &mut dyn FrameSink) -> bool {
        self.stats.chunks_captured += 1;
        self.stats.samples_captured += chunk.samples.len();

        if let Some(window) = self.debug_window.as_mut() {
            if let Some(recording) = window.observe(&chunk, Instant::now()) {
                self.writes.spawn_blocking(move || recording.write());
            }
        }

        if !sink.is_open() {
            return false;
        }

        let forwarded = sink.send(&normalize(&chunk.samples));
        if forwarded {
            self.stats.chunks_forwarded += 1;
        }
        forwarded
    }

    /// Apply the capture error policy to a device error
    pub async fn handle_failure(&mut self, message: &str) -> FailureOutcome {
        error!("Recording error: {}", message);

        match self.config.on_capture_error.clone() {
            CaptureErrorPolicy::Restart {
                max_restarts,
                delay,
            } if self.stats.restarts < max_restarts => {
                self.stop().await;
                self.stats.restarts += 1;
                self.restart_at = Some(Instant::now() + delay);
                warn!(
                    "Restarting capture in {:.1} seconds ({}/{})",
                    delay.as_secs_f64(),
                    self.stats.restarts,
                    max_restarts
                );
                FailureOutcome::RestartScheduled(delay)
            }
            _ => {
                self.stop().await;
                warn!("Capture halted until the stream is started again");
                FailureOutcome::Halted
            }
        }
    }
}
