// Shared test doubles: a scripted connector, a channel-fed audio backend and
// a chat surface that records every callback.

#![allow(dead_code)]

use anyhow::{bail, Result};
use bud_stream::audio::{AudioBackend, AudioChunk, CaptureEvent, CreateBackend};
use bud_stream::client::{ChatSurface, StreamStatus};
use bud_stream::connection::{Connector, Link, Peer};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Fail,
    Accept,
}

/// Connector that follows a script of outcomes; once the script runs out,
/// every attempt fails. Accepted peers are handed to the test.
pub struct ScriptedConnector {
    script: Mutex<VecDeque<Step>>,
    attempts: Mutex<Vec<Instant>>,
    peers: mpsc::UnboundedSender<Peer>,
    capacity: usize,
}

impl ScriptedConnector {
    pub fn new(steps: &[Step]) -> (Arc<Self>, mpsc::UnboundedReceiver<Peer>) {
        Self::with_capacity(steps, 64)
    }

    pub fn with_capacity(
        steps: &[Step],
        capacity: usize,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Peer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            script: Mutex::new(steps.iter().copied().collect()),
            attempts: Mutex::new(Vec::new()),
            peers: tx,
            capacity,
        });
        (connector, rx)
    }

    /// When each connect attempt was made
    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, url: &str) -> Result<Link> {
        self.attempts.lock().unwrap().push(Instant::now());
        let step = self.script.lock().unwrap().pop_front().unwrap_or(Step::Fail);

        match step {
            Step::Fail => bail!("connection refused: {}", url),
            Step::Accept => {
                let (link, peer) = Link::channel(self.capacity);
                let _ = self.peers.send(peer);
                Ok(link)
            }
        }
    }
}

/// Backend whose events are pushed by the test
pub struct ChannelBackend {
    feeds: mpsc::UnboundedSender<mpsc::Sender<CaptureEvent>>,
    stops: Arc<AtomicUsize>,
    capturing: bool,
}

#[async_trait::async_trait]
impl AudioBackend for ChannelBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureEvent>> {
        let (tx, rx) = mpsc::channel(256);
        let _ = self.feeds.send(tx);
        self.capturing = true;
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if self.capturing {
            self.capturing = false;
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "channel"
    }
}

/// Creates a `ChannelBackend` per session; each session's event sender is
/// delivered on `feeds`
pub struct ChannelBackends {
    feeds: mpsc::UnboundedSender<mpsc::Sender<CaptureEvent>>,
    pub created: AtomicUsize,
    pub stops: Arc<AtomicUsize>,
}

impl ChannelBackends {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<mpsc::Sender<CaptureEvent>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let backends = Arc::new(Self {
            feeds: tx,
            created: AtomicUsize::new(0),
            stops: Arc::new(AtomicUsize::new(0)),
        });
        (backends, rx)
    }
}

impl CreateBackend for ChannelBackends {
    fn create(&self) -> Result<Box<dyn AudioBackend>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ChannelBackend {
            feeds: self.feeds.clone(),
            stops: Arc::clone(&self.stops),
            capturing: false,
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCall {
    WakeWord,
    Stream(StreamStatus),
    GaveUp(u32),
}

/// Chat surface that forwards every callback to the test
pub struct RecordingSurface {
    calls: mpsc::UnboundedSender<SurfaceCall>,
}

impl RecordingSurface {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<SurfaceCall>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { calls: tx }), rx)
    }
}

impl ChatSurface for RecordingSurface {
    fn wake_word_detected(&self) {
        let _ = self.calls.send(SurfaceCall::WakeWord);
    }

    fn stream_state_changed(&self, status: StreamStatus) {
        let _ = self.calls.send(SurfaceCall::Stream(status));
    }

    fn connection_gave_up(&self, retries: u32) {
        let _ = self.calls.send(SurfaceCall::GaveUp(retries));
    }
}

pub fn chunk(samples: Vec<i16>) -> AudioChunk {
    AudioChunk::new(samples, 0)
}

/// Decode a wire frame back into f32 samples (native byte order)
pub fn decode_frame(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
