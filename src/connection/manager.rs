use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::link::{Connector, Inbound, Link};
use super::messages::DetectionEvent;
use super::retry::RetryBudget;
use crate::audio::convert::to_wire_bytes;

/// Default wake word backend endpoint
pub const DEFAULT_BACKEND_URL: &str = "ws://localhost:8765";

/// Lifecycle of the backend connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    ClosedPendingRetry,
}

/// Something the owner of the manager needs to react to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The connection is open; audio may flow
    Established,
    /// The backend reported a wake word
    WakeWord(DetectionEvent),
    /// Every retry failed; the manager stays disconnected until restarted
    GaveUp { retries: u32 },
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Backend WebSocket URL
    pub url: String,
    /// Delay before the first retry; doubles for every further retry
    pub initial_retry_delay: Duration,
    /// Number of retries before giving up
    pub max_retries: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_BACKEND_URL.to_string(),
            initial_retry_delay: Duration::from_millis(1000),
            max_retries: 5,
        }
    }
}

/// Owns the link to the wake word backend
///
/// All methods are synchronous state transitions except [`next_event`],
/// which drives in-flight connects, retry timers and inbound messages.
/// The manager is meant to be owned by a single task.
///
/// [`next_event`]: ConnectionManager::next_event
pub struct ConnectionManager {
    config: ConnectionConfig,
    connector: Arc<dyn Connector>,
    state: ConnectionState,
    budget: RetryBudget,
    link: Option<Link>,
    pending: Option<JoinHandle<Result<Link>>>,
    retry_at: Option<Instant>,
    frames_sent: u64,
    frames_dropped: u64,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, connector: Arc<dyn Connector>) -> Self {
        let budget = RetryBudget::new(config.max_retries, config.initial_retry_delay);
        Self {
            config,
            connector,
            state: ConnectionState::Disconnected,
            budget,
            link: None,
            pending: None,
            retry_at: None,
            frames_sent: 0,
            frames_dropped: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Retries consumed since the last successful connection
    pub fn attempt(&self) -> u32 {
        self.budget.attempt()
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    /// Forget earlier failures so the next failure starts backing off from scratch
    pub fn reset_budget(&mut self) {
        self.budget.reset();
    }

    /// Begin connecting unless a connection is open or already being opened
    ///
    /// A pending retry is replaced by an immediate attempt. The outcome is
    /// reported through [`ConnectionManager::next_event`].
    pub fn connect(&mut self) {
        match self.state {
            ConnectionState::Open | ConnectionState::Connecting => {
                debug!("Connect ignored, connection is {:?}", self.state);
                return;
            }
            ConnectionState::ClosedPendingRetry => {
                self.retry_at = None;
            }
            ConnectionState::Disconnected => {}
        }

        self.begin_connect();
    }

    /// Queue one block of normalized samples as a binary frame
    ///
    /// No-op unless the connection is open. Never waits: if the transport is
    /// congested the frame is dropped. Returns whether the frame was queued.
    pub fn send(&mut self, samples: &[f32]) -> bool {
        if self.state != ConnectionState::Open {
            return false;
        }
        let Some(link) = &self.link else {
            return false;
        };

        match link.outbound.try_send(to_wire_bytes(samples)) {
            Ok(()) => {
                self.frames_sent += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                self.frames_dropped += 1;
                debug!("Backend congested, dropping audio frame");
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.frames_dropped += 1;
                false
            }
        }
    }

    /// Shut the connection down and cancel any pending retry. Idempotent.
    pub fn close(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
        self.retry_at = None;
        self.budget.reset();

        if self.link.take().is_some() || self.state != ConnectionState::Disconnected {
            info!("Closing backend connection");
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Wait for the next event worth reporting to the owner
    ///
    /// Retries, ignored messages and malformed messages are handled here.
    /// Pends forever while disconnected. Cancel-safe: dropping the future
    /// leaves the manager in a consistent state.
    pub async fn next_event(&mut self) -> ConnectionEvent {
        loop {
            if let Some(pending) = self.pending.as_mut() {
                let result = pending.await;
                self.pending = None;

                match result {
                    Ok(Ok(link)) => {
                        self.on_established(link);
                        return ConnectionEvent::Established;
                    }
                    Ok(Err(e)) => {
                        if let Some(event) = self.on_failure(&format!("{:#}", e)) {
                            return event;
                        }
                    }
                    Err(e) => {
                        if let Some(event) = self.on_failure(&format!("connect task failed: {}", e)) {
                            return event;
                        }
                    }
                }
                continue;
            }

            if let Some(at) = self.retry_at {
                tokio::time::sleep_until(at).await;
                self.retry_at = None;
                self.begin_connect();
                continue;
            }

            if let Some(link) = self.link.as_mut() {
                let received = link.inbound.recv().await;

                match received {
                    Some(Inbound::Text(text)) => {
                        if let Some(event) = Self::handle_text(&text) {
                            return ConnectionEvent::WakeWord(event);
                        }
                    }
                    Some(Inbound::Closed(reason)) => {
                        let reason = reason.unwrap_or_else(|| "connection closed".to_string());
                        if let Some(event) = self.on_failure(&reason) {
                            return event;
                        }
                    }
                    None => {
                        if let Some(event) = self.on_failure("transport dropped") {
                            return event;
                        }
                    }
                }
                continue;
            }

            return std::future::pending().await;
        }
    }

    fn begin_connect(&mut self) {
        info!(
            "Attempting to connect to backend {} (retry {}/{})",
            self.config.url,
            self.budget.attempt(),
            self.budget.ceiling()
        );

        self.state = ConnectionState::Connecting;

        let connector = Arc::clone(&self.connector);
        let url = self.config.url.clone();
        self.pending = Some(tokio::spawn(async move { connector.connect(&url).await }));
    }

    fn on_established(&mut self, link: Link) {
        info!("Connected to wake word detection endpoint");
        self.link = Some(link);
        self.budget.reset();
        self.state = ConnectionState::Open;
    }

    fn on_failure(&mut self, reason: &str) -> Option<ConnectionEvent> {
        self.link = None;
        error!("Backend connection error: {}", reason);

        match self.budget.next_delay() {
            Some(delay) => {
                warn!(
                    "Retrying connection in {:.1} seconds (retry {}/{})",
                    delay.as_secs_f64(),
                    self.budget.attempt(),
                    self.budget.ceiling()
                );
                self.state = ConnectionState::ClosedPendingRetry;
                self.retry_at = Some(Instant::now() + delay);
                None
            }
            None => {
                error!("Max retries reached. Could not connect to backend.");
                self.state = ConnectionState::Disconnected;
                Some(ConnectionEvent::GaveUp {
                    retries: self.budget.attempt(),
                })
            }
        }
    }

    fn handle_text(text: &str) -> Option<DetectionEvent> {
        debug!("Received raw message from backend: {}", text);

        match DetectionEvent::parse(text) {
            Ok(event) if event.is_wake_word() => {
                info!("Wake word detected");
                Some(event)
            }
            Ok(event) => {
                debug!("Ignoring backend message of type {:?}", event.kind);
                None
            }
            Err(e) => {
                warn!("Error parsing message from backend: {}", e);
                None
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }
}

impl crate::session::FrameSink for ConnectionManager {
    fn is_open(&self) -> bool {
        ConnectionManager::is_open(self)
    }

    fn send(&mut self, samples: &[f32]) -> bool {
        ConnectionManager::send(self, samples)
    }
}
