//! The streaming client actor
//!
//! One task owns the connection manager and the capture session. Every
//! external request arrives as a [`Command`] on an unbounded channel, so the
//! methods on [`ClientHandle`] never block and may be called from anywhere,
//! including from inside a [`ChatSurface`] callback made by the client itself.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::audio::CreateBackend;
use crate::connection::{
    ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionState, Connector,
};
use crate::session::{CaptureSession, FailureOutcome, SessionConfig, SessionEvent, SessionStats};

/// Whether audio is currently flowing from the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StreamStatus {
    Resumed,
    Stopped,
}

/// The UI layer, as seen from the streaming client
///
/// Callbacks run on the client task and must not block. To pause or resume
/// the stream from a callback, use a [`ClientHandle`].
pub trait ChatSurface: Send + Sync {
    /// Show or create the chat surface
    fn wake_word_detected(&self);

    /// Capture started or stopped
    fn stream_state_changed(&self, _status: StreamStatus) {}

    /// Every reconnect failed; wake word detection is unavailable until restarted
    fn connection_gave_up(&self, _retries: u32) {}
}

/// Snapshot of the client's state
#[derive(Debug, Clone, Serialize)]
pub struct ClientStatus {
    pub connection: ConnectionState,
    pub attempt: u32,
    pub streaming_requested: bool,
    /// Capture stopped on a device error or end of stream; only `start` clears it
    pub capture_halted: bool,
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub session: SessionStats,
}

#[derive(Debug)]
enum Command {
    Start,
    Stop,
    ChatShown,
    ChatClosed,
    Status(oneshot::Sender<ClientStatus>),
    Shutdown,
}

/// Cheap, cloneable handle for controlling a running client
#[derive(Debug, Clone)]
pub struct ClientHandle {
    tx: mpsc::UnboundedSender<Command>,
}

/// Receiving end of a [`ClientHandle`], consumed by [`StreamingClient::new`]
#[derive(Debug)]
pub struct Inbox {
    rx: mpsc::UnboundedReceiver<Command>,
}

/// Create a handle before the client exists, e.g. to give it to a `ChatSurface`
pub fn channel() -> (ClientHandle, Inbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ClientHandle { tx }, Inbox { rx })
}

impl ClientHandle {
    /// Connect (if needed) and start streaming
    pub fn start(&self) -> Result<()> {
        self.send(Command::Start)
    }

    /// Stop capture and close the connection
    pub fn stop(&self) -> Result<()> {
        self.send(Command::Stop)
    }

    /// The chat surface became visible; pause the stream
    pub fn chat_shown(&self) -> Result<()> {
        self.send(Command::ChatShown)
    }

    /// The chat surface closed; resume the stream
    pub fn chat_closed(&self) -> Result<()> {
        self.send(Command::ChatClosed)
    }

    pub async fn status(&self) -> Result<ClientStatus> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Status(tx))?;
        rx.await.map_err(|_| anyhow!("Streaming client has shut down"))
    }

    /// Stop streaming and end the client task
    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| anyhow!("Streaming client has shut down"))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub connection: ConnectionConfig,
    pub session: SessionConfig,
}

pub struct StreamingClient {
    connection: ConnectionManager,
    session: CaptureSession,
    surface: Arc<dyn ChatSurface>,
    inbox: Inbox,
    streaming_requested: bool,
    capture_halted: bool,
}

impl StreamingClient {
    pub fn new(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        backends: Arc<dyn CreateBackend>,
        surface: Arc<dyn ChatSurface>,
        inbox: Inbox,
    ) -> Self {
        Self {
            connection: ConnectionManager::new(config.connection, connector),
            session: CaptureSession::new(config.session, backends),
            surface,
            inbox,
            streaming_requested: false,
            capture_halted: false,
        }
    }

    /// Build a client and run it on a new task
    pub fn spawn(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        backends: Arc<dyn CreateBackend>,
        surface: Arc<dyn ChatSurface>,
    ) -> (ClientHandle, JoinHandle<Result<()>>) {
        let (handle, inbox) = channel();
        let client = Self::new(config, connector, backends, surface, inbox);
        (handle, tokio::spawn(client.run()))
    }

    /// Process commands and events until shut down or every handle is dropped
    pub async fn run(mut self) -> Result<()> {
        info!("Streaming client running");

        loop {
            tokio::select! {
                command = self.inbox.rx.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                event = self.connection.next_event() => self.handle_connection_event(event).await,
                event = self.session.next_event() => self.handle_session_event(event).await,
            }
        }

        self.stop_stream().await;
        info!("Streaming client stopped");

        Ok(())
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start => self.start_stream().await,
            Command::Stop => self.stop_stream().await,
            Command::ChatShown => {
                info!("Chat surface shown, pausing audio stream");
                self.stop_stream().await;
            }
            Command::ChatClosed => {
                info!("Chat surface closed, resuming audio stream");
                self.start_stream().await;
            }
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
            Command::Shutdown => {}
        }
    }

    async fn handle_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Established => {
                if self.streaming_requested && !self.capture_halted && !self.session.is_active() {
                    self.start_capture().await;
                }
            }
            ConnectionEvent::WakeWord(_) => {
                info!("Wake word detected! Opening chat surface");
                self.surface.wake_word_detected();
            }
            ConnectionEvent::GaveUp { retries } => {
                self.surface.connection_gave_up(retries);
            }
        }
    }

    async fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Chunk(chunk) => {
                self.session.handle_chunk(chunk, &mut self.connection);
            }
            SessionEvent::Failed(message) => {
                if self.session.handle_failure(&message).await == FailureOutcome::Halted {
                    self.capture_halted = true;
                    self.surface.stream_state_changed(StreamStatus::Stopped);
                }
            }
            SessionEvent::Ended => {
                info!("Capture stream ended");
                self.session.stop().await;
                self.capture_halted = true;
                self.surface.stream_state_changed(StreamStatus::Stopped);
            }
            SessionEvent::RestartDue => {
                if let Err(e) = self.session.restart().await {
                    error!("Failed to restart recording: {:#}", e);
                    self.capture_halted = true;
                    self.surface.stream_state_changed(StreamStatus::Stopped);
                }
            }
        }
    }

    async fn start_stream(&mut self) {
        self.streaming_requested = true;
        self.capture_halted = false;
        self.connection.reset_budget();

        if self.connection.is_open() {
            if !self.session.is_active() {
                self.start_capture().await;
            }
        } else {
            self.connection.connect();
        }
    }

    /// Stop capture and close the connection. Idempotent.
    async fn stop_stream(&mut self) {
        self.streaming_requested = false;

        let was_active = self.session.is_active();
        self.session.stop().await;
        self.connection.close();

        if was_active {
            self.surface.stream_state_changed(StreamStatus::Stopped);
        }
    }

    async fn start_capture(&mut self) {
        match self.session.start().await {
            Ok(()) => self.surface.stream_state_changed(StreamStatus::Resumed),
            Err(e) => {
                error!("Failed to start recording: {:#}", e);
                self.capture_halted = true;
            }
        }
    }

    fn status(&self) -> ClientStatus {
        ClientStatus {
            connection: self.connection.state(),
            attempt: self.connection.attempt(),
            streaming_requested: self.streaming_requested,
            capture_halted: self.capture_halted,
            frames_sent: self.connection.frames_sent(),
            frames_dropped: self.connection.frames_dropped(),
            session: self.session.stats(),
        }
    }
}
