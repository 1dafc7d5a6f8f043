use anyhow::Result;
use bud_stream::client::{self, ChatSurface, ClientHandle, StreamStatus, StreamingClient};
use bud_stream::{AudioBackendFactory, Config, WsConnector};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "bud-stream", about = "Stream microphone audio to a wake word backend")]
struct Cli {
    /// Config file (extension optional)
    #[arg(long, default_value = "config/bud-stream")]
    config: String,

    /// Backend WebSocket URL
    #[arg(long)]
    url: Option<String>,

    /// Replay a 16 kHz mono WAV file instead of the microphone
    #[arg(long)]
    input: Option<PathBuf>,

    /// Do not write debug recordings
    #[arg(long)]
    no_debug: bool,

    /// How long the console "chat" stays open after a detection
    #[arg(long, default_value_t = 10)]
    chat_hold_secs: u64,
}

/// Stands in for the chat window: logs detections and pauses the stream
/// while the "window" is open
struct ConsoleChatSurface {
    handle: ClientHandle,
    hold: Duration,
    open: Arc<AtomicBool>,
}

impl ChatSurface for ConsoleChatSurface {
    fn wake_word_detected(&self) {
        if self.open.swap(true, Ordering::SeqCst) {
            info!("Chat already open");
            return;
        }

        println!("Wake word detected! Chat open for {}s", self.hold.as_secs());
        if let Err(e) = self.handle.chat_shown() {
            warn!("Could not pause stream: {}", e);
        }

        let handle = self.handle.clone();
        let open = Arc::clone(&self.open);
        let hold = self.hold;
        tokio::spawn(async move {
            tokio::time::sleep(hold).await;
            open.store(false, Ordering::SeqCst);
            println!("Chat closed");
            if let Err(e) = handle.chat_closed() {
                warn!("Could not resume stream: {}", e);
            }
        });
    }

    fn stream_state_changed(&self, status: StreamStatus) {
        info!("Audio stream {:?}", status);
    }

    fn connection_gave_up(&self, retries: u32) {
        error!(
            "Could not connect to the wake word backend after {} retries",
            retries
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut cfg = Config::load(&cli.config)?;

    if let Some(url) = cli.url {
        cfg.backend.url = url;
    }
    if let Some(input) = cli.input {
        cfg.audio.input = Some(input);
    }
    if cli.no_debug {
        cfg.debug.enabled = false;
    }

    info!("Bud stream v{}", env!("CARGO_PKG_VERSION"));
    info!("Backend: {}", cfg.backend.url);
    info!("Audio source: {:?}", cfg.audio_source());

    let (handle, inbox) = client::channel();
    let surface = Arc::new(ConsoleChatSurface {
        handle: handle.clone(),
        hold: Duration::from_secs(cli.chat_hold_secs),
        open: Arc::new(AtomicBool::new(false)),
    });

    let client = StreamingClient::new(
        cfg.client_config(),
        Arc::new(WsConnector::new(cfg.backend.send_queue_frames)),
        Arc::new(AudioBackendFactory::new(cfg.audio_source(), cfg.backend_config())),
        surface,
        inbox,
    );
    let task = tokio::spawn(client.run());

    handle.start()?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    handle.shutdown()?;
    task.await??;

    Ok(())
}
