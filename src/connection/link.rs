use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// What the backend side of a link reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A UTF-8 text frame
    Text(String),
    /// The transport closed or failed; no further frames follow
    Closed(Option<String>),
}

/// Client half of an open connection
///
/// Dropping a `Link` releases the transport.
#[derive(Debug)]
pub struct Link {
    pub outbound: mpsc::Sender<Vec<u8>>,
    pub inbound: mpsc::Receiver<Inbound>,
}

/// Transport half of an open connection
#[derive(Debug)]
pub struct Peer {
    /// Binary frames queued by the client, in order
    pub frames: mpsc::Receiver<Vec<u8>>,
    /// Events delivered to the client
    pub events: mpsc::Sender<Inbound>,
}

impl Link {
    /// Create a connected link/peer pair with a bounded outbound queue
    pub fn channel(outbound_capacity: usize) -> (Link, Peer) {
        let (out_tx, out_rx) = mpsc::channel(outbound_capacity.max(1));
        let (in_tx, in_rx) = mpsc::channel(64);

        (
            Link {
                outbound: out_tx,
                inbound: in_rx,
            },
            Peer {
                frames: out_rx,
                events: in_tx,
            },
        )
    }
}

/// Opens links to the backend
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Link>;
}

/// WebSocket connector
///
/// Each connection gets a pump task that writes queued frames as binary
/// messages and forwards text messages back to the link.
#[derive(Debug, Clone)]
pub struct WsConnector {
    outbound_capacity: usize,
}

impl WsConnector {
    pub fn new(outbound_capacity: usize) -> Self {
        Self { outbound_capacity }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait::async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Link> {
        let (ws, _response) = connect_async(url)
            .await
            .with_context(|| format!("Failed to connect to {}", url))?;

        debug!("WebSocket handshake complete: {}", url);

        let (link, peer) = Link::channel(self.outbound_capacity);
        tokio::spawn(pump(ws, peer));

        Ok(link)
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn pump(ws: WsStream, peer: Peer) {
    let (mut sink, mut stream) = ws.split();
    let Peer { mut frames, events } = peer;

    let reason = loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(bytes) => {
                    if let Err(e) = sink.send(Message::Binary(bytes)).await {
                        break Some(e.to_string());
                    }
                }
                None => {
                    // Client released the link
                    let _ = sink.close().await;
                    debug!("Link released, socket closed");
                    return;
                }
            },
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if events.send(Inbound::Text(text)).await.is_err() {
                        let _ = sink.close().await;
                        return;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    break frame.map(|f| f.reason.to_string());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break Some(e.to_string()),
                None => break None,
            },
        }
    };

    warn!(
        "Wake word detection connection closed{}",
        reason.as_deref().map(|r| format!(": {}", r)).unwrap_or_default()
    );
    let _ = events.send(Inbound::Closed(reason)).await;
}
