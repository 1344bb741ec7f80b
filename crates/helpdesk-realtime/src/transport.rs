//! Socket plumbing behind the [`Connector`] seam.
//!
//! The channel never touches a socket directly. A connector turns a URL into
//! a [`Link`]: a pair of queues, one for frames to write and one for what the
//! peer sent. The production connector is [`WsConnector`]; tests plug in
//! their own.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, warn};

use crate::errors::TransportError;

/// Close with no status code in the frame.
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Connection lost without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

const OUTBOUND_BUFFER: usize = 64;
const INBOUND_BUFFER: usize = 256;

/// A frame to write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundMessage {
    /// JSON text frame.
    Text(String),
    /// Close handshake.
    Close {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

/// Something the peer did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame, in arrival order.
    Text(String),
    /// The connection ended. Always the last event on a link.
    Closed {
        /// Close code (1006 when the connection dropped without one).
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
    },
}

/// An open connection.
#[derive(Debug)]
pub struct Link {
    /// Frames to write.
    pub outbound: mpsc::Sender<OutboundMessage>,
    /// Frames and close notice from the peer.
    pub inbound: mpsc::Receiver<TransportEvent>,
}

/// Opens connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `url` (which carries the credentials).
    async fn connect(&self, url: &str) -> Result<Link, TransportError>;
}

/// [`Connector`] over `tokio-tungstenite`.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Link, TransportError> {
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(TransportError::InvalidEndpoint(redact(url)));
        }
        let (ws, _) = tokio_tungstenite::connect_async(url).await?;
        let (out_tx, out_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let (in_tx, in_rx) = mpsc::channel(INBOUND_BUFFER);
        drop(tokio::spawn(pump(ws, out_rx, in_tx)));
        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// Move frames between the socket and the link queues until either side ends.
async fn pump<S>(
    ws: WebSocketStream<S>,
    mut outbound: mpsc::Receiver<OutboundMessage>,
    inbound: mpsc::Sender<TransportEvent>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (code, reason) = loop {
        tokio::select! {
            msg = outbound.recv() => {
                let Some(msg) = msg else {
                    // Link dropped by the owner; nobody is listening.
                    let _ = ws_tx.close().await;
                    return;
                };
                let frame = match msg {
                    OutboundMessage::Text(text) => Message::Text(text.into()),
                    OutboundMessage::Close { code, reason } => Message::Close(Some(CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    })),
                };
                if let Err(e) = ws_tx.send(frame).await {
                    warn!(error = %e, "websocket write failed");
                    break (CLOSE_ABNORMAL, e.to_string());
                }
            }
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if inbound.send(TransportEvent::Text(text.as_str().to_owned())).await.is_err() {
                        return;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    break frame.map_or((CLOSE_NO_STATUS, String::new()), |f| {
                        (u16::from(f.code), f.reason.as_str().to_owned())
                    });
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "websocket read failed");
                    break (CLOSE_ABNORMAL, e.to_string());
                }
                None => break (CLOSE_ABNORMAL, String::new()),
            },
        }
    };

    debug!(code, reason = %reason, "websocket closed");
    let _ = inbound.send(TransportEvent::Closed { code, reason }).await;
}

/// Strip the query string (it carries the token) for logs and errors.
pub fn redact(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{base}?<redacted>"),
        None => url.to_owned(),
    }
}
