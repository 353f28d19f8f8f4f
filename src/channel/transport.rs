//! WebSocket Transport Layer
//!
//! Single responsibility: dial an endpoint and move whole frames in and out.
//! No knowledge of joins, heartbeats, or reconnection.
//!
//! The session only sees the [`Connector`], [`FrameSink`] and [`FrameSource`]
//! traits, so tests can swap in the in-memory transport from
//! `channel::testing`.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::protocol::Frame;
use crate::error::TransportError;

/// Type alias for the WebSocket send half
type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>, Message>;

/// Type alias for the WebSocket receive half
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Default time allowed for the WebSocket handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens connections.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn dial(&self, url: &str) -> Result<Connection, TransportError>;
}

/// Outbound half of a connection.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: &Frame) -> Result<(), TransportError>;

    /// Close the connection. The peer's read side observes the close.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Inbound half of a connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next frame. One call yields one frame.
    async fn receive(&mut self) -> Result<Frame, TransportError>;
}

/// A dialed connection, split so reads and writes can live in different tasks.
pub struct Connection {
    pub sink: Box<dyn FrameSink>,
    pub source: Box<dyn FrameSource>,
}

/// Dials Phoenix sockets over WebSocket (`ws://` or `wss://`).
#[derive(Debug, Clone)]
pub struct WsConnector {
    handshake_timeout: Duration,
}

impl WsConnector {
    pub fn new(handshake_timeout: Duration) -> Self {
        Self { handshake_timeout }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(DEFAULT_HANDSHAKE_TIMEOUT)
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn dial(&self, url: &str) -> Result<Connection, TransportError> {
        debug!(url = %redact_query(url), "Connecting to WebSocket");

        let (ws, _) = tokio::time::timeout(self.handshake_timeout, connect_async(url))
            .await
            .map_err(|_| TransportError::HandshakeTimeout(self.handshake_timeout))?
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let (sink, stream) = ws.split();

        debug!(url = %redact_query(url), "WebSocket connected");
        Ok(Connection {
            sink: Box::new(WsFrameSink { sink }),
            source: Box::new(WsFrameSource { stream }),
        })
    }
}

struct WsFrameSink {
    sink: WsSink,
}

#[async_trait]
impl FrameSink for WsFrameSink {
    async fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let text = serde_json::to_string(frame).map_err(TransportError::Encode)?;
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.sink
            .close()
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

struct WsFrameSource {
    stream: WsStream,
}

#[async_trait]
impl FrameSource for WsFrameSource {
    /// Skips control messages (ping/pong handled automatically).
    async fn receive(&mut self) -> Result<Frame, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(&text).map_err(TransportError::Decode)
                }
                Some(Ok(Message::Binary(data))) => {
                    return serde_json::from_slice(&data).map_err(TransportError::Decode)
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(frame = ?frame, "Server closed connection");
                    return Err(TransportError::Closed);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(TransportError::Receive(e.to_string())),
                None => return Err(TransportError::Closed),
            }
        }
    }
}

/// Strip the query string so credentials passed as parameters stay out of logs.
pub(crate) fn redact_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}
