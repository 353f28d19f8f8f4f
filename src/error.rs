//! Error types for gong

use std::time::Duration;

use thiserror::Error;

/// Failures of the duplex transport underneath a session.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Connection closed")]
    Closed,

    #[error("Malformed frame: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Why a session ended abnormally.
///
/// Every variant is retried by the supervisor. An intentional shutdown is not
/// an error and is reported as [`SessionEnd::ShutdownRequested`] instead.
///
/// [`SessionEnd::ShutdownRequested`]: crate::channel::SessionEnd::ShutdownRequested
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Dial failed: {0}")]
    DialFailed(#[source] TransportError),

    #[error("Failed to join topic {topic}: {source}")]
    JoinSendFailed {
        topic: String,
        #[source]
        source: TransportError,
    },

    #[error("Failed to send heartbeat: {0}")]
    HeartbeatSendFailed(#[source] TransportError),

    #[error("Read failed: {0}")]
    ReadFailed(#[source] TransportError),

    #[error("No heartbeat acknowledgment within {0:?}")]
    HeartbeatTimeout(Duration),
}

impl SessionError {
    /// True when the peer stopped acknowledging heartbeats, as opposed to the
    /// transport itself failing.
    pub fn is_liveness(&self) -> bool {
        matches!(self, SessionError::HeartbeatTimeout(_))
    }
}

/// Errors surfaced by the public client API.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ClientError {
    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),

    #[error("Client already started")]
    AlreadyStarted,

    #[error("Client is closed")]
    Closed,
}

/// Errors loading the daemon configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Failed to encode join payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Invalid(String),
}
