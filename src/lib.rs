//! Gong - resilient Phoenix channel client
//!
//! Keeps a subscription to one or more Phoenix channel topics alive over an
//! unreliable WebSocket and hands every domain event to the application.
//!
//! ## Architecture
//!
//! - **channel**: the client library. Dial, join, heartbeat, reconnect
//! - **contracts**: decoding of the contract notifications the daemon reacts to
//! - **config**: CLI arguments and TOML settings for the `gong` binary
//!
//! ## Connection Lifecycle
//!
//! ```text
//! start() ──▶ dial ──▶ join topics ──▶ heartbeat + route frames
//!               ▲                              │
//!               └──── backoff (jittered) ◀─────┘ on any failure
//! ```
//!
//! A consumer that stops reading loses events, never the connection.

pub mod channel;
pub mod config;
pub mod contracts;
pub mod error;

pub use channel::{Client, ClientConfig, ConnectionState, EventStream, Frame, Payload};
pub use config::{Args, Config};
pub use error::{ClientError, ConfigError, SessionError, TransportError};
