//! Channel Client with Automatic Reconnection
//!
//! Single responsibility: own the supervisor and expose start/close.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                        Client                           │
//! │  - start() spawns the supervisor, returns EventStream   │
//! │  - close() signals shutdown, waits for the unwind       │
//! └────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌────────────────────────────────────────────────────────┐
//! │                      Supervisor                         │
//! │  - One session at a time, backoff between attempts      │
//! └────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌────────────────────────────────────────────────────────┐
//! │                       Session                           │
//! │  - Joins, heartbeats, frame routing                     │
//! │  - Dies on any failure (no auto-reconnect)              │
//! └────────────────────────────────────────────────────────┘
//!                            │
//!               ┌────────────┼────────────┐
//!               ▼            ▼            ▼
//!          Transport      Protocol    Dispatcher
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let client = Client::websocket(ClientConfig::new(url, vec!["room:lobby".into()]))?;
//! let mut events = client.start()?;
//!
//! while let Some(frame) = events.recv().await {
//!     // ...
//! }
//!
//! client.close().await;
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::backoff::{Backoff, BackoffConfig};
use super::dispatcher::{Dispatcher, EventStream};
use super::protocol::Payload;
use super::reference::RefCounter;
use super::supervisor::{ConnectionState, Supervisor};
use super::transport::{redact_query, Connector, WsConnector, DEFAULT_HANDSHAKE_TIMEOUT};
use crate::error::ClientError;

/// Configuration for the channel client. Immutable once the client exists.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Socket URL, including any query parameters the server expects
    pub endpoint: String,
    /// Topics joined after every connect, in order
    pub topics: Vec<String>,
    /// Payload sent with every join
    pub join_payload: Payload,
    /// Time between client heartbeats
    pub heartbeat_interval: Duration,
    /// Silence after which the connection is considered dead
    pub heartbeat_timeout: Duration,
    /// Reconnect policy
    pub backoff: BackoffConfig,
    /// Events buffered for a consumer that is not reading
    pub event_buffer: usize,
    /// Timeout for the transport handshake
    pub handshake_timeout: Duration,
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>, topics: Vec<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            topics,
            join_payload: Payload::empty(),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(60),
            backoff: BackoffConfig::default(),
            event_buffer: 1,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_join_payload(mut self, payload: Payload) -> Self {
        self.join_payload = payload;
        self
    }

    pub fn with_heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        self.heartbeat_interval = interval;
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_event_buffer(mut self, size: usize) -> Self {
        self.event_buffer = size;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.endpoint.trim().is_empty() {
            return Err(ClientError::InvalidConfig("endpoint is empty".into()));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ClientError::InvalidConfig("heartbeat interval is zero".into()));
        }
        if self.heartbeat_timeout.is_zero() {
            return Err(ClientError::InvalidConfig("heartbeat timeout is zero".into()));
        }
        if self.event_buffer == 0 {
            return Err(ClientError::InvalidConfig("event buffer is zero".into()));
        }
        self.backoff.validate().map_err(ClientError::InvalidConfig)
    }
}

enum Lifecycle {
    Idle,
    Running(JoinHandle<()>),
    Closed,
}

/// A Phoenix channel client that reconnects on its own.
///
/// # Guarantees
///
/// - `start()` returns immediately; connecting happens in the background
/// - At most one session is alive at any time
/// - A consumer that stops reading loses events, never the connection
/// - `close()` returns only once the background work has unwound
pub struct Client {
    config: Arc<ClientConfig>,
    connector: Arc<dyn Connector>,
    refs: Arc<RefCounter>,
    dropped: Arc<AtomicU64>,
    shutdown: watch::Sender<bool>,
    state: Arc<watch::Sender<ConnectionState>>,
    lifecycle: Mutex<Lifecycle>,
}

impl Client {
    /// Create a client over any transport. Nothing is dialed until `start()`.
    pub fn new(config: ClientConfig, connector: impl Connector) -> Result<Self, ClientError> {
        config.validate()?;

        let (shutdown, _) = watch::channel(false);
        let (state, _) = watch::channel(ConnectionState::Idle);

        Ok(Self {
            config: Arc::new(config),
            connector: Arc::new(connector),
            refs: Arc::new(RefCounter::new()),
            dropped: Arc::new(AtomicU64::new(0)),
            shutdown,
            state: Arc::new(state),
            lifecycle: Mutex::new(Lifecycle::Idle),
        })
    }

    /// Create a client that speaks WebSocket.
    pub fn websocket(config: ClientConfig) -> Result<Self, ClientError> {
        let connector = WsConnector::new(config.handshake_timeout);
        Self::new(config, connector)
    }

    /// Spawn the supervisor and return the event stream.
    ///
    /// # Errors
    /// - `AlreadyStarted` on a second call
    /// - `Closed` after `close()`
    pub fn start(&self) -> Result<EventStream, ClientError> {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        match *lifecycle {
            Lifecycle::Idle => {}
            Lifecycle::Running(_) => return Err(ClientError::AlreadyStarted),
            Lifecycle::Closed => return Err(ClientError::Closed),
        }

        info!(
            endpoint = %redact_query(&self.config.endpoint),
            topics = ?self.config.topics,
            "Starting channel client"
        );

        let (dispatcher, events) =
            Dispatcher::channel(self.config.event_buffer, Arc::clone(&self.dropped));

        let supervisor = Supervisor {
            config: Arc::clone(&self.config),
            connector: Arc::clone(&self.connector),
            refs: Arc::clone(&self.refs),
            backoff: Backoff::new(self.config.backoff),
            dispatcher,
            shutdown: self.shutdown.subscribe(),
            state: Arc::clone(&self.state),
        };

        *lifecycle = Lifecycle::Running(tokio::spawn(supervisor.run()));
        Ok(events)
    }

    /// Shut down and wait until the supervisor and session have unwound and
    /// the event stream is closed.
    ///
    /// Safe to call before `start()` and any number of times. Concurrent
    /// callers all return once the unwind is complete.
    pub async fn close(&self) {
        let supervisor = {
            let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
            match std::mem::replace(&mut *lifecycle, Lifecycle::Closed) {
                Lifecycle::Idle => {
                    self.state.send_replace(ConnectionState::Closed);
                    return;
                }
                Lifecycle::Running(handle) => Some(handle),
                Lifecycle::Closed => None,
            }
        };

        match supervisor {
            Some(handle) => {
                info!("Closing channel client");
                self.shutdown.send_replace(true);
                if let Err(e) = handle.await {
                    error!(error = %e, "Supervisor task failed");
                }
                self.state.send_replace(ConnectionState::Closed);
            }
            None => {
                let mut state = self.state.subscribe();
                let _ = state.wait_for(|s| *s == ConnectionState::Closed).await;
            }
        }
    }

    /// Watch the connection state.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Events dropped because the consumer was not reading.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}
