//! In-memory transport
//!
//! A scripted stand-in for the WebSocket transport. Each successful dial hands
//! the server end of the connection to a [`MemoryServer`], which can push
//! frames, inject read failures, observe what the client sent, and make the
//! client's sends fail.
//!
//! ```ignore
//! let (connector, mut server) = MemoryConnector::new();
//! let client = Client::new(config, connector.clone())?;
//! let events = client.start()?;
//!
//! let mut conn = server.accept().await.unwrap();
//! let join = conn.recv().await.unwrap();
//! conn.push(Frame::new("room:lobby", "new_msg", Payload::empty(), ""));
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::protocol::Frame;
use super::transport::{Connection, Connector, FrameSink, FrameSource};
use crate::error::TransportError;

/// What the next dial does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialPolicy {
    Accept,
    /// Refuse this many dials, then accept.
    RefuseNext(usize),
    RefuseAll,
}

#[derive(Debug)]
struct ConnectorState {
    policy: DialPolicy,
    attempts: Vec<(String, Instant)>,
    fail_sends_on_dial: bool,
}

/// Client-side handle. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MemoryConnector {
    state: Arc<Mutex<ConnectorState>>,
    accepted: mpsc::UnboundedSender<ServerConnection>,
}

/// Receives the server end of each accepted connection.
pub struct MemoryServer {
    accepted: mpsc::UnboundedReceiver<ServerConnection>,
}

impl MemoryConnector {
    pub fn new() -> (Self, MemoryServer) {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        let connector = Self {
            state: Arc::new(Mutex::new(ConnectorState {
                policy: DialPolicy::Accept,
                attempts: Vec::new(),
                fail_sends_on_dial: false,
            })),
            accepted: accepted_tx,
        };
        (connector, MemoryServer { accepted: accepted_rx })
    }

    pub fn set_policy(&self, policy: DialPolicy) {
        self.lock().policy = policy;
    }

    /// Connections dialed from now on start with failing sends.
    pub fn fail_sends_on_dial(&self, fail: bool) {
        self.lock().fail_sends_on_dial = fail;
    }

    /// Every dial attempt so far, successful or not, with its URL and time.
    pub fn attempts(&self) -> Vec<(String, Instant)> {
        self.lock().attempts.clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.lock().attempts.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ConnectorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn dial(&self, url: &str) -> Result<Connection, TransportError> {
        let fail_sends = {
            let mut state = self.lock();
            state.attempts.push((url.to_string(), Instant::now()));
            match state.policy {
                DialPolicy::Accept => {}
                DialPolicy::RefuseAll => {
                    return Err(TransportError::Connect("connection refused".into()))
                }
                DialPolicy::RefuseNext(n) => {
                    state.policy = if n <= 1 {
                        DialPolicy::Accept
                    } else {
                        DialPolicy::RefuseNext(n - 1)
                    };
                    return Err(TransportError::Connect("connection refused".into()));
                }
            }
            Arc::new(AtomicBool::new(state.fail_sends_on_dial))
        };

        let (to_client, from_server) = mpsc::unbounded_channel();
        let (to_server, from_client) = mpsc::unbounded_channel();

        let server_end = ServerConnection {
            to_client,
            from_client,
            fail_sends: Arc::clone(&fail_sends),
        };
        self.accepted
            .send(server_end)
            .map_err(|_| TransportError::Connect("memory server gone".into()))?;

        Ok(Connection {
            sink: Box::new(MemorySink {
                tx: Some(to_server),
                fail_sends,
            }),
            source: Box::new(MemorySource { rx: from_server }),
        })
    }
}

impl MemoryServer {
    /// Wait for the next accepted connection.
    pub async fn accept(&mut self) -> Option<ServerConnection> {
        self.accepted.recv().await
    }

    /// An already accepted connection, if any.
    pub fn try_accept(&mut self) -> Option<ServerConnection> {
        self.accepted.try_recv().ok()
    }
}

/// Server end of one in-memory connection.
pub struct ServerConnection {
    to_client: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    from_client: mpsc::UnboundedReceiver<Frame>,
    fail_sends: Arc<AtomicBool>,
}

impl ServerConnection {
    /// Push a frame to the client. Returns false once the client is gone.
    pub fn push(&self, frame: Frame) -> bool {
        self.to_client.send(Ok(frame)).is_ok()
    }

    /// Make the client's next read fail with `error`.
    pub fn fail_read(&self, error: TransportError) -> bool {
        self.to_client.send(Err(error)).is_ok()
    }

    /// Make every subsequent client send fail.
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Next frame the client sent. `None` once the client closed the connection.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.from_client.recv().await
    }

    /// A frame the client already sent, if any.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.from_client.try_recv().ok()
    }

    /// True once the client closed its side.
    pub fn is_closed_by_client(&self) -> bool {
        self.from_client.is_closed()
    }
}

struct MemorySink {
    tx: Option<mpsc::UnboundedSender<Frame>>,
    fail_sends: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Send("broken pipe".into()));
        }
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(frame.clone()).map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        Ok(())
    }
}

struct MemorySource {
    rx: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn receive(&mut self) -> Result<Frame, TransportError> {
        self.rx.recv().await.unwrap_or(Err(TransportError::Closed))
    }
}
