//! Channel Session
//!
//! Single responsibility: one physical connection, from dial to termination.
//!
//! # The Key Abstraction
//!
//! A `Session` can ONLY be created via `Session::establish()`, which:
//! 1. Dials the transport
//! 2. Sends a join for every configured topic, in order
//! 3. Only THEN returns a Session
//!
//! If you have a `Session`, every topic join has gone out on the wire.
//! `Session::run()` then owns the connection until it ends:
//!
//! ```text
//!                 ┌──────────────┐  frame / read error   ┌──────────────┐
//!   transport ──▶ │ reader task  │ ────────────────────▶ │ control loop │ ──▶ Dispatcher
//!                 └──────────────┘   (one in flight)     └──────────────┘
//!                                                          ▲    ▲    ▲
//!                                          heartbeat tick ─┘    │    └─ shutdown
//!                                                   watchdog ───┘
//! ```
//!
//! Sessions do NOT reconnect. Any failure ends the session and the
//! supervisor dials a fresh one.

use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, Sleep};
use tracing::{debug, info, trace, warn};

use super::client::ClientConfig;
use super::dispatcher::Dispatcher;
use super::protocol::{Frame, FrameKind, ReplyPayload};
use super::reference::RefCounter;
use super::transport::{redact_query, Connection, Connector, FrameSink, FrameSource};
use crate::error::{SessionError, TransportError};

/// How a session that was running came to an end.
#[derive(Debug)]
pub enum SessionEnd {
    /// The client is closing. Not an error, never retried.
    ShutdownRequested,
    /// The connection failed or went silent. The supervisor retries.
    Failed(SessionError),
}

/// A joined channel session.
///
/// # Lifecycle
///
/// Created by `establish()` once every join frame is sent, consumed by
/// `run()`. The transport is closed and the reader task stopped however the
/// session ends.
pub struct Session {
    config: Arc<ClientConfig>,
    refs: Arc<RefCounter>,
    sink: Box<dyn FrameSink>,
    source: Option<Box<dyn FrameSource>>,
    /// Handle to the reader task, once `run()` started it
    reader: Option<JoinHandle<()>>,
}

impl Session {
    /// Dial the endpoint and join every configured topic.
    ///
    /// If any step fails, an error is returned and no session exists.
    ///
    /// # Errors
    /// - `DialFailed` when the transport cannot connect
    /// - `JoinSendFailed` when a join frame cannot be sent
    pub async fn establish(
        connector: &dyn Connector,
        config: Arc<ClientConfig>,
        refs: Arc<RefCounter>,
    ) -> Result<Self, SessionError> {
        info!(
            endpoint = %redact_query(&config.endpoint),
            topics = config.topics.len(),
            "Establishing channel session"
        );

        let Connection { mut sink, source } = connector
            .dial(&config.endpoint)
            .await
            .map_err(SessionError::DialFailed)?;

        for topic in &config.topics {
            let join = Frame::join(topic.as_str(), config.join_payload.clone(), refs.next_ref());
            debug!(topic = %topic, reference = %join.reference, "Joining topic");

            if let Err(source) = sink.send(&join).await {
                if let Err(e) = sink.close().await {
                    debug!(error = %e, "Error closing transport after failed join");
                }
                return Err(SessionError::JoinSendFailed {
                    topic: topic.clone(),
                    source,
                });
            }
        }

        info!("Channel session established");

        Ok(Self {
            config,
            refs,
            sink,
            source: Some(source),
            reader: None,
        })
    }

    /// Pump frames until the connection fails, the server goes silent, or
    /// `shutdown` flips to true (or its sender is dropped).
    pub async fn run(
        mut self,
        shutdown: &mut watch::Receiver<bool>,
        dispatcher: &Dispatcher,
    ) -> SessionEnd {
        let (frames_tx, mut frames_rx) = mpsc::channel(1);
        if let Some(source) = self.source.take() {
            self.reader = Some(tokio::spawn(read_loop(source, frames_tx)));
        }

        let heartbeat_timeout = self.config.heartbeat_timeout;
        let heartbeat_interval = self.config.heartbeat_interval;

        let mut ticker =
            tokio::time::interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let watchdog = tokio::time::sleep(heartbeat_timeout);
        tokio::pin!(watchdog);

        let end = loop {
            tokio::select! {
                biased;

                _ = shutdown_signalled(shutdown) => {
                    info!("Shutdown requested, closing session");
                    break SessionEnd::ShutdownRequested;
                }

                incoming = frames_rx.recv() => match incoming {
                    Some(Ok(frame)) => self.handle_frame(frame, watchdog.as_mut(), dispatcher),
                    Some(Err(e)) => break SessionEnd::Failed(SessionError::ReadFailed(e)),
                    None => break SessionEnd::Failed(SessionError::ReadFailed(TransportError::Closed)),
                },

                _ = ticker.tick() => {
                    if let Err(e) = self.send_heartbeat().await {
                        break SessionEnd::Failed(SessionError::HeartbeatSendFailed(e));
                    }
                }

                () = &mut watchdog => {
                    break SessionEnd::Failed(SessionError::HeartbeatTimeout(heartbeat_timeout));
                }
            }
        };

        if let Err(e) = self.sink.close().await {
            debug!(error = %e, "Error closing transport");
        }

        end
    }

    fn handle_frame(&self, frame: Frame, watchdog: Pin<&mut Sleep>, dispatcher: &Dispatcher) {
        match frame.kind() {
            FrameKind::HeartbeatAck => {
                trace!("Heartbeat acknowledged");
                watchdog.reset(Instant::now() + self.config.heartbeat_timeout);
            }
            FrameKind::Reply => match frame.decode_payload::<ReplyPayload>() {
                Ok(reply) if reply.is_ok() => {
                    debug!(
                        topic = %frame.topic,
                        reference = %frame.reference,
                        response = %reply.response,
                        "Reply received"
                    );
                }
                Ok(reply) => {
                    warn!(
                        topic = %frame.topic,
                        reference = %frame.reference,
                        status = %reply.status,
                        response = %reply.response,
                        "Request rejected"
                    );
                }
                Err(e) => {
                    warn!(
                        topic = %frame.topic,
                        reference = %frame.reference,
                        error = %e,
                        "Failed to decode reply payload"
                    );
                }
            },
            FrameKind::Event => {
                dispatcher.deliver(frame);
            }
        }
    }

    async fn send_heartbeat(&mut self) -> Result<(), TransportError> {
        let heartbeat = Frame::heartbeat(self.refs.next_ref());
        trace!(reference = %heartbeat.reference, "Sending heartbeat");
        self.sink.send(&heartbeat).await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Abort the reader task when session is dropped
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Resolves once shutdown is requested or the client that owns the sender is
/// gone.
pub(crate) async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Reader loop - runs in a spawned task.
///
/// Reads one frame at a time. A read is only started once the control loop
/// has room for its result, so at most one frame is in flight. The first
/// error is forwarded and ends the loop.
async fn read_loop(
    mut source: Box<dyn FrameSource>,
    frames: mpsc::Sender<Result<Frame, TransportError>>,
) {
    debug!("Reader loop started");

    loop {
        let Ok(permit) = frames.reserve().await else {
            break;
        };
        let result = source.receive().await;
        let failed = result.is_err();
        permit.send(result);
        if failed {
            break;
        }
    }

    debug!("Reader loop ended");
}
