//! Connection supervisor
//!
//! Keeps exactly one session alive at a time, dialing a new one after every
//! failure:
//!
//! ```text
//!   Idle ──▶ Connecting ──joined──▶ Active ──failed──▶ Backoff
//!                ▲   │                                   │
//!                │   └──────────dial/join failed─────────┤
//!                └──────────────delay elapsed────────────┘
//!
//!   shutdown from any state ──▶ Closed
//! ```
//!
//! Backoff is reset the moment a session is joined and only grows while
//! attempts keep failing.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn, Level};

use super::backoff::Backoff;
use super::client::ClientConfig;
use super::dispatcher::Dispatcher;
use super::reference::RefCounter;
use super::session::{shutdown_signalled, Session, SessionEnd};
use super::transport::Connector;
use crate::error::SessionError;

/// Where the client is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Constructed, not started
    Idle,
    /// Dialing and joining topics
    Connecting,
    /// Joined, pumping frames
    Active,
    /// Waiting before the next attempt
    Backoff,
    /// Shut down, the event stream is closed
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Active => "active",
            ConnectionState::Backoff => "backoff",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Owns everything the reconnect loop mutates. Runs in its own task.
pub(crate) struct Supervisor {
    pub(crate) config: Arc<ClientConfig>,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) refs: Arc<RefCounter>,
    pub(crate) backoff: Backoff,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) shutdown: watch::Receiver<bool>,
    pub(crate) state: Arc<watch::Sender<ConnectionState>>,
}

impl Supervisor {
    pub(crate) async fn run(mut self) {
        loop {
            self.transition(ConnectionState::Connecting);

            let established = tokio::select! {
                biased;
                _ = shutdown_signalled(&mut self.shutdown) => break,
                result = Session::establish(
                    self.connector.as_ref(),
                    Arc::clone(&self.config),
                    Arc::clone(&self.refs),
                ) => result,
            };

            match established {
                Ok(session) => {
                    self.backoff.reset();
                    self.transition(ConnectionState::Active);

                    match session.run(&mut self.shutdown, &self.dispatcher).await {
                        SessionEnd::ShutdownRequested => break,
                        SessionEnd::Failed(e) => log_session_failure(&e),
                    }
                }
                Err(e) => log_session_failure(&e),
            }

            self.transition(ConnectionState::Backoff);
            let delay = self.backoff.next_delay();
            info!(
                delay = ?delay,
                attempt = self.backoff.attempt(),
                dropped_events = self.dispatcher.dropped(),
                "Reconnecting after backoff"
            );

            tokio::select! {
                biased;
                _ = shutdown_signalled(&mut self.shutdown) => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        // The dispatcher holds the only sender; dropping it closes the event stream.
        drop(self.dispatcher);
        let previous = self.state.send_replace(ConnectionState::Closed);
        debug!(from = %previous, to = %ConnectionState::Closed, "Connection state changed");
        info!("Channel client stopped");
    }

    fn transition(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "Connection state changed");
        }
    }
}

fn log_session_failure(e: &SessionError) {
    let (level, message) = failure_log(e);
    if level == Level::ERROR {
        error!(error = %e, "{}", message);
    } else {
        warn!(error = %e, "{}", message);
    }
}

/// Severity and message for a failed attempt.
fn failure_log(e: &SessionError) -> (Level, &'static str) {
    if e.is_liveness() {
        (Level::WARN, "Server stopped acknowledging heartbeats")
    } else if matches!(e, SessionError::DialFailed(_)) {
        (Level::WARN, "Failed to connect")
    } else {
        (Level::ERROR, "Session ended abnormally")
    }
}
