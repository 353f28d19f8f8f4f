//! Event dispatcher
//!
//! Hands domain events to the consumer without ever blocking the session's
//! frame pump. The queue is bounded; when the consumer is not ready the event
//! is dropped and logged. A stalled consumer must not delay heartbeat
//! processing, or the session would time out and reconnect for no reason.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use super::protocol::Frame;

/// Consumer side of the dispatcher. Yields `None` once the client has shut
/// down and every buffered event has been read.
pub type EventStream = mpsc::Receiver<Frame>;

/// Outcome of a delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Consumer not ready, queue full.
    Dropped,
    /// Consumer has gone away.
    Disconnected,
}

/// Producer side of the consumer queue.
#[derive(Debug)]
pub struct Dispatcher {
    tx: mpsc::Sender<Frame>,
    dropped: Arc<AtomicU64>,
}

impl Dispatcher {
    /// Create a dispatcher with a queue of `capacity` events (at least one).
    pub fn channel(capacity: usize, dropped: Arc<AtomicU64>) -> (Self, EventStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, dropped }, rx)
    }

    /// Try to hand `frame` to the consumer. Never waits.
    pub fn deliver(&self, frame: Frame) -> Delivery {
        match self.tx.try_send(frame) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(frame)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    topic = %frame.topic,
                    event = %frame.event,
                    reference = %frame.reference,
                    "No receiver ready, dropping event"
                );
                Delivery::Dropped
            }
            Err(TrySendError::Closed(frame)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(
                    topic = %frame.topic,
                    event = %frame.event,
                    reference = %frame.reference,
                    "Event stream closed, dropping event"
                );
                Delivery::Disconnected
            }
        }
    }

    /// Events dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
