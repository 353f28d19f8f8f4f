//! Phoenix Channel Client Module
//!
//! A long-lived channel session over an unreliable WebSocket, re-established
//! transparently whenever it fails.
//!
//! # Architecture
//!
//! The module is organized by concern, with each submodule having a single responsibility:
//!
//! | Module       | Responsibility                                     |
//! |--------------|----------------------------------------------------|
//! | `protocol`   | Frame shape, reserved topic/event names            |
//! | `transport`  | Dial, send and receive whole frames                |
//! | `reference`  | Wrap-safe correlation refs                         |
//! | `backoff`    | Delay between reconnect attempts                   |
//! | `dispatcher` | Non-blocking hand-off to the consumer              |
//! | `session`    | One joined connection: heartbeats, frame routing   |
//! | `supervisor` | Reconnect loop and connection state machine        |
//! | `client`     | Public start/close API                             |
//! | `testing`    | In-memory transport (`testing` feature)            |
//!
//! # Key Design Principles
//!
//! ## 1. A Session Is Joined Or It Does Not Exist
//!
//! - `Session` can only be created via `Session::establish()`
//! - `establish()` returns once every topic join is on the wire
//! - A failed session is discarded whole, never repaired
//!
//! ## 2. The Frame Pump Never Waits On The Consumer
//!
//! - Domain events go through a bounded queue
//! - A full queue drops the event and logs it
//! - Heartbeats keep flowing while the consumer is busy
//!
//! ## 3. Shutdown Is Not A Failure
//!
//! - `Client::close()` ends the session without backoff or retry
//! - Every other ending is retried after `Backoff::next_delay()`

pub mod backoff;
pub mod client;
pub mod dispatcher;
pub mod protocol;
pub mod reference;
pub mod session;
pub mod supervisor;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;

pub use backoff::{Backoff, BackoffConfig};
pub use client::{Client, ClientConfig};
pub use dispatcher::{Delivery, Dispatcher, EventStream};
pub use protocol::{Frame, FrameKind, Payload, ReplyPayload};
pub use reference::RefCounter;
pub use session::{Session, SessionEnd};
pub use supervisor::ConnectionState;
pub use transport::{Connection, Connector, FrameSink, FrameSource, WsConnector};
