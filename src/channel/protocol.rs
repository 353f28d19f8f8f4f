//! Phoenix Channel Wire Protocol
//!
//! Single responsibility: the frame shape exchanged with the server and the
//! reserved names that carry protocol meaning.
//!
//! # Wire Format
//!
//! Every message in either direction is one JSON object:
//!
//! ```text
//! {
//!     "topic": <string>,     // Channel topic, or "phoenix" for socket-level traffic
//!     "event": <string>,     // Event name
//!     "payload": <any>,      // Opaque to the client, passed through verbatim
//!     "ref": <string|null>,  // Correlation token, echoed by replies
//! }
//! ```
//!
//! ## Reserved names
//!
//! | Topic     | Event       | Meaning                                  |
//! |-----------|-------------|------------------------------------------|
//! | `phoenix` | `heartbeat` | Liveness, sent by both sides             |
//! | *any*     | `phx_join`  | Join a topic, one per configured topic   |
//! | *any*     | `phx_reply` | Reply to a request, correlated by `ref`  |

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;

/// Topic used for socket-level heartbeats.
pub const PHOENIX_TOPIC: &str = "phoenix";

/// Event name of a heartbeat (and of the server's acknowledgment).
pub const HEARTBEAT_EVENT: &str = "heartbeat";

/// Event name sent once per topic after connecting.
pub const JOIN_EVENT: &str = "phx_join";

/// Event name of a reply correlated with an earlier request.
pub const REPLY_EVENT: &str = "phx_reply";

/// Raw, unparsed JSON payload.
///
/// The client never looks inside a payload; consumers decode it according to
/// their own schema for each event name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Box<RawValue>);

impl Payload {
    /// Wrap a JSON document, validating only that it is well-formed.
    pub fn from_json(json: impl Into<String>) -> Result<Self, serde_json::Error> {
        RawValue::from_string(json.into()).map(Self)
    }

    /// Serialize a value into a payload.
    pub fn encode<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::value::to_raw_value(value).map(Self)
    }

    /// The empty JSON object, `{}`.
    pub fn empty() -> Self {
        Self(RawValue::from_string("{}".to_owned()).expect("`{}` is valid JSON"))
    }

    /// Decode the payload into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(self.0.get())
    }

    /// The payload exactly as it appeared on the wire.
    pub fn as_str(&self) -> &str {
        self.0.get()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.get().as_bytes()
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Payload {}

/// A single message on a Phoenix socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Payload,
    /// Correlation token. Server pushes carry `"ref": null`, which decodes
    /// as the empty string.
    #[serde(rename = "ref", default, deserialize_with = "nullable_ref")]
    pub reference: String,
}

/// How the session treats an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// The server's liveness acknowledgment. Re-arms the heartbeat watchdog.
    HeartbeatAck,
    /// A reply to one of our requests. Logged, never forwarded.
    Reply,
    /// Everything else. Forwarded to the consumer.
    Event,
}

impl Frame {
    pub fn new(
        topic: impl Into<String>,
        event: impl Into<String>,
        payload: Payload,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            event: event.into(),
            payload,
            reference: reference.into(),
        }
    }

    /// A join request for `topic`.
    pub fn join(topic: impl Into<String>, payload: Payload, reference: String) -> Self {
        Self::new(topic, JOIN_EVENT, payload, reference)
    }

    /// A client heartbeat with an empty object payload.
    pub fn heartbeat(reference: String) -> Self {
        Self::new(PHOENIX_TOPIC, HEARTBEAT_EVENT, Payload::empty(), reference)
    }

    /// Classify an inbound frame.
    pub fn kind(&self) -> FrameKind {
        if self.topic == PHOENIX_TOPIC && self.event == HEARTBEAT_EVENT {
            FrameKind::HeartbeatAck
        } else if self.event == REPLY_EVENT {
            FrameKind::Reply
        } else {
            FrameKind::Event
        }
    }

    /// Decode the payload into a typed value.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        self.payload.decode()
    }
}

/// Payload of a `phx_reply` frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReplyPayload {
    pub status: String,
    #[serde(default)]
    pub response: serde_json::Value,
}

impl ReplyPayload {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

fn nullable_ref<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_wire_format() {
        let json = serde_json::to_string(&Frame::heartbeat("7".to_string())).unwrap();
        assert_eq!(
            json,
            r#"{"topic":"phoenix","event":"heartbeat","payload":{},"ref":"7"}"#
        );
    }

    #[test]
    fn test_payload_passes_through_verbatim() {
        let raw = r#"{"topic":"private:contracts","event":"resale_contract","payload":{"Address":"1 Main St","n":1.50},"ref":null}"#;
        let frame: Frame = serde_json::from_str(raw).unwrap();

        assert_eq!(frame.payload.as_str(), r#"{"Address":"1 Main St","n":1.50}"#);
        assert_eq!(frame.reference, "");
        assert_eq!(serde_json::to_string(&frame).unwrap(), raw.replace("null", "\"\""));
    }

    #[test]
    fn test_missing_ref_and_payload_default() {
        let frame: Frame = serde_json::from_str(r#"{"topic":"phoenix","event":"heartbeat"}"#).unwrap();
        assert_eq!(frame.reference, "");
        assert_eq!(frame.payload, Payload::empty());
    }

    #[test]
    fn test_classification() {
        let ack = Frame::new(PHOENIX_TOPIC, HEARTBEAT_EVENT, Payload::empty(), "");
        assert_eq!(ack.kind(), FrameKind::HeartbeatAck);

        let reply = Frame::new("private:contracts", REPLY_EVENT, Payload::empty(), "1");
        assert_eq!(reply.kind(), FrameKind::Reply);

        // A heartbeat event on a regular topic is a domain event.
        let other = Frame::new("private:contracts", HEARTBEAT_EVENT, Payload::empty(), "");
        assert_eq!(other.kind(), FrameKind::Event);

        let heartbeat_reply = Frame::new(PHOENIX_TOPIC, REPLY_EVENT, Payload::empty(), "3");
        assert_eq!(heartbeat_reply.kind(), FrameKind::Reply);
    }

    #[test]
    fn test_reply_payload_decode() {
        let payload = Payload::from_json(r#"{"status":"ok","response":{}}"#).unwrap();
        let reply: ReplyPayload = payload.decode().unwrap();
        assert!(reply.is_ok());

        let payload = Payload::from_json(r#"{"status":"error","response":{"reason":"unauthorized"}}"#).unwrap();
        let reply: ReplyPayload = payload.decode().unwrap();
        assert!(!reply.is_ok());
        assert_eq!(reply.response["reason"], "unauthorized");
    }

    #[test]
    fn test_malformed_payload_rejected() {
        assert!(Payload::from_json("{not json").is_err());
    }
}
