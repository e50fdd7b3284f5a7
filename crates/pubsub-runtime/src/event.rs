//! Event envelope carried in message payloads.
//!
//! Encoded as JSON. The event type is duplicated into the `event-type`
//! header so subscribers can filter without decoding.

use bytes::Bytes;
use pubsub_core::OutboundMessage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Header holding `PubSubEvent::event_type`.
pub const EVENT_TYPE_HEADER: &str = "event-type";

/// Generic pub/sub event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PubSubEvent {
    pub event_type: String,
    pub payload: String,
}

/// Envelope encode/decode failures.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode event: {0}")]
    Decode(#[source] serde_json::Error),
}

impl PubSubEvent {
    pub fn new(event_type: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            payload: payload.into(),
        }
    }

    pub fn encode(&self) -> Result<Bytes, CodecError> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(CodecError::Encode)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(bytes).map_err(CodecError::Decode)
    }

    /// Build a message for `topic`, keyed by `key`, carrying the type header.
    pub fn to_outbound(
        &self,
        topic: &str,
        key: Option<&str>,
    ) -> Result<OutboundMessage, CodecError> {
        let mut message = OutboundMessage::new(topic, self.encode()?)
            .with_header(EVENT_TYPE_HEADER, self.event_type.as_str());
        message.key = key.map(str::to_string);
        Ok(message)
    }
}

/// Built-in transform: same event type, payload uppercased.
pub fn uppercase_payload(event: PubSubEvent) -> PubSubEvent {
    PubSubEvent {
        payload: event.payload.to_uppercase(),
        event_type: event.event_type,
    }
}
