//! Message records.
//!
//! A `Message` is created once, when the partition queue assigns it a
//! sequence, and is never mutated afterwards. Queue slots and lanes share
//! it through `Arc`.

use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::value_objects::{MessageId, PartitionId, Sequence, SubscriberId, Timestamp};

/// A message as handed over by a publisher, before routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub key: Option<String>,
    pub payload: Bytes,
    pub headers: BTreeMap<String, String>,
}

impl OutboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            key: None,
            payload: payload.into(),
            headers: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// An enqueued, immutable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    id: MessageId,
    topic: String,
    key: Option<String>,
    payload: Bytes,
    headers: BTreeMap<String, String>,
    partition: PartitionId,
    sequence: Sequence,
    enqueued_at: Timestamp,
}

impl Message {
    pub(crate) fn from_outbound(
        outbound: &OutboundMessage,
        partition: PartitionId,
        sequence: Sequence,
        enqueued_at: Timestamp,
    ) -> Self {
        Self {
            id: MessageId::new(),
            topic: outbound.topic.clone(),
            key: outbound.key.clone(),
            payload: outbound.payload.clone(),
            headers: outbound.headers.clone(),
            partition,
            sequence,
            enqueued_at,
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    pub fn sequence(&self) -> Sequence {
        self.sequence
    }

    pub fn enqueued_at(&self) -> Timestamp {
        self.enqueued_at
    }
}

/// Receipt returned by `publish`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle {
    pub id: MessageId,
    pub topic: String,
    pub partition: PartitionId,
    pub sequence: Sequence,
    /// Subscriptions on the topic when the message was enqueued.
    pub subscribers: usize,
}

impl MessageHandle {
    pub(crate) fn new(message: &Message, subscribers: usize) -> Self {
        Self {
            id: message.id,
            topic: message.topic.clone(),
            partition: message.partition,
            sequence: message.sequence,
            subscribers,
        }
    }
}

/// Receipt returned by `subscribe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    pub topic: String,
    pub subscriber: SubscriberId,
    /// Cursor each partition lane starts after, indexed by partition.
    pub start_cursors: Vec<Sequence>,
}

impl SubscriptionHandle {
    pub fn partitions(&self) -> u32 {
        self.start_cursors.len() as u32
    }
}

/// Context passed to a handler alongside the payload.
#[derive(Debug, Clone)]
pub struct DeliveryMetadata {
    message: Arc<Message>,
    subscriber: SubscriberId,
    attempt: u32,
}

impl DeliveryMetadata {
    pub(crate) fn new(message: Arc<Message>, subscriber: SubscriberId, attempt: u32) -> Self {
        Self {
            message,
            subscriber,
            attempt,
        }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn message_id(&self) -> MessageId {
        self.message.id
    }

    pub fn topic(&self) -> &str {
        &self.message.topic
    }

    pub fn key(&self) -> Option<&str> {
        self.message.key()
    }

    pub fn partition(&self) -> PartitionId {
        self.message.partition
    }

    pub fn sequence(&self) -> Sequence {
        self.message.sequence
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.message.header(name)
    }

    pub fn subscriber(&self) -> &SubscriberId {
        &self.subscriber
    }

    /// 1 on first delivery, incremented on every retry.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_redelivery(&self) -> bool {
        self.attempt > 1
    }
}
