//! Error types for the dispatch core.
//!
//! Two families: `PubSubError` is returned to callers of the broker API,
//! `HandlerError` is what a subscriber callback reports when it fails.

use std::time::Duration;
use thiserror::Error;

use super::value_objects::{PartitionId, Sequence, SubscriberId};

/// Result type for broker operations.
pub type PubSubResult<T> = Result<T, PubSubError>;

/// Broker error type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PubSubError {
    /// Topic has not been declared.
    #[error("Topic not found: {topic}")]
    TopicNotFound { topic: String },

    /// Subscriber is not subscribed to the topic.
    #[error("Subscription not found: {subscriber} on topic {topic}")]
    SubscriptionNotFound {
        topic: String,
        subscriber: SubscriberId,
    },

    /// Topic re-declared with a different partition count.
    #[error("Topic {topic} already declared with {existing} partitions (requested {requested})")]
    TopicConflict {
        topic: String,
        existing: u32,
        requested: u32,
    },

    /// Subscriber already holds a subscription on the topic.
    #[error("Subscriber {subscriber} already subscribed to topic {topic}")]
    AlreadySubscribed {
        topic: String,
        subscriber: SubscriberId,
    },

    /// Partition queue is at capacity under the reject policy.
    #[error("Queue full: topic {topic} partition {partition} at capacity {capacity}")]
    QueueFull {
        topic: String,
        partition: PartitionId,
        capacity: usize,
    },

    /// Acknowledgement at or behind the cursor, outside the tolerance window.
    #[error(
        "Out-of-order ack from {subscriber} on {topic}/{partition}: sequence {sequence}, cursor {cursor}"
    )]
    OutOfOrder {
        topic: String,
        subscriber: SubscriberId,
        partition: PartitionId,
        sequence: Sequence,
        cursor: Sequence,
    },

    /// Rejected configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Cursor store failure.
    #[error("Cursor store error: {reason}")]
    CursorStore { reason: String },
}

/// Coarse classification matching the caller-facing taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    QueueFull,
    OutOfOrder,
    InvalidConfig,
    Storage,
}

impl PubSubError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TopicNotFound { .. } | Self::SubscriptionNotFound { .. } => ErrorKind::NotFound,
            Self::TopicConflict { .. } | Self::AlreadySubscribed { .. } => ErrorKind::AlreadyExists,
            Self::QueueFull { .. } => ErrorKind::QueueFull,
            Self::OutOfOrder { .. } => ErrorKind::OutOfOrder,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::CursorStore { .. } => ErrorKind::Storage,
        }
    }

    /// Transient errors the caller should retry with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::QueueFull | ErrorKind::Storage)
    }

    pub(crate) fn topic_not_found(topic: &str) -> Self {
        Self::TopicNotFound {
            topic: topic.to_string(),
        }
    }
}

/// Failure reported for a single delivery attempt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The callback returned an error.
    #[error("Handler failed: {0}")]
    Failed(String),

    /// The callback exceeded the policy's callback timeout.
    #[error("Handler timed out after {0:?}")]
    TimedOut(Duration),

    /// The callback panicked.
    #[error("Handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}
