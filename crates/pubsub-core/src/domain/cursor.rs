//! Acknowledgement cursors.
//!
//! A cursor is the last sequence a subscriber has finished with (acked or
//! dead-lettered) in one partition. It only moves forward; the single
//! exception is an operator reset.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::value_objects::{PartitionId, Sequence, SubscriberId};

/// Identity of one cursor: (topic, subscriber, partition).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CursorKey {
    pub topic: String,
    pub subscriber: SubscriberId,
    pub partition: PartitionId,
}

impl CursorKey {
    pub fn new(topic: impl Into<String>, subscriber: &SubscriberId, partition: PartitionId) -> Self {
        Self {
            topic: topic.into(),
            subscriber: subscriber.clone(),
            partition,
        }
    }
}

impl fmt::Display for CursorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.topic, self.partition, self.subscriber)
    }
}

/// Effect of an accepted acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Advanced { from: Sequence, to: Sequence },
    /// At or behind the cursor but inside the tolerance window.
    Duplicate { cursor: Sequence },
}

/// The ack is too far behind the cursor to be a harmless duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleAck {
    pub cursor: Sequence,
}

/// Decide what an ack of `sequence` does to a cursor at `cursor`.
///
/// Rejected when `sequence + tolerance <= cursor`. Forward jumps are allowed.
pub fn evaluate_ack(
    cursor: Sequence,
    sequence: Sequence,
    tolerance: u64,
) -> Result<AckOutcome, StaleAck> {
    if sequence > cursor {
        Ok(AckOutcome::Advanced {
            from: cursor,
            to: sequence,
        })
    } else if sequence.saturating_add(tolerance) > cursor {
        Ok(AckOutcome::Duplicate { cursor })
    } else {
        Err(StaleAck { cursor })
    }
}
