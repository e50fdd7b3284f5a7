//! # Partition Queue
//!
//! Bounded FIFO buffer for one partition. Publishers append, lanes read by
//! sequence, and entries are released once every subscription has moved
//! past them.
//!
//! ```text
//!   first (oldest retained)                      next (assigned to next enqueue)
//!     │                                            │
//!     ▼                                            ▼
//!   ┌────┬────┬────┬────┬────┐
//!   │ 41 │ 42 │ 43 │ 44 │ 45 │   len ≤ capacity
//!   └────┴────┴────┴────┴────┘
//!     ▲ release_through(min cursor)      ▲ tail watch (45)
//! ```
//!
//! Reads do not consume: several subscriptions read the same slots at their
//! own pace. Capacity is therefore bounded by the slowest subscription,
//! which is how backpressure reaches publishers.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use super::config::BackpressurePolicy;
use super::errors::{PubSubError, PubSubResult};
use super::message::{Message, OutboundMessage};
use super::value_objects::{PartitionId, Sequence, Timestamp};

/// Result of looking up a sequence in the queue.
#[derive(Debug, Clone)]
pub enum Slot {
    /// The message is retained and can be delivered.
    Ready(Arc<Message>),
    /// Not yet published.
    Pending,
    /// Already released; reading resumes at `first`.
    Released { first: Sequence },
}

struct QueueState {
    entries: VecDeque<Arc<Message>>,
    /// Sequence of `entries[0]`, or `next` when empty.
    first: Sequence,
    next: Sequence,
}

/// Bounded per-partition queue.
pub struct PartitionQueue {
    topic: String,
    partition: PartitionId,
    capacity: usize,
    policy: BackpressurePolicy,
    state: Mutex<QueueState>,
    /// Last enqueued sequence; lanes wait on it.
    tail: watch::Sender<Sequence>,
    /// First retained sequence; blocked publishers wait on it.
    head: watch::Sender<Sequence>,
    closed: AtomicBool,
}

impl PartitionQueue {
    pub fn new(
        topic: impl Into<String>,
        partition: PartitionId,
        capacity: usize,
        policy: BackpressurePolicy,
    ) -> Self {
        let (tail, _) = watch::channel(0);
        let (head, _) = watch::channel(1);
        Self {
            topic: topic.into(),
            partition,
            capacity: capacity.max(1),
            policy,
            state: Mutex::new(QueueState {
                entries: VecDeque::with_capacity(capacity.min(1024)),
                first: 1,
                next: 1,
            }),
            tail,
            head,
            closed: AtomicBool::new(false),
        }
    }

    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sequence of the most recently enqueued message (0 if none).
    pub fn tail_sequence(&self) -> Sequence {
        *self.tail.borrow()
    }

    /// Oldest retained sequence.
    pub fn first_sequence(&self) -> Sequence {
        self.state.lock().first
    }

    /// Append a message, applying the backpressure policy when full.
    ///
    /// # Errors
    ///
    /// - `PubSubError::QueueFull` - full under `BackpressurePolicy::Reject`
    /// - `PubSubError::TopicNotFound` - the topic was deleted
    pub async fn enqueue(
        &self,
        outbound: &OutboundMessage,
        enqueued_at: Timestamp,
    ) -> PubSubResult<Arc<Message>> {
        // Subscribe before checking so a release between the check and the
        // wait is not missed.
        let mut space = self.head.subscribe();
        loop {
            if let Some(message) = self.try_push(outbound, enqueued_at)? {
                return Ok(message);
            }
            if self.policy == BackpressurePolicy::Reject {
                return Err(self.full_error());
            }
            debug!(
                topic = %self.topic,
                partition = self.partition,
                capacity = self.capacity,
                "Partition queue full, publisher waiting"
            );
            if space.changed().await.is_err() {
                return Err(PubSubError::topic_not_found(&self.topic));
            }
        }
    }

    /// Append without waiting. Fails with `QueueFull` regardless of policy.
    pub fn try_enqueue(
        &self,
        outbound: &OutboundMessage,
        enqueued_at: Timestamp,
    ) -> PubSubResult<Arc<Message>> {
        self.try_push(outbound, enqueued_at)?
            .ok_or_else(|| self.full_error())
    }

    fn try_push(
        &self,
        outbound: &OutboundMessage,
        enqueued_at: Timestamp,
    ) -> PubSubResult<Option<Arc<Message>>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PubSubError::topic_not_found(&self.topic));
        }
        let mut state = self.state.lock();
        if state.entries.len() >= self.capacity {
            return Ok(None);
        }
        let sequence = state.next;
        state.next += 1;
        let message = Arc::new(Message::from_outbound(
            outbound,
            self.partition,
            sequence,
            enqueued_at,
        ));
        state.entries.push_back(Arc::clone(&message));
        // Published under the lock so the watched tail never goes backwards.
        self.tail.send_replace(sequence);
        Ok(Some(message))
    }

    fn full_error(&self) -> PubSubError {
        PubSubError::QueueFull {
            topic: self.topic.clone(),
            partition: self.partition,
            capacity: self.capacity,
        }
    }

    /// Look up the message at `sequence`.
    pub fn get(&self, sequence: Sequence) -> Slot {
        let state = self.state.lock();
        if sequence < state.first {
            return Slot::Released { first: state.first };
        }
        if sequence >= state.next {
            return Slot::Pending;
        }
        let index = (sequence - state.first) as usize;
        match state.entries.get(index) {
            Some(message) => Slot::Ready(Arc::clone(message)),
            None => Slot::Pending,
        }
    }

    /// Resolve once a message with `sequence` (or later) has been enqueued.
    pub async fn wait_for(&self, sequence: Sequence) {
        let mut tail = self.tail.subscribe();
        // The sender lives as long as `self`, so this cannot fail while borrowed.
        let _ = tail.wait_for(|last| *last >= sequence).await;
    }

    /// Drop every entry with sequence ≤ `upto`. Returns how many were released.
    pub fn release_through(&self, upto: Sequence) -> usize {
        let mut state = self.state.lock();
        let mut released = 0;
        while state.first <= upto {
            if state.entries.pop_front().is_none() {
                break;
            }
            state.first += 1;
            released += 1;
        }
        if released > 0 {
            self.head.send_replace(state.first);
        }
        released
    }

    /// Reject further publishes and wake blocked publishers.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.head.send_modify(|_| {});
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for PartitionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionQueue")
            .field("topic", &self.topic)
            .field("partition", &self.partition)
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}
