//! Dead-letter sinks.
//!
//! - `InMemoryDeadLetterQueue`: bounded buffer for inspection and replay
//! - `LoggingDeadLetterSink`: records each letter at error level

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{error, warn};

use crate::domain::DeadLetter;
use crate::ports::DeadLetterSink;

/// Letters kept by `InMemoryDeadLetterQueue::new()`.
pub const DEFAULT_DEAD_LETTER_CAPACITY: usize = 256;

/// Bounded in-memory dead-letter queue. When full the oldest letter is
/// evicted and counted.
#[derive(Debug)]
pub struct InMemoryDeadLetterQueue {
    letters: Mutex<VecDeque<DeadLetter>>,
    capacity: usize,
    received: AtomicU64,
    evicted: AtomicU64,
}

impl InMemoryDeadLetterQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_DEAD_LETTER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            letters: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            received: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    /// Snapshot of retained letters, oldest first.
    pub fn letters(&self) -> Vec<DeadLetter> {
        self.letters.lock().iter().cloned().collect()
    }

    /// Remove and return all retained letters.
    pub fn drain(&self) -> Vec<DeadLetter> {
        self.letters.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.letters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.letters.lock().is_empty()
    }

    /// Letters received since creation, including evicted ones.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

impl Default for InMemoryDeadLetterQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeadLetterSink for InMemoryDeadLetterQueue {
    async fn dead_letter(&self, letter: DeadLetter) {
        self.received.fetch_add(1, Ordering::Relaxed);
        let mut letters = self.letters.lock();
        if letters.len() >= self.capacity {
            letters.pop_front();
            self.evicted.fetch_add(1, Ordering::Relaxed);
            warn!(
                capacity = self.capacity,
                "Dead-letter queue full, evicted oldest letter"
            );
        }
        letters.push_back(letter);
    }
}

/// Sink that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingDeadLetterSink;

#[async_trait]
impl DeadLetterSink for LoggingDeadLetterSink {
    async fn dead_letter(&self, letter: DeadLetter) {
        error!(
            topic = %letter.topic,
            partition = letter.partition,
            subscriber = %letter.subscriber,
            sequence = letter.message.sequence(),
            message_id = %letter.message.id(),
            attempts = letter.attempts,
            error = %letter.error,
            "Message dead-lettered"
        );
    }
}
