//! Partition routing.
//!
//! Keyed messages hash to a fixed partition for the topic's lifetime, so
//! every message with the same key shares one FIFO lane. Keyless messages
//! are spread round-robin and carry no ordering guarantee between them.

use siphasher::sip::SipHasher13;
use std::hash::Hasher;
use std::sync::atomic::{AtomicU64, Ordering};

use super::value_objects::PartitionId;

/// Maps message keys to partition indices for a single topic.
#[derive(Debug)]
pub struct PartitionRouter {
    partitions: u32,
    next_keyless: AtomicU64,
}

impl PartitionRouter {
    pub fn new(partitions: u32) -> Self {
        Self {
            partitions: partitions.max(1),
            next_keyless: AtomicU64::new(0),
        }
    }

    pub fn partitions(&self) -> u32 {
        self.partitions
    }

    pub fn route(&self, key: Option<&str>) -> PartitionId {
        let slot = match key {
            Some(key) => Self::hash_key(key),
            None => self.next_keyless.fetch_add(1, Ordering::Relaxed),
        };
        (slot % u64::from(self.partitions)) as PartitionId
    }

    /// Stable across processes: fixed SipHash keys, no per-process seed.
    pub fn hash_key(key: &str) -> u64 {
        let mut hasher = SipHasher13::new_with_keys(0, 0);
        hasher.write(key.as_bytes());
        hasher.finish()
    }
}
