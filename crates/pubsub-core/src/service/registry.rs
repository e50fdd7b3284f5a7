//! # Topic Registry
//!
//! Maps topic names to their partition structures and subscriptions.
//!
//! ```text
//! TopicRegistry
//!   └── "orders" ─→ Topic
//!                    ├── PartitionRouter (4 partitions)
//!                    ├── queues[0..4]  PartitionQueue
//!                    └── subscriptions { "billing" ─→ Subscription, ... }
//! ```
//!
//! A topic is created once and never mutated afterwards except for its
//! subscription set. Deletion removes it from the map; lanes still holding
//! an `Arc<Topic>` observe their subscription's cancel signal and exit.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::debug;

use super::ack_tracker::AckTracker;
use crate::domain::{
    CursorKey, PartitionId, PartitionQueue, PartitionRouter, PubSubError, PubSubResult,
    RetryPolicy, SubscriberId, TopicConfig,
};
use crate::ports::MessageHandler;

// =============================================================================
// SUBSCRIPTION
// =============================================================================

/// A subscriber's registration on one topic.
pub(crate) struct Subscription {
    subscriber: SubscriberId,
    topic: String,
    handler: Arc<dyn MessageHandler>,
    policy: RetryPolicy,
    cancel: watch::Sender<bool>,
    /// Highest dispatcher epoch whose lanes were spawned for this subscription.
    epoch: AtomicU64,
    /// One owner token per partition, held by the lane for its whole run.
    lane_slots: Vec<Arc<AsyncMutex<()>>>,
}

impl Subscription {
    pub(crate) fn new(
        topic: impl Into<String>,
        subscriber: SubscriberId,
        handler: Arc<dyn MessageHandler>,
        policy: RetryPolicy,
        partitions: u32,
    ) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            subscriber,
            topic: topic.into(),
            handler,
            policy,
            cancel,
            epoch: AtomicU64::new(0),
            lane_slots: (0..partitions).map(|_| Arc::new(AsyncMutex::new(()))).collect(),
        }
    }

    pub(crate) fn subscriber(&self) -> &SubscriberId {
        &self.subscriber
    }

    pub(crate) fn handler(&self) -> &Arc<dyn MessageHandler> {
        &self.handler
    }

    pub(crate) fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub(crate) fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    pub(crate) fn cancelled(&self) -> watch::Receiver<bool> {
        self.cancel.subscribe()
    }

    /// Claim lane ownership for dispatcher `epoch`. Only the first caller
    /// per epoch gets `true`.
    pub(crate) fn claim_epoch(&self, epoch: u64) -> bool {
        self.epoch.fetch_max(epoch, Ordering::SeqCst) < epoch
    }

    /// Owner token for `partition`. A lane holds it until it exits, so a
    /// lane spawned by a restart waits for its predecessor to finish.
    pub(crate) fn lane_slot(&self, partition: PartitionId) -> Option<Arc<AsyncMutex<()>>> {
        self.lane_slots.get(partition as usize).cloned()
    }

    pub(crate) fn cursor_key(&self, partition: PartitionId) -> CursorKey {
        CursorKey::new(self.topic.as_str(), &self.subscriber, partition)
    }
}

// =============================================================================
// TOPIC
// =============================================================================

/// A declared topic: router, one queue per partition, subscriptions.
pub(crate) struct Topic {
    name: String,
    config: TopicConfig,
    router: PartitionRouter,
    queues: Vec<Arc<PartitionQueue>>,
    subscriptions: RwLock<HashMap<SubscriberId, Arc<Subscription>>>,
}

impl Topic {
    fn new(name: &str, config: TopicConfig) -> Self {
        let queues = (0..config.partitions)
            .map(|partition| {
                Arc::new(PartitionQueue::new(
                    name,
                    partition,
                    config.capacity,
                    config.backpressure,
                ))
            })
            .collect();
        Self {
            name: name.to_string(),
            router: PartitionRouter::new(config.partitions),
            queues,
            config,
            subscriptions: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn has_subscription(&self, subscriber: &SubscriberId) -> bool {
        self.subscriptions.read().contains_key(subscriber)
    }

    pub(crate) fn config(&self) -> &TopicConfig {
        &self.config
    }

    pub(crate) fn partitions(&self) -> u32 {
        self.router.partitions()
    }

    pub(crate) fn route(&self, key: Option<&str>) -> PartitionId {
        self.router.route(key)
    }

    pub(crate) fn queues(&self) -> &[Arc<PartitionQueue>] {
        &self.queues
    }

    pub(crate) fn queue(&self, partition: PartitionId) -> PubSubResult<&Arc<PartitionQueue>> {
        self.queues.get(partition as usize).ok_or_else(|| {
            PubSubError::InvalidConfig(format!(
                "partition {partition} out of range for topic {} ({} partitions)",
                self.name,
                self.queues.len()
            ))
        })
    }

    pub(crate) fn subscriptions(&self) -> Vec<Arc<Subscription>> {
        self.subscriptions.read().values().cloned().collect()
    }

    pub(crate) fn subscriber_ids(&self) -> Vec<SubscriberId> {
        let mut ids: Vec<_> = self.subscriptions.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    pub(crate) fn subscription(&self, subscriber: &SubscriberId) -> PubSubResult<Arc<Subscription>> {
        self.subscriptions
            .read()
            .get(subscriber)
            .cloned()
            .ok_or_else(|| PubSubError::SubscriptionNotFound {
                topic: self.name.clone(),
                subscriber: subscriber.clone(),
            })
    }

    pub(crate) fn add_subscription(&self, subscription: Arc<Subscription>) -> PubSubResult<()> {
        let mut subscriptions = self.subscriptions.write();
        if subscriptions.contains_key(subscription.subscriber()) {
            return Err(PubSubError::AlreadySubscribed {
                topic: self.name.clone(),
                subscriber: subscription.subscriber().clone(),
            });
        }
        subscriptions.insert(subscription.subscriber().clone(), subscription);
        Ok(())
    }

    pub(crate) fn remove_subscription(
        &self,
        subscriber: &SubscriberId,
    ) -> PubSubResult<Arc<Subscription>> {
        self.subscriptions
            .write()
            .remove(subscriber)
            .ok_or_else(|| PubSubError::SubscriptionNotFound {
                topic: self.name.clone(),
                subscriber: subscriber.clone(),
            })
    }

    /// Release entries every subscription has moved past. With no
    /// subscriptions everything enqueued so far is released.
    pub(crate) fn release_partition(
        &self,
        partition: PartitionId,
        tracker: &AckTracker,
    ) -> PubSubResult<usize> {
        let queue = self.queue(partition)?;
        let subscriptions = self.subscriptions();
        let upto = if subscriptions.is_empty() {
            queue.tail_sequence()
        } else {
            let mut min = u64::MAX;
            for subscription in &subscriptions {
                let cursor = tracker.current_cursor(&subscription.cursor_key(partition))?;
                min = min.min(cursor);
            }
            min
        };
        let released = queue.release_through(upto);
        if released > 0 {
            debug!(
                topic = %self.name,
                partition,
                upto,
                released,
                "Released partition entries"
            );
        }
        Ok(released)
    }

    /// Close every queue; blocked publishers fail with `TopicNotFound`.
    pub(crate) fn close(&self) {
        for queue in &self.queues {
            queue.close();
        }
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topic")
            .field("name", &self.name)
            .field("partitions", &self.partitions())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Name → topic map.
#[derive(Default)]
pub(crate) struct TopicRegistry {
    topics: RwLock<HashMap<String, Arc<Topic>>>,
}

impl TopicRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Create the topic if absent. Returns the topic and whether it was created.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` - empty name or invalid topic config
    /// - `TopicConflict` - exists with a different partition count
    pub(crate) fn declare(
        &self,
        name: &str,
        config: TopicConfig,
    ) -> PubSubResult<(Arc<Topic>, bool)> {
        if name.is_empty() {
            return Err(PubSubError::InvalidConfig(
                "topic name must not be empty".into(),
            ));
        }
        config.validate()?;

        let mut topics = self.topics.write();
        if let Some(existing) = topics.get(name) {
            if existing.partitions() != config.partitions {
                return Err(PubSubError::TopicConflict {
                    topic: name.to_string(),
                    existing: existing.partitions(),
                    requested: config.partitions,
                });
            }
            return Ok((Arc::clone(existing), false));
        }
        let topic = Arc::new(Topic::new(name, config));
        topics.insert(name.to_string(), Arc::clone(&topic));
        Ok((topic, true))
    }

    pub(crate) fn get(&self, name: &str) -> PubSubResult<Arc<Topic>> {
        self.topics
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| PubSubError::topic_not_found(name))
    }

    pub(crate) fn remove(&self, name: &str) -> PubSubResult<Arc<Topic>> {
        self.topics
            .write()
            .remove(name)
            .ok_or_else(|| PubSubError::topic_not_found(name))
    }

    pub(crate) fn all(&self) -> Vec<Arc<Topic>> {
        self.topics.read().values().cloned().collect()
    }

    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.topics.read().keys().cloned().collect();
        names.sort();
        names
    }
}
