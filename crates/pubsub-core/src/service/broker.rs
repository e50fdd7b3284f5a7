//! # Pub/Sub Broker
//!
//! `PubSubBroker` is the explicit context object every caller shares. It is
//! cheap to clone; all clones operate on the same registry, cursors and
//! dispatcher.
//!
//! ## Lifecycle
//!
//! ```text
//! builder().build() ──→ declare/subscribe ──→ start_dispatcher()
//!                                                  │
//!                      publish ... (lanes deliver) │
//!                                                  ↓
//!                                          stop_dispatcher().await
//!                                                  │
//!                                  start_dispatcher() resumes from cursors
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::ack_tracker::AckTracker;
use super::dispatcher::{DeliveryServices, Dispatcher};
use super::registry::{Subscription, Topic, TopicRegistry};
use super::stats::{DispatcherStats, StatsSnapshot};
use crate::adapters::{InMemoryCursorStore, LoggingDeadLetterSink};
use crate::domain::{
    BrokerConfig, CursorKey, MessageHandle, OutboundMessage, PartitionId, PubSubError,
    PubSubResult, RetryPolicy, Sequence, SubscriberId, SubscriptionHandle, TopicConfig,
};
use crate::ports::{CursorStore, DeadLetterSink, MessageHandler, PubSubApi, SystemTimeSource, TimeSource};

/// Shared state behind every `PubSubBroker` clone.
pub(crate) struct BrokerContext {
    config: BrokerConfig,
    registry: TopicRegistry,
    tracker: Arc<AckTracker>,
    clock: Arc<dyn TimeSource>,
    stats: Arc<DispatcherStats>,
    dispatcher: Dispatcher,
}

/// In-process pub/sub broker.
#[derive(Clone)]
pub struct PubSubBroker {
    ctx: Arc<BrokerContext>,
}

impl PubSubBroker {
    /// Broker with in-memory cursors and a logging dead-letter sink.
    pub fn new(config: BrokerConfig) -> PubSubResult<Self> {
        Self::builder().config(config).build()
    }

    pub fn builder() -> BrokerBuilder {
        BrokerBuilder::default()
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.ctx.config
    }

    // =========================================================================
    // TOPICS
    // =========================================================================

    /// Declare a topic with `partitions` and the default topic settings.
    pub fn declare_topic(&self, name: &str, partitions: u32) -> PubSubResult<()> {
        let config = TopicConfig {
            partitions,
            ..self.ctx.config.default_topic.clone()
        };
        self.declare_topic_with(name, config)
    }

    pub fn declare_topic_with(&self, name: &str, config: TopicConfig) -> PubSubResult<()> {
        let (topic, created) = self.ctx.registry.declare(name, config)?;
        if created {
            info!(
                topic = name,
                partitions = topic.partitions(),
                capacity = topic.config().capacity,
                backpressure = ?topic.config().backpressure,
                "Topic declared"
            );
        }
        Ok(())
    }

    /// Delete a topic. Its lanes stop, its cursors are discarded and
    /// publishers blocked on it fail with `TopicNotFound`.
    pub fn delete_topic(&self, name: &str) -> PubSubResult<()> {
        let topic = self.ctx.registry.remove(name)?;
        let subscriptions = topic.subscriptions();
        let keys: Vec<CursorKey> = subscriptions
            .iter()
            .flat_map(|s| (0..topic.partitions()).map(move |p| s.cursor_key(p)))
            .collect();
        self.ctx.tracker.discard(&keys, || {
            for subscription in &subscriptions {
                subscription.cancel();
            }
        })?;
        topic.close();
        info!(
            topic = name,
            subscriptions = subscriptions.len(),
            "Topic deleted"
        );
        Ok(())
    }

    /// Declared topic names, sorted.
    pub fn topics(&self) -> Vec<String> {
        self.ctx.registry.names()
    }

    pub fn topic_config(&self, name: &str) -> PubSubResult<TopicConfig> {
        Ok(self.ctx.registry.get(name)?.config().clone())
    }

    /// Subscribers of a topic, sorted.
    pub fn subscribers(&self, topic: &str) -> PubSubResult<Vec<SubscriberId>> {
        Ok(self.ctx.registry.get(topic)?.subscriber_ids())
    }

    pub fn route(&self, topic: &str, key: Option<&str>) -> PubSubResult<PartitionId> {
        Ok(self.ctx.registry.get(topic)?.route(key))
    }

    // =========================================================================
    // PUBLISH
    // =========================================================================

    /// Publish a payload, routed by `key`.
    pub async fn publish(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: impl Into<Bytes>,
    ) -> PubSubResult<MessageHandle> {
        let mut message = OutboundMessage::new(topic, payload);
        message.key = key.map(str::to_string);
        self.publish_message(message).await
    }

    /// Publish a fully built message. Waits for queue space under the
    /// block policy.
    pub async fn publish_message(&self, outbound: OutboundMessage) -> PubSubResult<MessageHandle> {
        let topic = self.topic_for_publish(&outbound.topic)?;
        let partition = topic.route(outbound.key.as_deref());
        let queue = Arc::clone(topic.queue(partition)?);

        let message = queue.enqueue(&outbound, self.ctx.clock.now()).await?;
        self.ctx.stats.record_published();

        let subscribers = topic.subscriber_count();
        if subscribers == 0 {
            warn!(
                topic = %outbound.topic,
                partition,
                sequence = message.sequence(),
                "No subscribers, message released"
            );
            topic.release_partition(partition, &self.ctx.tracker)?;
        }
        debug!(
            topic = %outbound.topic,
            partition,
            sequence = message.sequence(),
            key = ?outbound.key,
            subscribers,
            "Message published"
        );
        Ok(MessageHandle::new(&message, subscribers))
    }

    fn topic_for_publish(&self, name: &str) -> PubSubResult<Arc<Topic>> {
        match self.ctx.registry.get(name) {
            Ok(topic) => Ok(topic),
            Err(e) if !self.ctx.config.auto_create_topics => Err(e),
            Err(_) => {
                let (topic, created) = self
                    .ctx
                    .registry
                    .declare(name, self.ctx.config.default_topic.clone())?;
                if created {
                    info!(
                        topic = name,
                        partitions = topic.partitions(),
                        "Topic auto-created on publish"
                    );
                }
                Ok(topic)
            }
        }
    }

    // =========================================================================
    // SUBSCRIBE
    // =========================================================================

    /// Register `handler` for `subscriber` on `topic`. New subscriptions
    /// start after the current tail of each partition.
    pub fn subscribe(
        &self,
        topic: &str,
        subscriber: SubscriberId,
        handler: Arc<dyn MessageHandler>,
        policy: RetryPolicy,
    ) -> PubSubResult<SubscriptionHandle> {
        policy.validate()?;
        let topic = self.ctx.registry.get(topic)?;
        if topic.has_subscription(&subscriber) {
            return Err(PubSubError::AlreadySubscribed {
                topic: topic.name().to_string(),
                subscriber,
            });
        }
        let subscription = Arc::new(Subscription::new(
            topic.name(),
            subscriber.clone(),
            handler,
            policy,
            topic.partitions(),
        ));

        // Cursors sit at the tail before the subscription becomes visible to
        // a concurrent `start_dispatcher`, whose lanes would otherwise begin
        // at sequence 1.
        let start_cursors = self.initialize_cursors(&topic, &subscription)?;
        topic.add_subscription(Arc::clone(&subscription))?;

        self.ctx.dispatcher.spawn_lanes(&topic, &subscription);
        info!(
            topic = %topic.name(),
            subscriber = %subscriber,
            partitions = topic.partitions(),
            "Subscribed"
        );
        Ok(SubscriptionHandle {
            topic: topic.name().to_string(),
            subscriber,
            start_cursors,
        })
    }

    /// Subscribe with the broker's default retry policy.
    pub fn subscribe_default(
        &self,
        topic: &str,
        subscriber: SubscriberId,
        handler: Arc<dyn MessageHandler>,
    ) -> PubSubResult<SubscriptionHandle> {
        let policy = self.ctx.config.retry.clone();
        self.subscribe(topic, subscriber, handler, policy)
    }

    fn initialize_cursors(
        &self,
        topic: &Topic,
        subscription: &Subscription,
    ) -> PubSubResult<Vec<Sequence>> {
        let mut cursors = Vec::with_capacity(topic.queues().len());
        for queue in topic.queues() {
            let key = subscription.cursor_key(queue.partition());
            let tail = queue.tail_sequence();
            let mut cursor = self.ctx.tracker.initialize(&key, tail)?;
            if cursor > tail {
                warn!(
                    cursor = %key,
                    stored = cursor,
                    tail,
                    "Stored cursor beyond partition tail, resetting"
                );
                self.ctx.tracker.reset_cursor(&key, tail)?;
                cursor = tail;
            }
            cursors.push(cursor);
        }
        Ok(cursors)
    }

    /// Remove a subscription. A callback already running finishes; nothing
    /// further is dispatched and its cursors are discarded.
    pub fn unsubscribe(&self, topic: &str, subscriber: &SubscriberId) -> PubSubResult<()> {
        let topic = self.ctx.registry.get(topic)?;
        let subscription = topic.remove_subscription(subscriber)?;
        let keys: Vec<CursorKey> = (0..topic.partitions())
            .map(|p| subscription.cursor_key(p))
            .collect();
        self.ctx.tracker.discard(&keys, || subscription.cancel())?;

        // The departed subscription may have been the slowest.
        for partition in 0..topic.partitions() {
            topic.release_partition(partition, &self.ctx.tracker)?;
        }
        info!(topic = %topic.name(), subscriber = %subscriber, "Unsubscribed");
        Ok(())
    }

    // =========================================================================
    // CURSORS
    // =========================================================================

    /// Last acknowledged sequence (0 = none).
    pub fn current_cursor(
        &self,
        topic: &str,
        subscriber: &SubscriberId,
        partition: PartitionId,
    ) -> PubSubResult<Sequence> {
        let topic = self.ctx.registry.get(topic)?;
        let subscription = topic.subscription(subscriber)?;
        topic.queue(partition)?;
        self.ctx
            .tracker
            .current_cursor(&subscription.cursor_key(partition))
    }

    /// Operator reset. Returns the previous cursor. Running lanes pick up a
    /// forward reset on their next ack; a backward reset applies from the
    /// next dispatcher start.
    pub fn reset_cursor(
        &self,
        topic: &str,
        subscriber: &SubscriberId,
        partition: PartitionId,
        sequence: Sequence,
    ) -> PubSubResult<Sequence> {
        let topic = self.ctx.registry.get(topic)?;
        let subscription = topic.subscription(subscriber)?;
        topic.queue(partition)?;
        let previous = self
            .ctx
            .tracker
            .reset_cursor(&subscription.cursor_key(partition), sequence)?;
        topic.release_partition(partition, &self.ctx.tracker)?;
        Ok(previous)
    }

    /// Every stored cursor.
    pub fn cursors(&self) -> PubSubResult<Vec<(CursorKey, Sequence)>> {
        self.ctx.tracker.entries()
    }

    pub fn ack_tracker(&self) -> &AckTracker {
        &self.ctx.tracker
    }

    // =========================================================================
    // DISPATCHER
    // =========================================================================

    /// Spawn lanes for all subscriptions. Later subscriptions spawn their
    /// lanes immediately. Idempotent while running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_dispatcher(&self) {
        let topics = self.ctx.registry.all();
        if !self.ctx.dispatcher.start(&topics) {
            debug!("Dispatcher already running");
        }
    }

    /// Stop all lanes, waiting up to `shutdown_grace` for in-flight callbacks.
    pub async fn stop_dispatcher(&self) {
        self.ctx
            .dispatcher
            .stop(self.ctx.config.shutdown_grace)
            .await;
    }

    pub fn is_running(&self) -> bool {
        self.ctx.dispatcher.is_running()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.ctx.stats.snapshot()
    }

    /// Messages retained in a partition queue.
    pub fn queue_depth(&self, topic: &str, partition: PartitionId) -> PubSubResult<usize> {
        Ok(self.ctx.registry.get(topic)?.queue(partition)?.len())
    }
}

#[async_trait]
impl PubSubApi for PubSubBroker {
    fn declare_topic(&self, name: &str, partitions: u32) -> PubSubResult<()> {
        PubSubBroker::declare_topic(self, name, partitions)
    }

    fn declare_topic_with(&self, name: &str, config: TopicConfig) -> PubSubResult<()> {
        PubSubBroker::declare_topic_with(self, name, config)
    }

    fn delete_topic(&self, name: &str) -> PubSubResult<()> {
        PubSubBroker::delete_topic(self, name)
    }

    fn route(&self, topic: &str, key: Option<&str>) -> PubSubResult<PartitionId> {
        PubSubBroker::route(self, topic, key)
    }

    async fn publish(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: Bytes,
    ) -> PubSubResult<MessageHandle> {
        PubSubBroker::publish(self, topic, key, payload).await
    }

    async fn publish_message(&self, message: OutboundMessage) -> PubSubResult<MessageHandle> {
        PubSubBroker::publish_message(self, message).await
    }

    fn subscribe(
        &self,
        topic: &str,
        subscriber: SubscriberId,
        handler: Arc<dyn MessageHandler>,
        policy: RetryPolicy,
    ) -> PubSubResult<SubscriptionHandle> {
        PubSubBroker::subscribe(self, topic, subscriber, handler, policy)
    }

    fn unsubscribe(&self, topic: &str, subscriber: &SubscriberId) -> PubSubResult<()> {
        PubSubBroker::unsubscribe(self, topic, subscriber)
    }

    fn current_cursor(
        &self,
        topic: &str,
        subscriber: &SubscriberId,
        partition: PartitionId,
    ) -> PubSubResult<Sequence> {
        PubSubBroker::current_cursor(self, topic, subscriber, partition)
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Builder for `PubSubBroker` with pluggable collaborators.
#[derive(Default)]
pub struct BrokerBuilder {
    config: BrokerConfig,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
    cursor_store: Option<Arc<dyn CursorStore>>,
    clock: Option<Arc<dyn TimeSource>>,
}

impl BrokerBuilder {
    #[must_use]
    pub fn config(mut self, config: BrokerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn dead_letter_sink(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = Some(sink);
        self
    }

    #[must_use]
    pub fn cursor_store(mut self, store: Arc<dyn CursorStore>) -> Self {
        self.cursor_store = Some(store);
        self
    }

    #[must_use]
    pub fn time_source(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// # Errors
    ///
    /// - `InvalidConfig` - the broker config fails validation
    pub fn build(self) -> PubSubResult<PubSubBroker> {
        self.config.validate()?;

        let store = self
            .cursor_store
            .unwrap_or_else(|| Arc::new(InMemoryCursorStore::new()));
        let tracker = Arc::new(AckTracker::new(store, self.config.ack_tolerance));
        let stats = Arc::new(DispatcherStats::default());
        let dead_letters = self
            .dead_letters
            .unwrap_or_else(|| Arc::new(LoggingDeadLetterSink));
        let dispatcher = Dispatcher::new(DeliveryServices {
            tracker: Arc::clone(&tracker),
            dead_letters,
            stats: Arc::clone(&stats),
        });

        Ok(PubSubBroker {
            ctx: Arc::new(BrokerContext {
                config: self.config,
                registry: TopicRegistry::new(),
                tracker,
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemTimeSource)),
                stats,
                dispatcher,
            }),
        })
    }
}
