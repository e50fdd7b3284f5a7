//! Inbound (Driving) port for the dispatch core.
//!
//! The API publishers, subscribers and operators use. `PubSubBroker` is
//! the in-process implementation.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use super::outbound::MessageHandler;
use crate::domain::{
    MessageHandle, OutboundMessage, PartitionId, PubSubResult, RetryPolicy, Sequence,
    SubscriberId, SubscriptionHandle, TopicConfig,
};

/// Primary API of the pub/sub core.
#[async_trait]
pub trait PubSubApi: Send + Sync {
    /// Create a topic if absent.
    ///
    /// # Errors
    ///
    /// - `TopicConflict` - declared before with a different partition count
    /// - `InvalidConfig` - zero partitions
    fn declare_topic(&self, name: &str, partitions: u32) -> PubSubResult<()>;

    /// Create a topic with full configuration if absent.
    fn declare_topic_with(&self, name: &str, config: TopicConfig) -> PubSubResult<()>;

    /// Remove a topic, its subscriptions and their cursors.
    fn delete_topic(&self, name: &str) -> PubSubResult<()>;

    /// Partition a message with `key` would be routed to.
    fn route(&self, topic: &str, key: Option<&str>) -> PubSubResult<PartitionId>;

    /// Publish a payload.
    ///
    /// # Errors
    ///
    /// - `TopicNotFound` - undeclared topic with auto-creation disabled
    /// - `QueueFull` - partition full under the reject policy
    async fn publish(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: Bytes,
    ) -> PubSubResult<MessageHandle>;

    /// Publish a fully built message (key, headers).
    async fn publish_message(&self, message: OutboundMessage) -> PubSubResult<MessageHandle>;

    /// Register a handler on a topic.
    ///
    /// # Errors
    ///
    /// - `TopicNotFound` - topic not declared
    /// - `AlreadySubscribed` - subscriber already on this topic
    fn subscribe(
        &self,
        topic: &str,
        subscriber: SubscriberId,
        handler: Arc<dyn MessageHandler>,
        policy: RetryPolicy,
    ) -> PubSubResult<SubscriptionHandle>;

    /// Remove a subscription. An in-flight callback finishes; nothing
    /// further is dispatched.
    fn unsubscribe(&self, topic: &str, subscriber: &SubscriberId) -> PubSubResult<()>;

    /// Last acknowledged sequence (0 = none).
    fn current_cursor(
        &self,
        topic: &str,
        subscriber: &SubscriberId,
        partition: PartitionId,
    ) -> PubSubResult<Sequence>;
}
