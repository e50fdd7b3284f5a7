//! # Backpressure
//!
//! A full partition either suspends the publisher or rejects the publish,
//! per topic policy. Other partitions are unaffected.

#[cfg(test)]
mod tests {
    use super::super::*;
    use pubsub_core::{BackpressurePolicy, PubSubError, SubscriberId, TopicConfig};

    fn bounded(partitions: u32, capacity: usize, policy: BackpressurePolicy) -> TopicConfig {
        TopicConfig::with_partitions(partitions)
            .capacity(capacity)
            .backpressure(policy)
    }

    #[tokio::test]
    async fn test_reject_until_dispatcher_drains() {
        let (broker, _) = broker_with_dlq();
        broker
            .declare_topic_with("orders", bounded(1, 2, BackpressurePolicy::Reject))
            .unwrap();
        let deliveries: Deliveries = Arc::default();
        broker
            .subscribe(
                "orders",
                SubscriberId::new("billing"),
                recording_handler(deliveries.clone()),
                RetryPolicy::default(),
            )
            .unwrap();

        broker.publish("orders", None, "1").await.unwrap();
        broker.publish("orders", None, "2").await.unwrap();
        let err = broker.publish("orders", None, "3").await.unwrap_err();
        assert!(matches!(err, PubSubError::QueueFull { capacity: 2, .. }));
        assert!(err.is_transient());

        broker.start_dispatcher();
        wait_until(|| broker.queue_depth("orders", 0).unwrap() == 0).await;
        broker.publish("orders", None, "3").await.unwrap();
        wait_until(|| deliveries.lock().len() == 3).await;
        broker.stop_dispatcher().await;

        let payloads: Vec<_> = deliveries.lock().iter().map(|d| d.payload.clone()).collect();
        assert_eq!(payloads, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_full_partition_does_not_block_others() {
        let (broker, _) = broker_with_dlq();
        broker
            .declare_topic_with("orders", bounded(2, 1, BackpressurePolicy::Reject))
            .unwrap();
        broker
            .subscribe(
                "orders",
                SubscriberId::new("billing"),
                recording_handler(Arc::default()),
                RetryPolicy::default(),
            )
            .unwrap();

        let full = broker.route("orders", Some("A")).unwrap();
        let other_key = (0..100)
            .map(|i| format!("key-{i}"))
            .find(|k| broker.route("orders", Some(k)).unwrap() != full)
            .unwrap();

        broker.publish("orders", Some("A"), "a1").await.unwrap();
        assert!(matches!(
            broker.publish("orders", Some("A"), "a2").await,
            Err(PubSubError::QueueFull { partition, .. }) if partition == full
        ));
        let handle = broker
            .publish("orders", Some(&other_key), "b1")
            .await
            .unwrap();
        assert_ne!(handle.partition, full);
    }

    #[tokio::test]
    async fn test_block_suspends_publisher_until_space() {
        let (broker, _) = broker_with_dlq();
        broker
            .declare_topic_with("orders", bounded(1, 1, BackpressurePolicy::Block))
            .unwrap();
        let deliveries: Deliveries = Arc::default();
        broker
            .subscribe(
                "orders",
                SubscriberId::new("billing"),
                recording_handler(deliveries.clone()),
                RetryPolicy::default(),
            )
            .unwrap();

        broker.publish("orders", None, "first").await.unwrap();
        let blocked = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.publish("orders", None, "second").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());

        broker.start_dispatcher();
        let handle = tokio::time::timeout(Duration::from_secs(5), blocked)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(handle.sequence, 2);

        wait_until(|| deliveries.lock().len() == 2).await;
        broker.stop_dispatcher().await;
    }

    #[tokio::test]
    async fn test_slow_consumer_keeps_queue_bounded() {
        let (broker, _) = broker_with_dlq();
        broker
            .declare_topic_with("telemetry", bounded(1, 4, BackpressurePolicy::Block))
            .unwrap();
        let slow = handler_fn(|_, _| async {
            tokio::time::sleep(Duration::from_millis(2)).await;
            Ok(())
        });
        broker
            .subscribe("telemetry", SubscriberId::new("slow"), slow, RetryPolicy::default())
            .unwrap();
        broker.start_dispatcher();

        for i in 0..40 {
            broker.publish("telemetry", None, format!("{i}")).await.unwrap();
            assert!(broker.queue_depth("telemetry", 0).unwrap() <= 4);
        }
        wait_until(|| broker.stats().delivered == 40).await;
        broker.stop_dispatcher().await;
    }
}
