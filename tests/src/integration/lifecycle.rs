//! # Lifecycle
//!
//! Dispatcher restarts, unsubscribe, cursor resets and topic deletion.

#[cfg(test)]
mod tests {
    use super::super::*;
    use pubsub_core::{
        BrokerConfig, HandlerError, InMemoryCursorStore, PubSubApi, PubSubError, SubscriberId,
    };
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use tokio::sync::Notify;

    /// In-flight callbacks per (subscriber, partition) and the highest seen.
    #[derive(Default)]
    struct Occupancy {
        active: HashMap<(String, PartitionId), u32>,
        peak: HashMap<(String, PartitionId), u32>,
        seen: HashSet<(String, PartitionId, Sequence)>,
        order: HashMap<(String, PartitionId), Vec<Sequence>>,
    }

    fn occupancy_handler(
        occupancy: Arc<Mutex<Occupancy>>,
        hold: Duration,
    ) -> Arc<dyn MessageHandler> {
        handler_fn(move |_, meta: DeliveryMetadata| {
            let occupancy = occupancy.clone();
            async move {
                let lane = (meta.subscriber().to_string(), meta.partition());
                {
                    let mut occ = occupancy.lock();
                    let active = occ.active.entry(lane.clone()).or_default();
                    *active += 1;
                    let now = *active;
                    let peak = occ.peak.entry(lane.clone()).or_default();
                    *peak = (*peak).max(now);
                }
                tokio::time::sleep(hold).await;
                let mut occ = occupancy.lock();
                *occ.active.entry(lane.clone()).or_default() -= 1;
                occ.seen.insert((lane.0.clone(), lane.1, meta.sequence()));
                occ.order.entry(lane).or_default().push(meta.sequence());
                Ok(())
            }
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_one_callback_per_lane_across_restarts() {
        let (broker, dlq) = broker_with_dlq();
        broker.declare_topic("orders", 4).unwrap();
        let occupancy = Arc::new(Mutex::new(Occupancy::default()));
        for name in ["billing", "audit"] {
            broker
                .subscribe(
                    "orders",
                    SubscriberId::new(name),
                    occupancy_handler(occupancy.clone(), Duration::from_millis(15)),
                    RetryPolicy::default(),
                )
                .unwrap();
        }
        broker.start_dispatcher();

        for round in 0..3 {
            for i in 0..16 {
                let key = format!("k{}", i % 8);
                broker
                    .publish("orders", Some(&key), format!("{round}-{i}"))
                    .await
                    .unwrap();
            }
            // Restart from a second handle while lanes are mid-callback.
            let stopping = {
                let broker = broker.clone();
                tokio::spawn(async move { broker.stop_dispatcher().await })
            };
            tokio::time::sleep(Duration::from_millis(5)).await;
            broker.start_dispatcher();
            stopping.await.unwrap();
            // No-op unless the restart landed before the stop took effect.
            broker.start_dispatcher();
        }

        wait_until(|| occupancy.lock().seen.len() == 2 * 48).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        broker.stop_dispatcher().await;

        let occ = occupancy.lock();
        assert!(!occ.peak.is_empty());
        for (lane, peak) in &occ.peak {
            assert_eq!(*peak, 1, "lane {lane:?} ran callbacks concurrently");
        }
        for (lane, sequences) in &occ.order {
            assert!(
                sequences.windows(2).all(|w| w[0] <= w[1]),
                "lane {lane:?} went backwards: {sequences:?}"
            );
        }
        assert!(dlq.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_during_backoff_redelivers_after_restart() {
        let (broker, dlq) = broker_with_dlq();
        broker.declare_topic("orders", 1).unwrap();
        let healthy = Arc::new(AtomicBool::new(false));
        let attempts = Arc::new(AtomicU32::new(0));
        let handler = {
            let healthy = healthy.clone();
            let attempts = attempts.clone();
            handler_fn(move |_, _| {
                let healthy = healthy.clone();
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    if healthy.load(Ordering::SeqCst) {
                        Ok(())
                    } else {
                        Err(HandlerError::failed("dependency down"))
                    }
                }
            })
        };
        let billing = SubscriberId::new("billing");
        broker
            .subscribe(
                "orders",
                billing.clone(),
                handler,
                RetryPolicy::default()
                    .with_max_attempts(5)
                    .with_backoff(Duration::from_secs(30), Duration::from_secs(60)),
            )
            .unwrap();
        broker.start_dispatcher();

        let handle = broker.publish("orders", None, "p1").await.unwrap();
        wait_until(|| attempts.load(Ordering::SeqCst) == 1).await;
        broker.stop_dispatcher().await;
        assert_eq!(broker.current_cursor("orders", &billing, 0).unwrap(), 0);

        healthy.store(true, Ordering::SeqCst);
        broker.start_dispatcher();
        wait_until(|| broker.current_cursor("orders", &billing, 0).unwrap() == handle.sequence)
            .await;
        broker.stop_dispatcher().await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(dlq.is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_finishes_current_callback_then_stops() {
        let (broker, _) = broker_with_dlq();
        broker.declare_topic("orders", 1).unwrap();
        let gate = Arc::new(Notify::new());
        let started = Arc::new(AtomicU32::new(0));
        let finished = Arc::new(AtomicU32::new(0));
        let handler = {
            let gate = gate.clone();
            let started = started.clone();
            let finished = finished.clone();
            handler_fn(move |_, _| {
                let gate = gate.clone();
                let started = started.clone();
                let finished = finished.clone();
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    gate.notified().await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
        };
        let billing = SubscriberId::new("billing");
        broker
            .subscribe("orders", billing.clone(), handler, RetryPolicy::default())
            .unwrap();
        broker.start_dispatcher();

        for i in 0..3 {
            broker.publish("orders", None, format!("{i}")).await.unwrap();
        }
        wait_until(|| started.load(Ordering::SeqCst) == 1).await;

        broker.unsubscribe("orders", &billing).unwrap();
        assert!(broker.subscribers("orders").unwrap().is_empty());
        gate.notify_one();

        wait_until(|| finished.load(Ordering::SeqCst) == 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        // No subscriptions left, so nothing is retained.
        assert_eq!(broker.queue_depth("orders", 0).unwrap(), 0);
        assert!(matches!(
            broker.current_cursor("orders", &billing, 0),
            Err(PubSubError::SubscriptionNotFound { .. })
        ));
        broker.stop_dispatcher().await;
    }

    #[tokio::test]
    async fn test_resubscribe_starts_at_tail() {
        let (broker, _) = broker_with_dlq();
        broker.declare_topic("orders", 1).unwrap();
        let billing = SubscriberId::new("billing");
        let first: Deliveries = Arc::default();
        broker
            .subscribe(
                "orders",
                billing.clone(),
                recording_handler(first.clone()),
                RetryPolicy::default(),
            )
            .unwrap();
        broker.start_dispatcher();
        broker.publish("orders", None, "before").await.unwrap();
        wait_until(|| first.lock().len() == 1).await;

        broker.unsubscribe("orders", &billing).unwrap();
        broker.publish("orders", None, "gap").await.unwrap();

        let second: Deliveries = Arc::default();
        let handle = broker
            .subscribe(
                "orders",
                billing.clone(),
                recording_handler(second.clone()),
                RetryPolicy::default(),
            )
            .unwrap();
        assert_eq!(handle.start_cursors, vec![2]);
        broker.publish("orders", None, "after").await.unwrap();

        wait_until(|| second.lock().len() == 1).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        broker.stop_dispatcher().await;
        assert_eq!(second.lock()[0].payload, "after");
        assert_eq!(first.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_forward_reset_skips_messages() {
        let (broker, _) = broker_with_dlq();
        broker.declare_topic("orders", 1).unwrap();
        let billing = SubscriberId::new("billing");
        let deliveries: Deliveries = Arc::default();
        broker
            .subscribe(
                "orders",
                billing.clone(),
                recording_handler(deliveries.clone()),
                RetryPolicy::default(),
            )
            .unwrap();

        for i in 1..=5 {
            broker.publish("orders", None, format!("{i}")).await.unwrap();
        }
        assert_eq!(broker.reset_cursor("orders", &billing, 0, 3).unwrap(), 0);
        assert_eq!(broker.queue_depth("orders", 0).unwrap(), 2);

        broker.start_dispatcher();
        wait_until(|| deliveries.lock().len() == 2).await;
        broker.stop_dispatcher().await;

        let payloads: Vec<_> = deliveries.lock().iter().map(|d| d.payload.clone()).collect();
        assert_eq!(payloads, vec!["4", "5"]);
    }

    #[tokio::test]
    async fn test_shared_cursor_store_past_tail_resets() {
        let store = Arc::new(InMemoryCursorStore::new());
        let billing = SubscriberId::new("billing");

        let first = PubSubBroker::builder()
            .cursor_store(store.clone())
            .build()
            .unwrap();
        first.declare_topic("orders", 1).unwrap();
        let deliveries: Deliveries = Arc::default();
        first
            .subscribe(
                "orders",
                billing.clone(),
                recording_handler(deliveries.clone()),
                RetryPolicy::default(),
            )
            .unwrap();
        first.start_dispatcher();
        for i in 0..3 {
            first.publish("orders", None, format!("{i}")).await.unwrap();
        }
        wait_until(|| first.current_cursor("orders", &billing, 0).unwrap() == 3).await;
        first.stop_dispatcher().await;
        drop(first);

        // Queues are in memory, so a fresh broker starts with empty partitions.
        let second = PubSubBroker::builder()
            .cursor_store(store)
            .build()
            .unwrap();
        second.declare_topic("orders", 1).unwrap();
        let handle = second
            .subscribe(
                "orders",
                billing.clone(),
                recording_handler(deliveries.clone()),
                RetryPolicy::default(),
            )
            .unwrap();
        assert_eq!(handle.start_cursors, vec![0]);

        second.start_dispatcher();
        second.publish("orders", None, "fresh").await.unwrap();
        wait_until(|| deliveries.lock().len() == 4).await;
        second.stop_dispatcher().await;
        assert_eq!(deliveries.lock()[3].payload, "fresh");
    }

    #[tokio::test]
    async fn test_delete_topic_while_running() {
        let broker = PubSubBroker::new(BrokerConfig {
            auto_create_topics: false,
            ..BrokerConfig::default()
        })
        .unwrap();
        broker.declare_topic("orders", 2).unwrap();
        broker
            .subscribe(
                "orders",
                SubscriberId::new("billing"),
                recording_handler(Arc::default()),
                RetryPolicy::default(),
            )
            .unwrap();
        broker.start_dispatcher();
        broker.publish("orders", None, "x").await.unwrap();

        broker.delete_topic("orders").unwrap();
        assert!(broker.topics().is_empty());
        assert!(matches!(
            broker.publish("orders", None, "y").await,
            Err(PubSubError::TopicNotFound { .. })
        ));

        // The name can be declared again with a different shape.
        broker.declare_topic("orders", 4).unwrap();
        assert_eq!(broker.topic_config("orders").unwrap().partitions, 4);
        broker.stop_dispatcher().await;
    }

    #[tokio::test]
    async fn test_drive_through_api_trait() {
        let (broker, _) = broker_with_dlq();
        let api: Arc<dyn PubSubApi> = Arc::new(broker.clone());
        api.declare_topic("orders", 2).unwrap();
        let deliveries: Deliveries = Arc::default();
        let billing = SubscriberId::new("billing");
        api.subscribe(
            "orders",
            billing.clone(),
            recording_handler(deliveries.clone()),
            RetryPolicy::default(),
        )
        .unwrap();
        broker.start_dispatcher();

        let handle = api
            .publish("orders", Some("A"), bytes::Bytes::from_static(b"via-trait"))
            .await
            .unwrap();
        wait_until(|| deliveries.lock().len() == 1).await;
        assert_eq!(
            api.current_cursor("orders", &billing, handle.partition)
                .unwrap(),
            handle.sequence
        );
        api.unsubscribe("orders", &billing).unwrap();
        broker.stop_dispatcher().await;
    }
}
