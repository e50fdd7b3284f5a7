//! # Ordering and Fan-out
//!
//! Messages sharing a key reach each subscriber in publish order, and every
//! subscription receives every message independently.

#[cfg(test)]
mod tests {
    use super::super::*;
    use pubsub_core::SubscriberId;
    use rand::seq::SliceRandom;
    use rand::Rng;
    use std::collections::HashMap;

    // =========================================================================
    // PER-KEY ORDER
    // =========================================================================

    #[tokio::test]
    async fn test_per_key_order_with_concurrent_publishers() {
        let (broker, dlq) = broker_with_dlq();
        broker.declare_topic("orders", 4).unwrap();
        let deliveries: Deliveries = Arc::default();
        broker
            .subscribe(
                "orders",
                SubscriberId::new("billing"),
                recording_handler(deliveries.clone()),
                RetryPolicy::default(),
            )
            .unwrap();
        broker.start_dispatcher();

        let mut publishers = tokio::task::JoinSet::new();
        for customer in 0..6 {
            let broker = broker.clone();
            publishers.spawn(async move {
                let key = format!("customer-{customer}");
                for i in 0..40 {
                    broker
                        .publish("orders", Some(&key), format!("{key}/{i}"))
                        .await
                        .unwrap();
                }
            });
        }
        while let Some(result) = publishers.join_next().await {
            result.unwrap();
        }

        wait_until(|| deliveries.lock().len() == 240).await;
        broker.stop_dispatcher().await;

        let mut per_key: HashMap<String, Vec<(usize, Sequence)>> = HashMap::new();
        for d in deliveries.lock().iter() {
            let index = d.payload.rsplit('/').next().unwrap().parse().unwrap();
            per_key
                .entry(d.key.clone().unwrap())
                .or_default()
                .push((index, d.sequence));
        }
        assert_eq!(per_key.len(), 6);
        for (key, seen) in per_key {
            let indexes: Vec<_> = seen.iter().map(|s| s.0).collect();
            assert_eq!(indexes, (0..40).collect::<Vec<_>>(), "key {key} out of order");
            assert!(seen.windows(2).all(|w| w[0].1 < w[1].1));
        }
        assert!(dlq.is_empty());
    }

    #[tokio::test]
    async fn test_random_keys_stick_to_one_partition() {
        let (broker, _) = broker_with_dlq();
        broker.declare_topic("clicks", 8).unwrap();
        let deliveries: Deliveries = Arc::default();
        broker
            .subscribe(
                "clicks",
                SubscriberId::new("analytics"),
                recording_handler(deliveries.clone()),
                RetryPolicy::default(),
            )
            .unwrap();
        broker.start_dispatcher();

        let keys: Vec<String> = (0..20).map(|i| format!("session-{i}")).collect();
        let picks: Vec<String> = {
            let mut rng = rand::thread_rng();
            (0..300)
                .map(|_| keys.choose(&mut rng).unwrap().clone())
                .collect()
        };
        for (i, key) in picks.iter().enumerate() {
            broker
                .publish("clicks", Some(key), format!("{i}"))
                .await
                .unwrap();
        }

        wait_until(|| deliveries.lock().len() == picks.len()).await;
        broker.stop_dispatcher().await;

        let mut partitions: HashMap<String, PartitionId> = HashMap::new();
        for d in deliveries.lock().iter() {
            let key = d.key.clone().unwrap();
            let expected = broker.route("clicks", Some(&key)).unwrap();
            assert_eq!(d.partition, expected);
            assert_eq!(*partitions.entry(key).or_insert(d.partition), d.partition);
        }
    }

    #[tokio::test]
    async fn test_unkeyed_messages_spread_and_all_arrive() {
        let (broker, _) = broker_with_dlq();
        broker.declare_topic("metrics", 4).unwrap();
        let deliveries: Deliveries = Arc::default();
        broker
            .subscribe(
                "metrics",
                SubscriberId::new("collector"),
                recording_handler(deliveries.clone()),
                RetryPolicy::default(),
            )
            .unwrap();
        broker.start_dispatcher();

        let count = rand::thread_rng().gen_range(20..60);
        for i in 0..count {
            broker.publish("metrics", None, format!("{i}")).await.unwrap();
        }

        wait_until(|| deliveries.lock().len() == count).await;
        broker.stop_dispatcher().await;

        let mut payloads: Vec<usize> = deliveries
            .lock()
            .iter()
            .map(|d| d.payload.parse().unwrap())
            .collect();
        payloads.sort_unstable();
        assert_eq!(payloads, (0..count).collect::<Vec<_>>());
    }

    // =========================================================================
    // FAN-OUT
    // =========================================================================

    #[tokio::test]
    async fn test_every_subscriber_sees_every_message() {
        let (broker, _) = broker_with_dlq();
        broker.declare_topic("orders", 2).unwrap();
        let billing: Deliveries = Arc::default();
        let shipping: Deliveries = Arc::default();
        broker
            .subscribe(
                "orders",
                SubscriberId::new("billing"),
                recording_handler(billing.clone()),
                RetryPolicy::default(),
            )
            .unwrap();
        broker
            .subscribe(
                "orders",
                SubscriberId::new("shipping"),
                recording_handler(shipping.clone()),
                RetryPolicy::default(),
            )
            .unwrap();
        broker.start_dispatcher();

        let mut last = HashMap::new();
        for i in 0..30 {
            let key = format!("k{}", i % 3);
            let handle = broker
                .publish("orders", Some(&key), format!("{i}"))
                .await
                .unwrap();
            assert_eq!(handle.subscribers, 2);
            last.insert(handle.partition, handle.sequence);
        }

        wait_until(|| billing.lock().len() == 30 && shipping.lock().len() == 30).await;
        broker.stop_dispatcher().await;

        let order = |d: &Deliveries| {
            let mut seen: Vec<_> = d.lock().iter().map(|d| (d.partition, d.sequence)).collect();
            seen.sort_unstable();
            seen
        };
        assert_eq!(order(&billing), order(&shipping));
        for (partition, sequence) in last {
            for subscriber in ["billing", "shipping"] {
                assert_eq!(
                    broker
                        .current_cursor("orders", &SubscriberId::new(subscriber), partition)
                        .unwrap(),
                    sequence
                );
            }
            assert_eq!(broker.queue_depth("orders", partition).unwrap(), 0);
        }
    }
}
