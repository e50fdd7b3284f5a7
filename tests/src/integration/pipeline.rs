//! # Runtime Pipeline
//!
//! The framework layer end to end: configuration, the uppercase processor
//! and the logging subscriber.

#[cfg(test)]
mod tests {
    use super::super::*;
    use pubsub_core::SubscriberId;
    use pubsub_runtime::{
        EventPublisher, Processor, PubSubEvent, PubSubRuntime, RuntimeConfig, Transform,
        EVENT_TYPE_HEADER,
    };
    use std::collections::HashMap;
    use std::io::Write;

    fn event_recorder(seen: Arc<Mutex<Vec<(Option<String>, String, String)>>>) -> Arc<dyn MessageHandler> {
        handler_fn(move |payload, meta: DeliveryMetadata| {
            let seen = Arc::clone(&seen);
            async move {
                let event = PubSubEvent::decode(&payload)
                    .map_err(|e| pubsub_core::HandlerError::failed(e.to_string()))?;
                seen.lock().push((
                    meta.key().map(str::to_string),
                    meta.header(EVENT_TYPE_HEADER).unwrap_or_default().to_string(),
                    event.payload,
                ));
                Ok::<(), pubsub_core::HandlerError>(())
            }
        })
    }

    #[tokio::test]
    async fn test_runtime_preserves_key_order_through_processor() {
        pubsub_telemetry::init_test_logging();
        let runtime = PubSubRuntime::new(RuntimeConfig::default()).unwrap();
        runtime.start().unwrap();

        let publisher = runtime.input_publisher();
        for i in 0..20 {
            let key = format!("user-{}", i % 4);
            publisher
                .publish_keyed(Some(&key), &PubSubEvent::new("chat", format!("{key} msg {i}")))
                .await
                .unwrap();
        }

        wait_until(|| runtime.subscriber().received() == 20).await;
        runtime.shutdown().await;

        let mut per_key: HashMap<String, Vec<usize>> = HashMap::new();
        for event in runtime.subscriber().recent() {
            assert_eq!(event.payload, event.payload.to_uppercase());
            let mut parts = event.payload.split(' ');
            let key = parts.next().unwrap().to_string();
            let index = parts.last().unwrap().parse().unwrap();
            per_key.entry(key).or_default().push(index);
        }
        assert_eq!(per_key.len(), 4);
        for indexes in per_key.values() {
            assert!(indexes.windows(2).all(|w| w[0] < w[1]));
        }

        let stats = runtime.broker().stats();
        assert_eq!(stats.published, 40);
        assert_eq!(stats.delivered, 40);
    }

    #[tokio::test]
    async fn test_processor_chain_keeps_key_and_header() {
        let (broker, dlq) = broker_with_dlq();
        for topic in ["raw", "clean", "shouted"] {
            broker.declare_topic(topic, 2).unwrap();
        }
        let trim: Transform = Arc::new(|event: PubSubEvent| {
            PubSubEvent::new(event.event_type, event.payload.trim())
        });
        let shout: Transform = Arc::new(pubsub_runtime::uppercase_payload);
        Processor::bind(&broker, "raw", "clean", SubscriberId::new("trim"), trim, fast_retry(3))
            .unwrap();
        Processor::bind(&broker, "clean", "shouted", SubscriberId::new("shout"), shout, fast_retry(3))
            .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        broker
            .subscribe(
                "shouted",
                SubscriberId::new("sink"),
                event_recorder(seen.clone()),
                RetryPolicy::default(),
            )
            .unwrap();
        broker.start_dispatcher();

        EventPublisher::new(broker.clone(), "raw")
            .publish_keyed(Some("order-9"), &PubSubEvent::new("note", "  hello  "))
            .await
            .unwrap();

        wait_until(|| seen.lock().len() == 1).await;
        broker.stop_dispatcher().await;
        assert_eq!(
            seen.lock()[0],
            (
                Some("order-9".to_string()),
                "note".to_string(),
                "HELLO".to_string()
            )
        );
        assert!(dlq.is_empty());
    }

    #[tokio::test]
    async fn test_runtime_from_config_file_and_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "broker": {{ "default_topic": {{ "partitions": 3 }} }},
                "pipeline": {{ "input_topic": "requests" }}
            }}"#
        )
        .unwrap();

        let mut config = RuntimeConfig::from_file(file.path()).unwrap();
        config
            .apply_env(|var| match var {
                "PUBSUB_OUTPUT_TOPIC" => Some("responses".to_string()),
                "PUBSUB_MAX_ATTEMPTS" => Some("2".to_string()),
                _ => None,
            })
            .unwrap();
        config.validate().unwrap();
        assert_eq!(config.broker.retry.max_attempts, 2);

        let runtime = PubSubRuntime::new(config).unwrap();
        runtime.start().unwrap();
        assert_eq!(runtime.broker().topics(), vec!["requests", "responses"]);
        assert_eq!(runtime.broker().topic_config("requests").unwrap().partitions, 3);

        runtime
            .input_publisher()
            .publish(&PubSubEvent::new("ping", "pong"))
            .await
            .unwrap();
        wait_until(|| runtime.subscriber().received() == 1).await;
        assert_eq!(runtime.subscriber().recent()[0].payload, "PONG");
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_undecodable_input_is_dead_lettered_not_forwarded() {
        let (broker, dlq) = broker_with_dlq();
        broker.declare_topic("input", 1).unwrap();
        broker.declare_topic("output", 1).unwrap();
        Processor::bind(
            &broker,
            "input",
            "output",
            SubscriberId::new("upper"),
            Arc::new(pubsub_runtime::uppercase_payload),
            fast_retry(2),
        )
        .unwrap();
        let forwarded: Deliveries = Arc::default();
        broker
            .subscribe(
                "output",
                SubscriberId::new("sink"),
                recording_handler(forwarded.clone()),
                RetryPolicy::default(),
            )
            .unwrap();
        broker.start_dispatcher();

        broker.publish("input", Some("k"), "{not json").await.unwrap();
        EventPublisher::new(broker.clone(), "input")
            .publish_keyed(Some("k"), &PubSubEvent::new("t", "ok"))
            .await
            .unwrap();

        wait_until(|| dlq.len() == 1 && forwarded.lock().len() == 1).await;
        broker.stop_dispatcher().await;
        assert_eq!(dlq.letters()[0].attempts, 2);
        let event = PubSubEvent::decode(forwarded.lock()[0].payload.as_bytes()).unwrap();
        assert_eq!(event.payload, "OK");
    }
}
