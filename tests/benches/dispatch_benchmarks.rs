//! # Dispatch Benchmarks
//!
//! | Path | What is measured |
//! |------|------------------|
//! | Routing | SipHash key to partition |
//! | Publish | enqueue with no subscribers (immediate release) |
//! | End to end | publish a batch and wait for every callback |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pubsub_core::{
    handler_fn, BrokerConfig, PubSubBroker, RetryPolicy, SubscriberId, TopicConfig,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// ROUTING
// ============================================================================

fn bench_route(c: &mut Criterion) {
    let mut group = c.benchmark_group("routing");
    let broker = PubSubBroker::new(BrokerConfig::default()).unwrap();
    broker.declare_topic("orders", 16).unwrap();
    let keys: Vec<String> = (0..1024).map(|i| format!("customer-{i}")).collect();

    group.throughput(Throughput::Elements(keys.len() as u64));
    group.bench_function("route_1024_keys", |b| {
        b.iter(|| {
            for key in &keys {
                black_box(broker.route("orders", Some(key)).unwrap());
            }
        })
    });
    group.finish();
}

// ============================================================================
// PUBLISH
// ============================================================================

fn bench_publish(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("publish");
    let broker = PubSubBroker::new(BrokerConfig::default()).unwrap();
    broker.declare_topic("orders", 4).unwrap();

    for size in [64usize, 1024, 16 * 1024] {
        let payload = bytes::Bytes::from(vec![0xAB; size]);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("no_subscribers", size), &payload, |b, p| {
            b.to_async(&rt).iter(|| async {
                black_box(broker.publish("orders", Some("A"), p.clone()).await.unwrap())
            })
        });
    }
    group.finish();
}

// ============================================================================
// END TO END
// ============================================================================

fn bench_end_to_end(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("end_to_end");
    group.measurement_time(Duration::from_secs(10));

    for partitions in [1u32, 4] {
        let broker = PubSubBroker::new(BrokerConfig::default()).unwrap();
        broker
            .declare_topic_with("orders", TopicConfig::with_partitions(partitions).capacity(4096))
            .unwrap();
        let delivered = Arc::new(AtomicU64::new(0));
        let handler = {
            let delivered = delivered.clone();
            handler_fn(move |_, _| {
                let delivered = delivered.clone();
                async move {
                    delivered.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }
            })
        };
        broker
            .subscribe("orders", SubscriberId::new("bench"), handler, RetryPolicy::default())
            .unwrap();
        rt.block_on(async { broker.start_dispatcher() });

        let batch = 1000u64;
        group.throughput(Throughput::Elements(batch));
        group.bench_with_input(BenchmarkId::new("batch_1000", partitions), &batch, |b, &n| {
            b.to_async(&rt).iter(|| async {
                let target = delivered.load(Ordering::Relaxed) + n;
                for i in 0..n {
                    let key = format!("k{}", i % 32);
                    broker.publish("orders", Some(&key), "payload").await.unwrap();
                }
                while delivered.load(Ordering::Relaxed) < target {
                    tokio::task::yield_now().await;
                }
            })
        });
        rt.block_on(broker.stop_dispatcher());
    }
    group.finish();
}

criterion_group!(benches, bench_route, bench_publish, bench_end_to_end);
criterion_main!(benches);
