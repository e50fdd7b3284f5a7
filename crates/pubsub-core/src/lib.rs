//! # Pub/Sub Core - In-Process Dispatch Engine
//!
//! Routes published messages into partitioned, bounded queues and delivers
//! them to subscriber callbacks with at-least-once semantics.
//!
//! ## Data Flow
//!
//! ```text
//! ┌───────────┐  route(key)  ┌──────────────────┐   lane per (partition,    ┌────────────┐
//! │ publish() │ ───────────→ │ Partition Queue  │ ──  subscription) ──────→ │  Handler   │
//! └───────────┘              │ (bounded, FIFO)  │                           └────────────┘
//!                            └──────────────────┘                              │     │
//!                                     ↑ release                          Ok    │     │ Err
//!                                     │                                        ↓     ↓
//!                            ┌──────────────────┐    advance cursor   ┌──────────────────┐
//!                            │   Ack Tracker    │ ←────────────────── │ retry w/ backoff │
//!                            └──────────────────┘                     │  → dead-letter   │
//!                                                                     └──────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! | Guarantee | Enforcement Location |
//! |-----------|---------------------|
//! | Same key, same partition | `domain/router.rs` - `PartitionRouter::route()` |
//! | FIFO per partition | `domain/queue.rs` - monotonically increasing sequences |
//! | One lane per (partition, subscription) | `service/dispatcher.rs` - epoch claim |
//! | Cursor never regresses | `domain/cursor.rs` - `evaluate_ack()` |
//! | Backpressure, never silent drop | `domain/queue.rs` - `enqueue()` |
//! | Exactly one dead-letter per exhausted message | `service/dispatcher.rs` - `Lane::deliver()` |
//!
//! ## Module Structure (Hexagonal Architecture)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  adapters/ - in-memory cursor store, dead-letter sinks, fn     │
//! │              handlers                                          │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ implements ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  ports/inbound.rs  - PubSubApi trait                           │
//! │  ports/outbound.rs - MessageHandler, DeadLetterSink,           │
//! │                      CursorStore, TimeSource                   │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  service/ - PubSubBroker, TopicRegistry, Dispatcher, AckTracker│
//! │  domain/  - Message, PartitionQueue, PartitionRouter,          │
//! │             Delivery typestate, RetryPolicy, errors            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let broker = PubSubBroker::new(BrokerConfig::default())?;
//! broker.declare_topic("orders", 4)?;
//! broker.subscribe(
//!     "orders",
//!     SubscriberId::new("billing"),
//!     handler_fn(|payload, meta| async move { Ok(()) }),
//!     RetryPolicy::default(),
//! )?;
//! broker.start_dispatcher();
//! broker.publish("orders", Some("customer-7"), Bytes::from_static(b"p1")).await?;
//! broker.stop_dispatcher().await;
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

// Re-export main types
pub use adapters::{handler_fn, InMemoryCursorStore, InMemoryDeadLetterQueue, LoggingDeadLetterSink};
pub use domain::{
    AckOutcome, BackpressurePolicy, BrokerConfig, CursorKey, DeadLetter, DeliveryMetadata,
    DeliveryState, HandlerError, Message, MessageHandle, MessageId, OutboundMessage, PartitionId,
    PubSubError, PubSubResult, RetryPolicy, Sequence, SubscriberId, SubscriptionHandle, Timestamp,
    TopicConfig,
};
pub use ports::{
    CursorStore, DeadLetterSink, MessageHandler, PubSubApi, SystemTimeSource, TimeSource,
};
pub use service::{AckTracker, BrokerBuilder, PubSubBroker, StatsSnapshot};

/// Default number of partitions for auto-created topics.
pub const DEFAULT_PARTITIONS: u32 = 4;

/// Maximum messages buffered per partition before backpressure.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Default delivery attempts before a message is dead-lettered.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
