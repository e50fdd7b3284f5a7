//! # Service Layer
//!
//! Wires the domain types into a running broker.
//!
//! - `broker`: `PubSubBroker` facade and `BrokerBuilder`
//! - `registry`: topics, partitions and subscriptions
//! - `dispatcher`: lane tasks, retry and dead-letter flow
//! - `ack_tracker`: serialised cursor updates
//! - `stats`: dispatcher counters

pub mod ack_tracker;
pub mod broker;
pub(crate) mod dispatcher;
pub(crate) mod registry;
pub mod stats;

pub use ack_tracker::AckTracker;
pub use broker::{BrokerBuilder, PubSubBroker};
pub use stats::{DispatcherStats, StatsSnapshot};
