//! # Domain Layer - Pub/Sub Core
//!
//! Pure data types and state for the dispatch core. Nothing here spawns
//! tasks or talks to collaborators; the `service` layer does that.
//!
//! ## Components
//!
//! - `value_objects`: SubscriberId, MessageId, sequence/partition aliases
//! - `message`: immutable Message, OutboundMessage, MessageHandle, DeliveryMetadata
//! - `router`: PartitionRouter (key hash / round-robin)
//! - `queue`: PartitionQueue (bounded FIFO with backpressure)
//! - `delivery`: Delivery typestate and DeadLetter record
//! - `cursor`: CursorKey and the ack acceptance rule
//! - `retry`: RetryPolicy and backoff schedule
//! - `config`: BrokerConfig, TopicConfig, BackpressurePolicy
//! - `errors`: PubSubError, HandlerError

pub mod config;
pub mod cursor;
pub mod delivery;
pub mod errors;
pub mod message;
pub mod queue;
pub mod retry;
pub mod router;
pub mod value_objects;

pub use config::*;
pub use cursor::*;
pub use delivery::*;
pub use errors::*;
pub use message::*;
pub use queue::*;
pub use retry::*;
pub use router::*;
pub use value_objects::*;
