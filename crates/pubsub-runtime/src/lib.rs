//! # Pub/Sub Runtime
//!
//! Framework layer over `pubsub-core`.
//!
//! ## Modules
//!
//! - `config/` - `RuntimeConfig` loading (defaults, JSON file, env)
//! - `event/` - `PubSubEvent` JSON envelope
//! - `publisher/` - `EventPublisher` bound to one topic
//! - `processor/` - transform binding from an input to an output topic
//! - `subscriber/` - logging example subscriber
//! - `runtime/` - `PubSubRuntime` wiring the sample pipeline

pub mod config;
pub mod event;
pub mod processor;
pub mod publisher;
pub mod runtime;
pub mod subscriber;

pub use config::{ConfigError, PipelineConfig, RuntimeConfig, CONFIG_PATH_ENV};
pub use event::{uppercase_payload, CodecError, PubSubEvent, EVENT_TYPE_HEADER};
pub use processor::{Processor, Transform};
pub use publisher::{EventPublisher, PublishError};
pub use runtime::{PubSubRuntime, RuntimeError};
pub use subscriber::LoggingSubscriber;
