//! # Adapters Layer
//!
//! In-memory implementations of the outbound ports.
//!
//! - `cursor_store`: `InMemoryCursorStore`
//! - `dead_letter`: `InMemoryDeadLetterQueue`, `LoggingDeadLetterSink`
//! - `handler`: closure-backed `MessageHandler`

pub mod cursor_store;
pub mod dead_letter;
pub mod handler;

pub use cursor_store::InMemoryCursorStore;
pub use dead_letter::{InMemoryDeadLetterQueue, LoggingDeadLetterSink};
pub use handler::{handler_fn, FnHandler};
