//! Ports for the dispatch core.
//!
//! - `inbound`: the API the broker offers (`PubSubApi`)
//! - `outbound`: collaborators the broker calls (`MessageHandler`,
//!   `DeadLetterSink`, `CursorStore`, `TimeSource`)

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
