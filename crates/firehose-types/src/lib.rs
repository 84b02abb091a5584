//! Shared data model for the firehose nozzle.
//!
//! Kept dependency-light so the cache, engine and CLI crates can share the
//! same event and metadata types without circular dependencies.

#![warn(clippy::pedantic)]

pub mod app;
pub mod envelope;
pub mod event;
pub mod kind;

pub use app::{AppGuid, AppMetadata};
pub use envelope::{Envelope, EventPayload, MessageType};
pub use event::Event;
pub use kind::{EventKind, UnknownEventKind};
