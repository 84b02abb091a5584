//! Bootstrap and runtime of the firehose-to-syslog nozzle.
//!
//! [`orchestrator::Bootstrap`] wires the components in order: platform
//! client, cache selection, routing, cache open, credential session, sink
//! validation and finally the event stream. Fatal failures surface as
//! [`BootstrapError`]; sink or stream unavailability as
//! [`BootstrapOutcome::DegradedStop`].

#![warn(clippy::pedantic)]

pub mod auth;
pub mod caching;
pub mod collaborators;
pub mod config;
pub mod errors;
pub mod http;
pub mod lifecycle;
pub mod orchestrator;
pub mod platform;
pub mod routing;
pub mod sink;
pub mod stream;

pub use caching::{CacheKind, CachingStrategy};
pub use collaborators::{Collaborators, DefaultCollaborators, PlatformConnection};
pub use config::{ConfigurationError, RuntimeConfig, Settings};
pub use errors::{exit_code, Advisory, BootstrapError, SinkValidationError, Stage};
pub use lifecycle::{shutdown_signal, PipelineHandle, PipelineState, StopReason};
pub use orchestrator::{bootstrap, Bootstrap, BootstrapOutcome};
pub use routing::Router;
