//! Output sinks: where routed events are shipped.
//!
//! The bootstrap probes a sink with [`Sink::connect`] before starting the
//! stream; routing calls [`Sink::ship`] once per event.

pub mod format;
pub mod stdout;
pub mod syslog;

use async_trait::async_trait;
use firehose_types::Event;

pub use format::{render, syslog_frame};
pub use stdout::StdoutSink;
pub use syslog::SyslogSink;

/// Shipping an event failed.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("syslog server {server} unreachable: {source}")]
    Connect {
        server: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write to {server}: {source}")]
    Write {
        server: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TLS setup: {0}")]
    Tls(String),
    #[error("failed to read CA certificate {path}: {source}")]
    Certificate {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Destination for routed events.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Establish (or re-establish) the connection. `false` means the sink
    /// is unusable right now; the cause is logged by the implementation.
    async fn connect(&self) -> bool;

    /// Deliver one event.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] when the event could not be written.
    async fn ship(&self, event: &Event) -> Result<(), SinkError>;
}
