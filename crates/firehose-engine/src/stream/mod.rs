//! Event stream subscription.

pub mod client;
pub mod sse;
pub mod v2;

use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::auth::AuthError;

pub use client::{reconnect_backoff, LogStreamClient, SessionSlot};

/// Subscription parameters.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Gateway base URL.
    pub endpoint: String,
    pub subscription_id: String,
    /// A subscription silent for this long is dropped and re-established.
    pub idle_timeout: Duration,
    pub skip_tls_verify: bool,
}

/// Subscribing to or reading from the stream failed.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("invalid stream endpoint {0}")]
    Endpoint(String),
    #[error("no token for the stream subscription: {0}")]
    Auth(#[from] AuthError),
    #[error("stream subscription request failed: {0}")]
    Connect(#[source] reqwest::Error),
    #[error("stream gateway rejected the token")]
    Unauthorized,
    #[error("stream gateway returned HTTP {0}")]
    Status(u16),
    #[error("stream read failed: {0}")]
    Read(#[source] reqwest::Error),
    #[error("no data on the stream for {0:?}")]
    Idle(Duration),
}

/// A stream subscription that, once started, runs on its own task.
#[async_trait]
pub trait StreamClient: Send {
    /// Subscribe and spawn the consuming task.
    ///
    /// # Errors
    ///
    /// Returns a [`StreamError`] when the initial subscription fails; no
    /// task is spawned in that case.
    async fn start(self: Box<Self>) -> Result<JoinHandle<()>, StreamError>;
}
