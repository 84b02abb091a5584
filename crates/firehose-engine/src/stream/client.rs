//! Log-stream gateway subscription.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{StatusCode, Url};
use tokio::task::JoinHandle;

use crate::auth::{AuthError, ClientCredentials, CredentialSession, TokenProvider, UaaSession};
use crate::http;
use crate::routing::Router;
use crate::stream::sse::SseDecoder;
use crate::stream::{v2, StreamClient, StreamConfig, StreamError};

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(60);

/// Where the client gets its authorization from.
pub enum SessionSlot {
    /// An established session.
    Ready(CredentialSession),
    /// No session yet; one is established on the first subscription
    /// attempt and retried on every reconnect until it succeeds.
    Pending {
        auth_endpoint: String,
        credentials: ClientCredentials,
        skip_tls_verify: bool,
    },
}

/// Delay before reconnect attempt `attempt` (1-based): doubling from one
/// second, capped at a minute.
#[must_use]
pub fn reconnect_backoff(attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
    BACKOFF_BASE.saturating_mul(factor).min(BACKOFF_MAX)
}

/// Subscribes to `{endpoint}/v2/read` and feeds every decoded envelope to
/// the router. After a successful start the subscription is kept alive
/// forever, reconnecting with backoff.
pub struct LogStreamClient {
    http: reqwest::Client,
    config: StreamConfig,
    session: SessionSlot,
    router: Arc<Router>,
    force_refresh: bool,
}

impl LogStreamClient {
    /// # Errors
    ///
    /// Returns [`StreamError::Client`] when the HTTP client cannot be built.
    pub fn new(
        config: StreamConfig,
        session: SessionSlot,
        router: Arc<Router>,
    ) -> Result<Self, StreamError> {
        let http = http::client(config.skip_tls_verify).map_err(StreamError::Client)?;
        Ok(Self {
            http,
            config,
            session,
            router,
            force_refresh: false,
        })
    }

    /// Subscription URL for the router's selected kinds.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Endpoint`] when the endpoint is not a URL.
    pub fn subscription_url(&self) -> Result<Url, StreamError> {
        let base = self
            .config
            .endpoint
            .replacen("wss://", "https://", 1)
            .replacen("ws://", "http://", 1);
        let mut url = Url::parse(&format!("{}/v2/read", base.trim_end_matches('/')))
            .map_err(|e| StreamError::Endpoint(format!("{}: {e}", self.config.endpoint)))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("shard_id", &self.config.subscription_id);
            for selector in v2::selectors(self.router.selected_kinds()) {
                query.append_key_only(selector);
            }
        }
        Ok(url)
    }

    async fn session(&mut self) -> Result<CredentialSession, AuthError> {
        match &self.session {
            SessionSlot::Ready(session) => Ok(Arc::clone(session)),
            SessionSlot::Pending {
                auth_endpoint,
                credentials,
                skip_tls_verify,
            } => {
                let established: CredentialSession = Arc::new(
                    UaaSession::establish(auth_endpoint, credentials.clone(), *skip_tls_verify)
                        .await?,
                );
                tracing::info!("Token session established by stream client");
                self.session = SessionSlot::Ready(Arc::clone(&established));
                self.force_refresh = false;
                Ok(established)
            }
        }
    }

    async fn authorization(&mut self) -> Result<String, AuthError> {
        let session = self.session().await?;
        if std::mem::take(&mut self.force_refresh) {
            session.refresh().await
        } else {
            session.authorization().await
        }
    }

    async fn subscribe(&mut self) -> Result<reqwest::Response, StreamError> {
        let url = self.subscription_url()?;
        let authorization = self.authorization().await?;
        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, authorization)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(StreamError::Connect)?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                self.force_refresh = true;
                Err(StreamError::Unauthorized)
            }
            status => Err(StreamError::Status(status.as_u16())),
        }
    }

    /// Read one subscription until it ends. `Ok` means the server closed it.
    async fn consume(&self, response: reqwest::Response) -> Result<(), StreamError> {
        let mut body = std::pin::pin!(response.bytes_stream());
        let mut decoder = SseDecoder::new();
        loop {
            let chunk = match tokio::time::timeout(self.config.idle_timeout, body.next()).await {
                Err(_) => return Err(StreamError::Idle(self.config.idle_timeout)),
                Ok(None) => return Ok(()),
                Ok(Some(chunk)) => chunk.map_err(StreamError::Read)?,
            };
            for sse in decoder.push(&chunk) {
                match sse.event.as_deref() {
                    Some("heartbeat") => continue,
                    Some("closing") => {
                        tracing::info!(reason = %sse.data, "Stream gateway closing subscription");
                        continue;
                    }
                    _ => {}
                }
                match v2::decode_batch(&sse.data) {
                    Ok(envelopes) => {
                        for envelope in &envelopes {
                            self.router.route(envelope).await;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Skipping undecodable stream batch"),
                }
            }
        }
    }

    async fn run(mut self, first: reqwest::Response) {
        let mut response = Some(first);
        let mut attempt = 0u32;
        loop {
            if let Some(active) = response.take() {
                match self.consume(active).await {
                    Ok(()) => tracing::info!("Stream subscription closed by server"),
                    Err(e) => tracing::warn!(error = %e, "Stream subscription interrupted"),
                }
            }

            attempt = attempt.saturating_add(1);
            let delay = reconnect_backoff(attempt);
            tracing::info!(attempt, delay_secs = delay.as_secs(), "Reconnecting to stream");
            tokio::time::sleep(delay).await;

            match self.subscribe().await {
                Ok(next) => {
                    tracing::info!("Stream subscription re-established");
                    attempt = 0;
                    response = Some(next);
                }
                Err(e) => tracing::warn!(error = %e, attempt, "Stream reconnect failed"),
            }
        }
    }
}

#[async_trait]
impl StreamClient for LogStreamClient {
    async fn start(mut self: Box<Self>) -> Result<JoinHandle<()>, StreamError> {
        let response = self.subscribe().await?;
        tracing::info!(
            endpoint = %self.config.endpoint,
            subscription_id = %self.config.subscription_id,
            "Subscribed to event stream"
        );
        let client = *self;
        Ok(tokio::spawn(client.run(response)))
    }
}
