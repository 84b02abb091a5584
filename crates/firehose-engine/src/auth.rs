//! OAuth client-credentials sessions against the platform's token endpoint.
//!
//! A [`UaaSession`] holds the current bearer token and renews it shortly
//! before expiry. Renewal is serialised behind an async mutex so concurrent
//! callers never trigger more than one token request at a time.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::http;

/// Tokens are renewed this long before they actually expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// Token acquisition failed.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("token request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("token endpoint {endpoint} rejected the credentials (HTTP {status}): {body}")]
    Rejected {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("malformed token response from {endpoint}: {source}")]
    Malformed {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Supplies `Authorization` header values to the stream client and the
/// platform client.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current header value (`bearer <token>`), renewed if close to expiry.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] when renewal is needed and fails.
    async fn authorization(&self) -> Result<String, AuthError>;

    /// Discard the current token and fetch a new one.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] when the token request fails.
    async fn refresh(&self) -> Result<String, AuthError>;
}

/// A shared, established session.
pub type CredentialSession = Arc<dyn TokenProvider>;

/// OAuth client id and secret.
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    expires_in: u64,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[derive(Debug, Clone)]
struct CachedToken {
    header: String,
    /// `None` when the endpoint gave no lifetime; renewed only on demand.
    renew_at: Option<Instant>,
}

impl CachedToken {
    fn from_response(response: TokenResponse, now: Instant) -> Self {
        let renew_at = (response.expires_in > 0).then(|| {
            let lifetime = Duration::from_secs(response.expires_in);
            now + lifetime.saturating_sub(EXPIRY_MARGIN)
        });
        Self {
            header: format!("{} {}", response.token_type, response.access_token),
            renew_at,
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        self.renew_at.map_or(true, |at| now < at)
    }
}

/// Client-credentials session against `{auth_endpoint}/oauth/token`.
pub struct UaaSession {
    http: reqwest::Client,
    token_url: String,
    credentials: ClientCredentials,
    current: Mutex<Option<CachedToken>>,
}

impl UaaSession {
    /// Create a session without requesting a token yet.
    #[must_use]
    pub fn new(http: reqwest::Client, auth_endpoint: &str, credentials: ClientCredentials) -> Self {
        Self {
            http,
            token_url: format!("{}/oauth/token", auth_endpoint.trim_end_matches('/')),
            credentials,
            current: Mutex::new(None),
        }
    }

    /// Create a session and fetch its first token.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] when the client cannot be built or the
    /// first token request fails.
    pub async fn establish(
        auth_endpoint: &str,
        credentials: ClientCredentials,
        skip_tls_verify: bool,
    ) -> Result<Self, AuthError> {
        let client = http::client(skip_tls_verify).map_err(AuthError::Client)?;
        let session = Self::new(client, auth_endpoint, credentials);
        session.refresh().await?;
        tracing::debug!(endpoint = %session.token_url, "Token session established");
        Ok(session)
    }

    async fn request_token(&self) -> Result<CachedToken, AuthError> {
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials&response_type=token")
            .send()
            .await
            .map_err(|source| AuthError::Transport {
                endpoint: self.token_url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                endpoint: self.token_url.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TokenResponse =
            response
                .json()
                .await
                .map_err(|source| AuthError::Malformed {
                    endpoint: self.token_url.clone(),
                    source,
                })?;
        Ok(CachedToken::from_response(parsed, Instant::now()))
    }
}

#[async_trait]
impl TokenProvider for UaaSession {
    async fn authorization(&self) -> Result<String, AuthError> {
        let mut current = self.current.lock().await;
        if let Some(token) = current.as_ref() {
            if token.is_fresh(Instant::now()) {
                return Ok(token.header.clone());
            }
        }
        tracing::debug!(endpoint = %self.token_url, "Renewing expiring token");
        let token = self.request_token().await?;
        let header = token.header.clone();
        *current = Some(token);
        Ok(header)
    }

    async fn refresh(&self) -> Result<String, AuthError> {
        let mut current = self.current.lock().await;
        *current = None;
        let token = self.request_token().await?;
        let header = token.header.clone();
        *current = Some(token);
        Ok(header)
    }
}
