//! Shared HTTP client construction for platform, token and stream requests.

use std::time::Duration;

/// `User-Agent` sent on every outbound request.
pub const USER_AGENT: &str = concat!("firehose-to-syslog/", env!("CARGO_PKG_VERSION"));

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build a client. `skip_tls_verify` disables certificate validation.
///
/// # Errors
///
/// Returns the builder error if the TLS backend cannot be initialised.
pub fn client(skip_tls_verify: bool) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT)
        .danger_accept_invalid_certs(skip_tls_verify)
        .build()
}
