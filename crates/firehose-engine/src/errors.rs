//! Bootstrap error model: fatal errors abort startup, advisories are
//! logged and either tolerated or turned into a degraded stop.

use std::fmt;

use firehose_cache::CacheError;

use crate::auth::AuthError;
use crate::config::ConfigurationError;
use crate::platform::PlatformError;
use crate::routing::RouterSetupError;
use crate::stream::StreamError;

/// Process exit statuses for the outcomes of a run.
pub mod exit_code {
    /// Normal termination, including shutdown by signal.
    pub const SUCCESS: i32 = 0;
    /// A fatal bootstrap error.
    pub const FATAL: i32 = 1;
    /// Startup completed configuration but the sink or stream was
    /// unavailable.
    pub const DEGRADED: i32 = 3;
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Bootstrap progress. Stages are strictly ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Init,
    ConfigResolved,
    ClientAuthenticated,
    CacheSelected,
    RouterConfigured,
    CacheOpened,
    SessionAcquired,
    SinkValidated,
    StreamStarted,
    Running,
    DegradedStop,
}

impl Stage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::ConfigResolved => "config_resolved",
            Self::ClientAuthenticated => "client_authenticated",
            Self::CacheSelected => "cache_selected",
            Self::RouterConfigured => "router_configured",
            Self::CacheOpened => "cache_opened",
            Self::SessionAcquired => "session_acquired",
            Self::SinkValidated => "sink_validated",
            Self::StreamStarted => "stream_started",
            Self::Running => "running",
            Self::DegradedStop => "degraded_stop",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Fatal errors
// ---------------------------------------------------------------------------

/// Startup failure. The process must exit with [`exit_code::FATAL`] after
/// releasing whatever was acquired.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("Error creating platform client: {0}")]
    PlatformAuth(#[source] PlatformError),
    #[error("Error opening metadata cache: {0}")]
    CacheOpen(#[source] CacheError),
    #[error("Error setting up event routing: {0}")]
    RouterSetup(#[from] RouterSetupError),
}

impl BootstrapError {
    /// Stage that was being attempted when the error occurred.
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::Configuration(_) => Stage::Init,
            Self::PlatformAuth(_) => Stage::ConfigResolved,
            Self::RouterSetup(_) => Stage::CacheSelected,
            Self::CacheOpen(_) => Stage::RouterConfigured,
        }
    }
}

// ---------------------------------------------------------------------------
// Advisories
// ---------------------------------------------------------------------------

/// The sink refused its validation probe.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Failed connecting to the output sink {server}. Please check settings and try again!")]
pub struct SinkValidationError {
    pub server: String,
}

/// Non-fatal conditions met during bootstrap.
#[derive(Debug, thiserror::Error)]
pub enum Advisory {
    /// The credential session could not be established; streaming is
    /// still attempted.
    #[error("Failed connecting to get token: {0}")]
    Session(#[source] AuthError),
    #[error(transparent)]
    SinkValidation(SinkValidationError),
    #[error("Failed connecting to the event stream: {0}. Please check settings and try again!")]
    StreamStart(#[source] StreamError),
}

impl Advisory {
    /// Whether this advisory ended the bootstrap.
    #[must_use]
    pub fn stops_pipeline(&self) -> bool {
        !matches!(self, Self::Session(_))
    }
}
