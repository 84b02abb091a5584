//! Bootstrap orchestrator: drives startup from a resolved configuration to
//! a running pipeline, in a fixed stage order.
//!
//! Fatal errors return [`BootstrapError`]. Sink and stream unavailability
//! return [`BootstrapOutcome::DegradedStop`]. A missing credential session
//! is logged and tolerated. Nothing here exits the process; resources
//! acquired before a failure are released before returning.

use std::sync::Arc;

use crate::caching::{requested_kinds, select_strategy};
use crate::collaborators::{credentials, Collaborators};
use crate::config::{RuntimeConfig, Settings};
use crate::errors::{exit_code, Advisory, BootstrapError, SinkValidationError, Stage};
use crate::lifecycle::{CacheGuard, PipelineHandle, TaskGuard};
use crate::routing::Router;
use crate::stream::{SessionSlot, StreamConfig};

/// How a bootstrap that did not fail fatally ended.
pub enum BootstrapOutcome {
    /// The stream is running. `advisories` lists tolerated problems.
    Running {
        handle: PipelineHandle,
        advisories: Vec<Advisory>,
    },
    /// Startup stopped before streaming; everything acquired was released.
    DegradedStop {
        reason: Advisory,
        advisories: Vec<Advisory>,
    },
}

impl BootstrapOutcome {
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    /// Exit status for a process ending with this outcome.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Running { .. } => exit_code::SUCCESS,
            Self::DegradedStop { .. } => exit_code::DEGRADED,
        }
    }
}

/// One bootstrap run over a resolved configuration.
pub struct Bootstrap<'a> {
    config: &'a RuntimeConfig,
    collaborators: &'a dyn Collaborators,
    stage: Stage,
    advisories: Vec<Advisory>,
}

impl<'a> Bootstrap<'a> {
    #[must_use]
    pub fn new(config: &'a RuntimeConfig, collaborators: &'a dyn Collaborators) -> Self {
        Self {
            config,
            collaborators,
            stage: Stage::Init,
            advisories: Vec::new(),
        }
    }

    fn advance(&mut self, stage: Stage) {
        debug_assert!(stage > self.stage, "stage {stage} after {}", self.stage);
        self.stage = stage;
        tracing::debug!(stage = %stage, "Bootstrap stage reached");
    }

    fn degrade(mut self, reason: Advisory, cache: &CacheGuard) -> BootstrapOutcome {
        tracing::error!(stage = %self.stage, error = %reason, "Stopping before streaming");
        cache.release();
        self.advance(Stage::DegradedStop);
        BootstrapOutcome::DegradedStop {
            reason,
            advisories: self.advisories,
        }
    }

    /// Run every stage.
    ///
    /// # Errors
    ///
    /// Returns a [`BootstrapError`] when platform authentication, routing
    /// setup or cache opening fails. The cache, if selected, is closed
    /// before the error is returned.
    pub async fn run(mut self) -> Result<BootstrapOutcome, BootstrapError> {
        let config = self.config;
        self.advance(Stage::ConfigResolved);

        let platform = self
            .collaborators
            .connect_platform(&config.platform)
            .await
            .map_err(BootstrapError::PlatformAuth)?;
        let mut endpoints = platform.endpoints;
        if let Some(stream) = &config.platform.stream_endpoint_override {
            tracing::info!(endpoint = %stream, "Using configured stream endpoint");
            endpoints.stream.clone_from(stream);
        }
        self.advance(Stage::ClientAuthenticated);

        let strategy = select_strategy(
            &requested_kinds(&config.events),
            &config.cache,
            platform.apps,
        );
        let kind = strategy.kind();
        let cache = CacheGuard::new(self.collaborators.create_cache(strategy), kind);
        tracing::info!(cache = %kind, "Metadata cache selected");
        self.advance(Stage::CacheSelected);

        let sink = self.collaborators.create_sink(config);
        let mut router = Router::new(cache.cache(), Arc::clone(&sink));
        router.setup_routing(&config.events)?;
        router.set_extra_fields(&config.extra_fields)?;
        let router = Arc::new(router);
        let totals = config
            .event_totals_interval
            .map(|interval| TaskGuard::new(router.log_event_totals(interval)));
        self.advance(Stage::RouterConfigured);

        cache.open().await.map_err(BootstrapError::CacheOpen)?;
        tracing::info!(cache = %kind, "Metadata cache opened");
        self.advance(Stage::CacheOpened);

        let session = match self
            .collaborators
            .create_session(&endpoints.auth, &config.platform)
            .await
        {
            Ok(session) => SessionSlot::Ready(session),
            Err(e) => {
                let advisory = Advisory::Session(e);
                tracing::warn!(error = %advisory, "Continuing without a credential session");
                self.advisories.push(advisory);
                SessionSlot::Pending {
                    auth_endpoint: endpoints.auth.clone(),
                    credentials: credentials(&config.platform),
                    skip_tls_verify: config.platform.skip_ssl_validation,
                }
            }
        };
        self.advance(Stage::SessionAcquired);

        if config.debug {
            tracing::info!("Debug mode, skipping output sink validation");
        } else if !sink.connect().await {
            let server = config.sink.server.clone().unwrap_or_default();
            return Ok(self.degrade(
                Advisory::SinkValidation(SinkValidationError { server }),
                &cache,
            ));
        }
        self.advance(Stage::SinkValidated);

        let stream_config = StreamConfig {
            endpoint: endpoints.stream.clone(),
            subscription_id: config.stream.subscription_id.clone(),
            idle_timeout: config.stream.keep_alive,
            skip_tls_verify: config.platform.skip_ssl_validation,
        };
        let started = match self.collaborators.create_stream_client(
            stream_config,
            session,
            Arc::clone(&router),
        ) {
            Ok(client) => client.start().await,
            Err(e) => Err(e),
        };
        let task = match started {
            Ok(task) => task,
            Err(e) => return Ok(self.degrade(Advisory::StreamStart(e), &cache)),
        };
        self.advance(Stage::StreamStarted);
        tracing::info!(
            endpoint = %endpoints.stream,
            subscription_id = %config.stream.subscription_id,
            "Firehose subscription successful, routing events"
        );

        self.advance(Stage::Running);
        Ok(BootstrapOutcome::Running {
            handle: PipelineHandle::new(task, totals, cache, router),
            advisories: self.advisories,
        })
    }
}

/// Resolve `settings` and run the bootstrap. A configuration error returns
/// before any collaborator is touched.
///
/// # Errors
///
/// See [`Bootstrap::run`]; additionally returns
/// [`BootstrapError::Configuration`] for invalid settings.
pub async fn bootstrap(
    settings: Settings,
    collaborators: &dyn Collaborators,
) -> Result<BootstrapOutcome, BootstrapError> {
    let config = RuntimeConfig::resolve(settings)?;
    Bootstrap::new(&config, collaborators).run().await
}
