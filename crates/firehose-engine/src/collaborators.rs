//! Factories for the external components the bootstrap drives. Tests
//! substitute their own implementation of [`Collaborators`].

use std::sync::Arc;

use async_trait::async_trait;
use firehose_cache::{AppCache, AppSource};

use crate::auth::{AuthError, ClientCredentials, CredentialSession, UaaSession};
use crate::caching::CachingStrategy;
use crate::config::{PlatformConfig, RuntimeConfig};
use crate::platform::{CfPlatformClient, PlatformEndpoints, PlatformError};
use crate::routing::Router;
use crate::sink::{Sink, StdoutSink, SyslogSink};
use crate::stream::{LogStreamClient, SessionSlot, StreamClient, StreamConfig, StreamError};

/// An authenticated platform client.
pub struct PlatformConnection {
    pub endpoints: PlatformEndpoints,
    /// Application listing for the persistent cache.
    pub apps: Arc<dyn AppSource>,
}

#[async_trait]
pub trait Collaborators: Send + Sync {
    /// Discover endpoints and authenticate against the platform API.
    async fn connect_platform(
        &self,
        config: &PlatformConfig,
    ) -> Result<PlatformConnection, PlatformError>;

    /// Establish the credential session used by the stream client.
    async fn create_session(
        &self,
        auth_endpoint: &str,
        config: &PlatformConfig,
    ) -> Result<CredentialSession, AuthError>;

    /// Shared handle over the selected cache strategy. The bootstrap closes
    /// it exactly once, whatever path startup takes.
    fn create_cache(&self, strategy: CachingStrategy) -> Arc<dyn AppCache> {
        Arc::new(strategy)
    }

    fn create_sink(&self, config: &RuntimeConfig) -> Arc<dyn Sink>;

    fn create_stream_client(
        &self,
        config: StreamConfig,
        session: SessionSlot,
        router: Arc<Router>,
    ) -> Result<Box<dyn StreamClient>, StreamError>;
}

/// Production wiring: platform API, token endpoint, syslog and the
/// log-stream gateway.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCollaborators;

pub(crate) fn credentials(config: &PlatformConfig) -> ClientCredentials {
    ClientCredentials {
        client_id: config.client_id.clone(),
        client_secret: config.client_secret.clone(),
    }
}

#[async_trait]
impl Collaborators for DefaultCollaborators {
    async fn connect_platform(
        &self,
        config: &PlatformConfig,
    ) -> Result<PlatformConnection, PlatformError> {
        let client = CfPlatformClient::connect(config).await?;
        Ok(PlatformConnection {
            endpoints: client.endpoints().clone(),
            apps: Arc::new(client),
        })
    }

    async fn create_session(
        &self,
        auth_endpoint: &str,
        config: &PlatformConfig,
    ) -> Result<CredentialSession, AuthError> {
        let session =
            UaaSession::establish(auth_endpoint, credentials(config), config.skip_ssl_validation)
                .await?;
        Ok(Arc::new(session))
    }

    fn create_sink(&self, config: &RuntimeConfig) -> Arc<dyn Sink> {
        match (&config.sink.server, config.debug) {
            (Some(server), false) => Arc::new(SyslogSink::new(server.clone(), &config.sink)),
            _ => Arc::new(StdoutSink::new(config.sink.format)),
        }
    }

    fn create_stream_client(
        &self,
        config: StreamConfig,
        session: SessionSlot,
        router: Arc<Router>,
    ) -> Result<Box<dyn StreamClient>, StreamError> {
        Ok(Box::new(LogStreamClient::new(config, session, router)?))
    }
}
