//! Platform API client: endpoint discovery, authentication and the
//! application listing the persistent cache fills itself from.

use std::collections::HashMap;

use async_trait::async_trait;
use firehose_cache::{AppSource, CacheError};
use firehose_types::{AppGuid, AppMetadata};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::auth::{AuthError, ClientCredentials, TokenProvider, UaaSession};
use crate::config::PlatformConfig;
use crate::http;

const APPS_PAGE_SIZE: u32 = 5000;

/// Platform API failure.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("malformed response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("platform root document has no '{0}' link")]
    MissingLink(&'static str),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Endpoints discovered from the platform root document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformEndpoints {
    pub api: String,
    /// Token issuer.
    pub auth: String,
    /// Event stream gateway.
    pub stream: String,
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
}

#[derive(Debug, Default, Deserialize)]
struct RootLinks {
    #[serde(default)]
    uaa: Option<Link>,
    #[serde(default)]
    login: Option<Link>,
    #[serde(default)]
    log_stream: Option<Link>,
}

#[derive(Debug, Deserialize)]
struct RootDocument {
    #[serde(default)]
    links: RootLinks,
}

#[derive(Debug, Deserialize)]
struct Relationship {
    data: Option<RelatedGuid>,
}

#[derive(Debug, Deserialize)]
struct RelatedGuid {
    guid: String,
}

#[derive(Debug, Deserialize)]
struct AppResource {
    guid: String,
    name: String,
    relationships: AppRelationships,
}

#[derive(Debug, Deserialize)]
struct AppRelationships {
    space: Relationship,
}

#[derive(Debug, Deserialize)]
struct SpaceResource {
    guid: String,
    name: String,
    relationships: SpaceRelationships,
}

#[derive(Debug, Deserialize)]
struct SpaceRelationships {
    organization: Relationship,
}

#[derive(Debug, Deserialize)]
struct OrgResource {
    guid: String,
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct Included {
    #[serde(default)]
    spaces: Vec<SpaceResource>,
    #[serde(default)]
    organizations: Vec<OrgResource>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    next: Option<Link>,
}

#[derive(Debug, Deserialize)]
struct AppPage {
    pagination: Pagination,
    resources: Vec<AppResource>,
    #[serde(default)]
    included: Included,
}

#[derive(Debug, Deserialize)]
struct SingleApp {
    #[serde(flatten)]
    app: AppResource,
    #[serde(default)]
    included: Included,
}

/// Join apps with their included spaces and organizations. Apps whose
/// space is not included keep empty space and org fields.
fn assemble(apps: Vec<AppResource>, included: &Included) -> Vec<AppMetadata> {
    let orgs: HashMap<&str, &str> = included
        .organizations
        .iter()
        .map(|o| (o.guid.as_str(), o.name.as_str()))
        .collect();
    let spaces: HashMap<&str, (&str, &str)> = included
        .spaces
        .iter()
        .map(|s| {
            let org = s
                .relationships
                .organization
                .data
                .as_ref()
                .map_or("", |d| d.guid.as_str());
            (s.guid.as_str(), (s.name.as_str(), org))
        })
        .collect();

    apps.into_iter()
        .map(|app| {
            let space_guid = app
                .relationships
                .space
                .data
                .map(|d| d.guid)
                .unwrap_or_default();
            let (space_name, org_guid) = spaces
                .get(space_guid.as_str())
                .copied()
                .unwrap_or(("", ""));
            let org_name = orgs.get(org_guid).copied().unwrap_or("");
            AppMetadata {
                guid: AppGuid::new(app.guid),
                name: app.name,
                space_name: space_name.to_string(),
                org_guid: org_guid.to_string(),
                org_name: org_name.to_string(),
                space_guid,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Authenticated client for the platform API.
pub struct CfPlatformClient {
    http: reqwest::Client,
    endpoints: PlatformEndpoints,
    session: UaaSession,
}

impl CfPlatformClient {
    /// Discover the platform's endpoints and authenticate with the
    /// configured client credentials.
    ///
    /// # Errors
    ///
    /// Returns a [`PlatformError`] when the root document cannot be read,
    /// lacks the token or stream links, or the credentials are rejected.
    pub async fn connect(config: &PlatformConfig) -> Result<Self, PlatformError> {
        let client = http::client(config.skip_ssl_validation).map_err(PlatformError::Client)?;
        let root_url = format!("{}/", config.api_endpoint);
        let root: RootDocument = get_json(&client, &root_url, None).await?;

        let auth = root
            .links
            .uaa
            .or(root.links.login)
            .ok_or(PlatformError::MissingLink("uaa"))?
            .href;
        let stream = root
            .links
            .log_stream
            .ok_or(PlatformError::MissingLink("log_stream"))?
            .href;

        let session = UaaSession::new(
            client.clone(),
            &auth,
            ClientCredentials {
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
            },
        );
        session.refresh().await?;

        let endpoints = PlatformEndpoints {
            api: config.api_endpoint.clone(),
            auth: auth.trim_end_matches('/').to_string(),
            stream: stream.trim_end_matches('/').to_string(),
        };
        tracing::info!(
            api = %endpoints.api,
            auth = %endpoints.auth,
            stream = %endpoints.stream,
            "Connected to platform API"
        );
        Ok(Self {
            http: client,
            endpoints,
            session,
        })
    }

    #[must_use]
    pub fn endpoints(&self) -> &PlatformEndpoints {
        &self.endpoints
    }

    async fn authorized_get<T: DeserializeOwned>(&self, url: &str) -> Result<T, PlatformError> {
        let header = self.session.authorization().await?;
        get_json(&self.http, url, Some(&header)).await
    }
}

async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    authorization: Option<&str>,
) -> Result<T, PlatformError> {
    let mut request = client.get(url).header(ACCEPT, "application/json");
    if let Some(value) = authorization {
        request = request.header(AUTHORIZATION, value);
    }
    let response = request.send().await.map_err(|source| PlatformError::Http {
        url: url.to_string(),
        source,
    })?;
    let status = response.status();
    if !status.is_success() {
        return Err(PlatformError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    response.json().await.map_err(|source| PlatformError::Decode {
        url: url.to_string(),
        source,
    })
}

#[async_trait]
impl AppSource for CfPlatformClient {
    async fn list_apps(&self) -> Result<Vec<AppMetadata>, CacheError> {
        let mut url = Some(format!(
            "{}/v3/apps?per_page={APPS_PAGE_SIZE}&include=space.organization",
            self.endpoints.api
        ));
        let mut apps = Vec::new();
        while let Some(next) = url.take() {
            let page: AppPage = self
                .authorized_get(&next)
                .await
                .map_err(CacheError::from_source)?;
            apps.extend(assemble(page.resources, &page.included));
            url = page.pagination.next.map(|l| l.href);
        }
        tracing::debug!(count = apps.len(), "Listed applications");
        Ok(apps)
    }

    async fn fetch_app(&self, guid: &AppGuid) -> Result<Option<AppMetadata>, CacheError> {
        let url = format!(
            "{}/v3/apps/{guid}?include=space.organization",
            self.endpoints.api
        );
        match self.authorized_get::<SingleApp>(&url).await {
            Ok(single) => Ok(assemble(vec![single.app], &single.included).pop()),
            Err(PlatformError::Status { status, .. })
                if status == StatusCode::NOT_FOUND.as_u16() =>
            {
                Ok(None)
            }
            Err(e) => Err(CacheError::from_source(e)),
        }
    }
}
