//! Application metadata used for event enrichment.

use serde::{Deserialize, Serialize};

/// Opaque application identifier (a platform GUID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppGuid(String);

impl AppGuid {
    /// Create a new application identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AppGuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for AppGuid {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

/// Name and placement of an application, as known to the platform API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMetadata {
    pub guid: AppGuid,
    pub name: String,
    pub space_guid: String,
    pub space_name: String,
    pub org_guid: String,
    pub org_name: String,
}

impl AppMetadata {
    /// Enrichment fields attached to routed events, as `(key, value)` pairs.
    #[must_use]
    pub fn enrichment_fields(&self) -> [(&'static str, &str); 6] {
        [
            ("cf_app_id", self.guid.as_str()),
            ("cf_app_name", &self.name),
            ("cf_space_id", &self.space_guid),
            ("cf_space_name", &self.space_name),
            ("cf_org_id", &self.org_guid),
            ("cf_org_name", &self.org_name),
        ]
    }
}
