//! Cache capability and source-of-truth contracts.
//!
//! [`AppCache`] is what the router consumes for enrichment. [`AppSource`]
//! is what a persistent cache fills itself from (the platform API).

use async_trait::async_trait;
use firehose_types::{AppGuid, AppMetadata, EventKind};

use crate::error;

/// Source of truth for application metadata.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn AppSource>`.
#[async_trait]
pub trait AppSource: Send + Sync {
    /// List every application visible to the nozzle's credentials.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Source`](crate::CacheError::Source) when the
    /// source cannot be queried.
    async fn list_apps(&self) -> error::Result<Vec<AppMetadata>>;

    /// Fetch a single application.
    ///
    /// Returns `Ok(None)` when the application does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Source`](crate::CacheError::Source) when the
    /// source cannot be queried.
    async fn fetch_app(&self, guid: &AppGuid) -> error::Result<Option<AppMetadata>>;
}

/// Metadata cache used for event enrichment.
///
/// `open` must complete before any `lookup`. `close` must be safe to call
/// at any time, any number of times.
#[async_trait]
pub trait AppCache: Send + Sync {
    /// Acquire the backing store and start any maintenance timers.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`](crate::CacheError) when the backing store
    /// cannot be acquired.
    async fn open(&self) -> error::Result<()>;

    /// Release the backing store and stop maintenance timers. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::LockPoisoned`](crate::CacheError::LockPoisoned)
    /// if internal state is unusable.
    fn close(&self) -> error::Result<()>;

    /// Resolve an application id to its metadata. `None` means unknown.
    async fn lookup(&self, guid: &AppGuid) -> Option<AppMetadata>;
}

/// Whether any of the requested kinds needs metadata lookups, i.e. whether
/// a persistent cache is worth constructing.
#[must_use]
pub fn is_needed(kinds: &[EventKind]) -> bool {
    kinds.iter().any(|k| k.needs_metadata())
}
