//! No-op cache used when no selected event kind needs enrichment.

use async_trait::async_trait;
use firehose_types::{AppGuid, AppMetadata};

use crate::backend::AppCache;
use crate::error;

/// Cache that holds nothing: `open`/`close` do nothing and every lookup
/// misses without touching any store.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCache;

impl NullCache {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AppCache for NullCache {
    async fn open(&self) -> error::Result<()> {
        Ok(())
    }

    fn close(&self) -> error::Result<()> {
        Ok(())
    }

    async fn lookup(&self, _guid: &AppGuid) -> Option<AppMetadata> {
        None
    }
}
