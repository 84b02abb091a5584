//! Cache strategy selection.
//!
//! A persistent cache is built only when a requested event kind needs
//! application metadata; otherwise the router gets a [`NullCache`] and the
//! platform's application listing is never queried.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use firehose_cache::{
    is_needed, AppCache, AppSource, CacheError, NullCache, SqliteCache, SqliteCacheConfig,
};
use firehose_types::{AppGuid, AppMetadata, EventKind};

use crate::config::CacheSettings;

/// Which cache implementation was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Persistent,
    Null,
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Persistent => "persistent",
            Self::Null => "null",
        })
    }
}

pub enum CachingStrategy {
    Persistent(SqliteCache),
    Null(NullCache),
}

impl CachingStrategy {
    #[must_use]
    pub fn kind(&self) -> CacheKind {
        match self {
            Self::Persistent(_) => CacheKind::Persistent,
            Self::Null(_) => CacheKind::Null,
        }
    }
}

#[async_trait]
impl AppCache for CachingStrategy {
    async fn open(&self) -> Result<(), CacheError> {
        match self {
            Self::Persistent(cache) => cache.open().await,
            Self::Null(cache) => cache.open().await,
        }
    }

    fn close(&self) -> Result<(), CacheError> {
        match self {
            Self::Persistent(cache) => cache.close(),
            Self::Null(cache) => cache.close(),
        }
    }

    async fn lookup(&self, guid: &AppGuid) -> Option<AppMetadata> {
        match self {
            Self::Persistent(cache) => cache.lookup(guid).await,
            Self::Null(cache) => cache.lookup(guid).await,
        }
    }
}

/// Event kinds named in `csv`, for cache selection only. Unknown names are
/// skipped here; routing setup rejects them later.
#[must_use]
pub fn requested_kinds(csv: &str) -> Vec<EventKind> {
    csv.split(',')
        .filter_map(|name| name.trim().parse().ok())
        .collect()
}

/// Pick the cache for the requested kinds. Pure: nothing is opened.
#[must_use]
pub fn select_strategy(
    kinds: &[EventKind],
    settings: &CacheSettings,
    source: Arc<dyn AppSource>,
) -> CachingStrategy {
    if is_needed(kinds) {
        CachingStrategy::Persistent(SqliteCache::new(
            SqliteCacheConfig {
                path: settings.path.clone(),
                cache_invalidate_ttl: settings.invalidate_ttl,
                ignore_missing_apps: settings.ignore_missing_apps,
                missing_apps_ttl: settings.missing_apps_ttl,
            },
            source,
        ))
    } else {
        CachingStrategy::Null(NullCache::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    struct NoSource;

    #[async_trait]
    impl AppSource for NoSource {
        async fn list_apps(&self) -> Result<Vec<AppMetadata>, CacheError> {
            Ok(Vec::new())
        }

        async fn fetch_app(&self, _guid: &AppGuid) -> Result<Option<AppMetadata>, CacheError> {
            Ok(None)
        }
    }

    fn settings() -> CacheSettings {
        CacheSettings {
            path: PathBuf::from("unused.db"),
            invalidate_ttl: Duration::from_secs(60),
            ignore_missing_apps: false,
            missing_apps_ttl: Duration::from_secs(3600),
        }
    }

    #[test]
    fn unknown_names_are_skipped() {
        assert_eq!(
            requested_kinds("LogMessage, Bogus,,ValueMetric"),
            vec![EventKind::LogMessage, EventKind::ValueMetric]
        );
    }

    #[test]
    fn metadata_kinds_select_persistent_cache() {
        let strategy = select_strategy(
            &requested_kinds("ValueMetric,HttpStartStop"),
            &settings(),
            Arc::new(NoSource),
        );
        assert_eq!(strategy.kind(), CacheKind::Persistent);
    }

    #[test]
    fn metric_kinds_select_null_cache() {
        let strategy = select_strategy(
            &requested_kinds("ValueMetric,CounterEvent,Error"),
            &settings(),
            Arc::new(NoSource),
        );
        assert_eq!(strategy.kind(), CacheKind::Null);
    }

    #[test]
    fn selection_does_not_touch_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = settings();
        cfg.path = dir.path().join("apps.db");
        let _strategy = select_strategy(&[EventKind::LogMessage], &cfg, Arc::new(NoSource));
        assert!(!cfg.path.exists());
    }
}
