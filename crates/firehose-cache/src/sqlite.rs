//! `SQLite`-backed implementation of [`AppCache`].
//!
//! Uses a single `Mutex<Option<Connection>>` for thread safety; `None`
//! means the cache is not open. Two background timers maintain it: a full
//! refresh from the [`AppSource`] every `cache_invalidate_ttl`, and (when
//! missing apps are ignored) a wholesale eviction of the missing-id bucket
//! every `missing_apps_ttl`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use firehose_types::{AppGuid, AppMetadata};
use rusqlite::{Connection, OptionalExtension};
use tokio::task::JoinHandle;

use crate::backend::{AppCache, AppSource};
use crate::error::{self, CacheError};

/// Timers never tick faster than this, whatever the configuration says.
const MIN_TIMER_PERIOD: Duration = Duration::from_millis(1);

/// Idempotent DDL for the cache table.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS apps (
    guid TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    space_guid TEXT NOT NULL,
    space_name TEXT NOT NULL,
    org_guid TEXT NOT NULL,
    org_name TEXT NOT NULL
);
";

const UPSERT_APP: &str = "INSERT OR REPLACE INTO apps \
     (guid, name, space_guid, space_name, org_guid, org_name) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

/// Settings for [`SqliteCache`].
#[derive(Debug, Clone)]
pub struct SqliteCacheConfig {
    /// Database file. Parent directories are created on open.
    pub path: PathBuf,
    /// Period of the full refresh from the source of truth.
    pub cache_invalidate_ttl: Duration,
    /// Remember ids the source reported as absent, so they are not fetched
    /// again until the bucket is evicted.
    pub ignore_missing_apps: bool,
    /// Period of the missing-id bucket eviction.
    pub missing_apps_ttl: Duration,
}

/// Persistent application metadata cache.
///
/// Create with [`SqliteCache::new`], then [`AppCache::open`] it.
pub struct SqliteCache {
    shared: Arc<Shared>,
    timers: Mutex<Vec<JoinHandle<()>>>,
}

struct Shared {
    config: SqliteCacheConfig,
    source: Arc<dyn AppSource>,
    conn: Mutex<Option<Connection>>,
    missing: Mutex<HashSet<AppGuid>>,
}

impl SqliteCache {
    /// Build a closed cache over `source`. No I/O happens until `open`.
    #[must_use]
    pub fn new(config: SqliteCacheConfig, source: Arc<dyn AppSource>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                source,
                conn: Mutex::new(None),
                missing: Mutex::new(HashSet::new()),
            }),
            timers: Mutex::new(Vec::new()),
        }
    }

    /// Database file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.shared.config.path
    }

    /// Whether `open` has succeeded and `close` has not been called since.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared
            .conn
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Number of cached applications.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NotOpen`] before `open`, or a storage error.
    pub fn len(&self) -> error::Result<usize> {
        let guard = self.shared.lock_conn()?;
        let conn = guard.as_ref().ok_or(CacheError::NotOpen)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM apps", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Whether the cache holds no applications.
    ///
    /// # Errors
    ///
    /// Same as [`SqliteCache::len`].
    pub fn is_empty(&self) -> error::Result<bool> {
        self.len().map(|n| n == 0)
    }

    fn start_timers(&self) -> error::Result<()> {
        let mut timers = self.timers.lock().map_err(|_| CacheError::LockPoisoned)?;

        let shared = Arc::clone(&self.shared);
        let period = shared.config.cache_invalidate_ttl.max(MIN_TIMER_PERIOD);
        timers.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                shared.refresh().await;
            }
        }));

        if self.shared.config.ignore_missing_apps {
            let shared = Arc::clone(&self.shared);
            let period = shared.config.missing_apps_ttl.max(MIN_TIMER_PERIOD);
            timers.push(tokio::spawn(async move {
                let mut ticker =
                    tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                loop {
                    ticker.tick().await;
                    let evicted = shared.clear_missing();
                    tracing::debug!(evicted, "Cleared missing apps bucket");
                }
            }));
        }

        Ok(())
    }

    fn stop_timers(&self) -> error::Result<()> {
        let mut timers = self.timers.lock().map_err(|_| CacheError::LockPoisoned)?;
        for timer in timers.drain(..) {
            timer.abort();
        }
        Ok(())
    }
}

impl Shared {
    /// Acquire the connection lock.
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Option<Connection>>> {
        self.conn.lock().map_err(|_| CacheError::LockPoisoned)
    }

    fn get_app(&self, guid: &AppGuid) -> error::Result<Option<AppMetadata>> {
        let guard = self.lock_conn()?;
        let conn = guard.as_ref().ok_or(CacheError::NotOpen)?;
        let app = conn
            .query_row(
                "SELECT name, space_guid, space_name, org_guid, org_name \
                 FROM apps WHERE guid = ?1",
                [guid.as_str()],
                |row| {
                    Ok(AppMetadata {
                        guid: guid.clone(),
                        name: row.get(0)?,
                        space_guid: row.get(1)?,
                        space_name: row.get(2)?,
                        org_guid: row.get(3)?,
                        org_name: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(app)
    }

    fn put_app(&self, app: &AppMetadata) -> error::Result<()> {
        let guard = self.lock_conn()?;
        let conn = guard.as_ref().ok_or(CacheError::NotOpen)?;
        conn.execute(
            UPSERT_APP,
            rusqlite::params![
                app.guid.as_str(),
                app.name,
                app.space_guid,
                app.space_name,
                app.org_guid,
                app.org_name,
            ],
        )?;
        Ok(())
    }

    /// Replace the whole table with `apps` in one transaction.
    fn replace_all(&self, apps: &[AppMetadata]) -> error::Result<usize> {
        let mut guard = self.lock_conn()?;
        let conn = guard.as_mut().ok_or(CacheError::NotOpen)?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM apps", [])?;
        {
            let mut stmt = tx.prepare(UPSERT_APP)?;
            for app in apps {
                stmt.execute(rusqlite::params![
                    app.guid.as_str(),
                    app.name,
                    app.space_guid,
                    app.space_name,
                    app.org_guid,
                    app.org_name,
                ])?;
            }
        }
        tx.commit()?;
        Ok(apps.len())
    }

    /// Reload every application from the source. Failures keep the
    /// previous contents.
    async fn refresh(&self) {
        match self.source.list_apps().await {
            Ok(apps) => match self.replace_all(&apps) {
                Ok(count) => tracing::info!(apps = count, "Refreshed metadata cache"),
                Err(e) => tracing::warn!(error = %e, "Failed to store refreshed metadata"),
            },
            Err(e) => tracing::warn!(error = %e, "Failed to list apps for cache refresh"),
        }
    }

    fn is_known_missing(&self, guid: &AppGuid) -> bool {
        self.missing
            .lock()
            .map(|missing| missing.contains(guid))
            .unwrap_or(false)
    }

    fn mark_missing(&self, guid: &AppGuid) {
        if let Ok(mut missing) = self.missing.lock() {
            missing.insert(guid.clone());
        }
    }

    fn clear_missing(&self) -> usize {
        self.missing
            .lock()
            .map(|mut missing| {
                let evicted = missing.len();
                missing.clear();
                evicted
            })
            .unwrap_or(0)
    }
}

fn open_connection(path: &Path) -> error::Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    conn.execute_batch(CREATE_TABLES)?;
    Ok(conn)
}

#[async_trait]
impl AppCache for SqliteCache {
    async fn open(&self) -> error::Result<()> {
        {
            let mut guard = self.shared.lock_conn()?;
            if guard.is_some() {
                return Ok(());
            }
            *guard = Some(open_connection(self.path())?);
        }
        tracing::info!(path = %self.path().display(), "Opened metadata cache");

        self.shared.refresh().await;
        self.start_timers()
    }

    fn close(&self) -> error::Result<()> {
        self.stop_timers()?;
        let conn = self.shared.lock_conn()?.take();
        if let Some(conn) = conn {
            conn.close().map_err(|(_, e)| CacheError::Sqlite(e))?;
            tracing::info!(path = %self.path().display(), "Closed metadata cache");
        }
        Ok(())
    }

    async fn lookup(&self, guid: &AppGuid) -> Option<AppMetadata> {
        match self.shared.get_app(guid) {
            Ok(Some(app)) => return Some(app),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(app_id = %guid, error = %e, "Cache read failed");
                return None;
            }
        }

        let ignore_missing = self.shared.config.ignore_missing_apps;
        if ignore_missing && self.shared.is_known_missing(guid) {
            return None;
        }

        match self.shared.source.fetch_app(guid).await {
            Ok(Some(app)) => {
                if let Err(e) = self.shared.put_app(&app) {
                    tracing::warn!(app_id = %guid, error = %e, "Failed to cache app");
                }
                Some(app)
            }
            Ok(None) => {
                if ignore_missing {
                    self.shared.mark_missing(guid);
                }
                tracing::debug!(app_id = %guid, "App not found");
                None
            }
            Err(e) => {
                tracing::warn!(app_id = %guid, error = %e, "Failed to fetch app");
                None
            }
        }
    }
}

impl Drop for SqliteCache {
    fn drop(&mut self) {
        if let Ok(mut timers) = self.timers.lock() {
            for timer in timers.drain(..) {
                timer.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct FakeSource {
        apps: Mutex<Vec<AppMetadata>>,
        list_calls: AtomicUsize,
        fetch_calls: AtomicUsize,
        fail_list: bool,
    }

    impl FakeSource {
        fn with_apps(apps: Vec<AppMetadata>) -> Arc<Self> {
            Arc::new(Self {
                apps: Mutex::new(apps),
                ..Self::default()
            })
        }

        fn fetches(&self) -> usize {
            self.fetch_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AppSource for FakeSource {
        async fn list_apps(&self) -> error::Result<Vec<AppMetadata>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_list {
                return Err(CacheError::from_source(std::io::Error::other("api down")));
            }
            Ok(self.apps.lock().unwrap().clone())
        }

        async fn fetch_app(&self, guid: &AppGuid) -> error::Result<Option<AppMetadata>> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .apps
                .lock()
                .unwrap()
                .iter()
                .find(|a| &a.guid == guid)
                .cloned())
        }
    }

    fn app(guid: &str, name: &str) -> AppMetadata {
        AppMetadata {
            guid: AppGuid::new(guid),
            name: name.into(),
            space_guid: "space-1".into(),
            space_name: "dev".into(),
            org_guid: "org-1".into(),
            org_name: "acme".into(),
        }
    }

    fn config(dir: &Path, ignore_missing_apps: bool) -> SqliteCacheConfig {
        SqliteCacheConfig {
            path: dir.join("cache").join("apps.db"),
            cache_invalidate_ttl: Duration::from_secs(60),
            ignore_missing_apps,
            missing_apps_ttl: Duration::from_secs(3600),
        }
    }

    #[tokio::test]
    async fn open_fills_from_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::with_apps(vec![app("a", "web"), app("b", "worker")]);
        let cache = SqliteCache::new(config(dir.path(), false), source.clone());

        cache.open().await.unwrap();
        assert_eq!(cache.len().unwrap(), 2);

        let found = cache.lookup(&AppGuid::new("b")).await.unwrap();
        assert_eq!(found.name, "worker");
        assert_eq!(source.fetches(), 0, "hit must not reach the source");
        cache.close().unwrap();
    }

    #[tokio::test]
    async fn miss_is_fetched_once_then_served_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::with_apps(vec![]);
        let cache = SqliteCache::new(config(dir.path(), false), source.clone());
        cache.open().await.unwrap();

        source.apps.lock().unwrap().push(app("late", "late-app"));
        assert_eq!(cache.lookup(&AppGuid::new("late")).await.unwrap().name, "late-app");
        assert_eq!(cache.lookup(&AppGuid::new("late")).await.unwrap().name, "late-app");
        assert_eq!(source.fetches(), 1);
        cache.close().unwrap();
    }

    #[tokio::test]
    async fn unknown_ids_are_refetched_without_missing_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::with_apps(vec![]);
        let cache = SqliteCache::new(config(dir.path(), false), source.clone());
        cache.open().await.unwrap();

        assert!(cache.lookup(&AppGuid::new("ghost")).await.is_none());
        assert!(cache.lookup(&AppGuid::new("ghost")).await.is_none());
        assert_eq!(source.fetches(), 2);
        cache.close().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn missing_bucket_throttles_until_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::with_apps(vec![]);
        let mut cfg = config(dir.path(), true);
        cfg.missing_apps_ttl = Duration::from_secs(10);
        let cache = SqliteCache::new(cfg, source.clone());
        cache.open().await.unwrap();

        assert!(cache.lookup(&AppGuid::new("ghost")).await.is_none());
        assert!(cache.lookup(&AppGuid::new("ghost")).await.is_none());
        assert_eq!(source.fetches(), 1, "second lookup must be throttled");

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(cache.lookup(&AppGuid::new("ghost")).await.is_none());
        assert_eq!(source.fetches(), 2, "bucket eviction re-enables fetching");
        cache.close().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn full_refresh_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::with_apps(vec![app("a", "web")]);
        let mut cfg = config(dir.path(), false);
        cfg.cache_invalidate_ttl = Duration::from_secs(60);
        let cache = SqliteCache::new(cfg, source.clone());
        cache.open().await.unwrap();
        assert_eq!(cache.len().unwrap(), 1);

        *source.apps.lock().unwrap() = vec![app("b", "api"), app("c", "db")];
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(cache.len().unwrap(), 2);
        assert_eq!(source.list_calls.load(Ordering::SeqCst), 2);
        cache.close().unwrap();
    }

    #[tokio::test]
    async fn failed_initial_fill_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource {
            fail_list: true,
            ..FakeSource::default()
        });
        let cache = SqliteCache::new(config(dir.path(), false), source);
        cache.open().await.unwrap();
        assert!(cache.is_empty().unwrap());
        cache.close().unwrap();
    }

    #[tokio::test]
    async fn lookup_before_open_never_reaches_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::with_apps(vec![app("a", "web")]);
        let cache = SqliteCache::new(config(dir.path(), false), source.clone());

        assert!(cache.lookup(&AppGuid::new("a")).await.is_none());
        assert_eq!(source.fetches(), 0);
        assert!(!dir.path().join("cache").exists(), "no store before open");
    }

    #[tokio::test]
    async fn close_is_idempotent_and_allowed_before_open() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SqliteCache::new(config(dir.path(), false), FakeSource::with_apps(vec![]));
        cache.close().unwrap();
        cache.open().await.unwrap();
        assert!(cache.is_open());
        assert!(cache.path().exists());
        cache.close().unwrap();
        cache.close().unwrap();
        assert!(!cache.is_open());
    }

    #[tokio::test]
    async fn contents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::with_apps(vec![app("a", "web")]);
        let cache = SqliteCache::new(config(dir.path(), false), source.clone());
        cache.open().await.unwrap();
        cache.close().unwrap();

        source.apps.lock().unwrap().clear();
        let reopened = SqliteCache::new(
            config(dir.path(), false),
            Arc::new(FakeSource {
                fail_list: true,
                ..FakeSource::default()
            }),
        );
        reopened.open().await.unwrap();
        assert_eq!(reopened.lookup(&AppGuid::new("a")).await.unwrap().name, "web");
        reopened.close().unwrap();
    }
}
