//! Cache error types.

/// Errors produced by [`AppCache`](crate::AppCache) and
/// [`AppSource`](crate::AppSource) operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Underlying `SQLite` failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// File-system I/O failure (e.g. creating the database directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal mutex was poisoned by a panicked thread.
    #[error("cache lock poisoned")]
    LockPoisoned,

    /// The cache was used before `open` succeeded (or after `close`).
    #[error("cache is not open")]
    NotOpen,

    /// The source of truth (platform API) failed.
    #[error("metadata source error: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl CacheError {
    /// Wrap any error raised by an [`AppSource`](crate::AppSource).
    pub fn from_source(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Source(Box::new(err))
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, CacheError>;
