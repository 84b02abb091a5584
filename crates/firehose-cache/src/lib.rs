//! Application metadata cache for the firehose nozzle.
//!
//! Provides the [`AppCache`] capability, the [`AppSource`] source-of-truth
//! contract, a [`SqliteCache`] persistent implementation with TTL-based full
//! refresh and a missing-id bucket, and the no-op [`NullCache`].

#![warn(clippy::pedantic)]

pub mod backend;
pub mod error;
pub mod null;
pub mod sqlite;

pub use backend::{is_needed, AppCache, AppSource};
pub use error::CacheError;
pub use null::NullCache;
pub use sqlite::{SqliteCache, SqliteCacheConfig};
