//! Resource guards and the running pipeline's handle.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use firehose_cache::{AppCache, CacheError};
use tokio::task::JoinHandle;

use crate::caching::CacheKind;
use crate::routing::{CounterSnapshot, Router};

/// Owns the selected cache on behalf of the bootstrap. The cache is
/// closed exactly once: on [`CacheGuard::release`] or when the guard is
/// dropped, whichever comes first.
pub struct CacheGuard {
    cache: Arc<dyn AppCache>,
    kind: CacheKind,
    released: AtomicBool,
}

impl CacheGuard {
    #[must_use]
    pub fn new(cache: Arc<dyn AppCache>, kind: CacheKind) -> Self {
        Self {
            cache,
            kind,
            released: AtomicBool::new(false),
        }
    }

    /// Shared handle for consumers (the router).
    #[must_use]
    pub fn cache(&self) -> Arc<dyn AppCache> {
        Arc::clone(&self.cache)
    }

    #[must_use]
    pub fn kind(&self) -> CacheKind {
        self.kind
    }

    /// # Errors
    ///
    /// Propagates the cache's open failure.
    pub async fn open(&self) -> Result<(), CacheError> {
        self.cache.open().await
    }

    /// Close the cache if it has not been closed yet. Close failures are
    /// logged.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        match self.cache.close() {
            Ok(()) => tracing::debug!(cache = %self.kind, "Cache closed"),
            Err(e) => tracing::warn!(cache = %self.kind, error = %e, "Failed to close cache"),
        }
    }
}

impl Drop for CacheGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Aborts a background task when dropped.
pub struct TaskGuard(JoinHandle<()>);

impl TaskGuard {
    #[must_use]
    pub fn new(handle: JoinHandle<()>) -> Self {
        Self(handle)
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

// ---------------------------------------------------------------------------
// PipelineHandle
// ---------------------------------------------------------------------------

/// Lifecycle of a started pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Running,
    Failed,
    Stopped,
}

/// Why [`PipelineHandle::wait`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The shutdown future completed (signal).
    Shutdown,
    /// The stream task ended on its own.
    StreamEnded,
    /// The stream task panicked.
    StreamFailed,
}

/// Handle to a running pipeline. Owns the stream task, the optional
/// totals task and the cache; dropping it releases all three.
pub struct PipelineHandle {
    state: PipelineState,
    stream: JoinHandle<()>,
    totals: Option<TaskGuard>,
    cache: CacheGuard,
    router: Arc<Router>,
}

impl PipelineHandle {
    #[must_use]
    pub fn new(
        stream: JoinHandle<()>,
        totals: Option<TaskGuard>,
        cache: CacheGuard,
        router: Arc<Router>,
    ) -> Self {
        Self {
            state: PipelineState::Running,
            stream,
            totals,
            cache,
            router,
        }
    }

    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    #[must_use]
    pub fn cache_kind(&self) -> CacheKind {
        self.cache.kind()
    }

    #[must_use]
    pub fn counters(&self) -> CounterSnapshot {
        self.router.counters()
    }

    /// Wait until `shutdown` completes or the stream task ends.
    pub async fn wait<F>(&mut self, shutdown: F) -> StopReason
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            () = shutdown => StopReason::Shutdown,
            joined = &mut self.stream => match joined {
                Ok(()) => {
                    self.state = PipelineState::Stopped;
                    StopReason::StreamEnded
                }
                Err(e) => {
                    tracing::error!(error = %e, "Stream task failed");
                    self.state = PipelineState::Failed;
                    StopReason::StreamFailed
                }
            },
        }
    }

    /// Stop the tasks and close the cache.
    pub fn shutdown(mut self) -> PipelineState {
        self.stream.abort();
        self.totals.take();
        self.cache.release();
        if self.state == PipelineState::Running {
            self.state = PipelineState::Stopped;
        }
        tracing::info!(counts = %self.router.counters(), "Pipeline stopped");
        self.state
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.stream.abort();
    }
}

/// Resolves on Ctrl-C or, on Unix, `SIGTERM`.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl-C"),
        () = terminate => tracing::info!("Received SIGTERM"),
    }
}
