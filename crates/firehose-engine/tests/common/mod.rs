//! Shared fakes for the bootstrap integration tests.

#![allow(dead_code)]

pub mod platform_stub;

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use firehose_cache::{AppCache, AppSource, CacheError};
use firehose_engine::auth::{AuthError, CredentialSession, TokenProvider};
use firehose_engine::collaborators::{Collaborators, PlatformConnection};
use firehose_engine::config::{PlatformConfig, RuntimeConfig, Settings};
use firehose_engine::platform::{PlatformEndpoints, PlatformError};
use firehose_engine::routing::Router;
use firehose_engine::sink::{Sink, SinkError};
use firehose_engine::CachingStrategy;
use firehose_engine::stream::{SessionSlot, StreamClient, StreamConfig, StreamError};
use firehose_types::{AppGuid, AppMetadata, Envelope, Event, EventPayload, MessageType};
use tokio::task::JoinHandle;

/// Ordered log of collaborator calls.
pub type CallLog = Arc<Mutex<Vec<&'static str>>>;

fn record(log: &CallLog, call: &'static str) {
    log.lock().unwrap().push(call);
}

pub fn settings(events: &str, cache_path: &Path) -> Settings {
    Settings {
        api_endpoint: Some("https://api.example.com".into()),
        client_id: Some("nozzle".into()),
        client_secret: Some("secret".into()),
        syslog_server: Some("logs.example.com:514".into()),
        events: events.into(),
        boltdb_path: cache_path.display().to_string(),
        ..Settings::default()
    }
}

pub fn config(events: &str, cache_path: &Path) -> RuntimeConfig {
    RuntimeConfig::resolve(settings(events, cache_path)).expect("valid settings")
}

pub fn app(guid: &str) -> AppMetadata {
    AppMetadata {
        guid: AppGuid::new(guid),
        name: "web".into(),
        space_guid: "space-1".into(),
        space_name: "dev".into(),
        org_guid: "org-1".into(),
        org_name: "acme".into(),
    }
}

pub fn log_envelope(app: &str, message: &str) -> Envelope {
    Envelope::new(
        1,
        EventPayload::LogMessage {
            app_id: AppGuid::new(app),
            message: message.into(),
            message_type: MessageType::Out,
            source_type: "APP/PROC/WEB".into(),
            source_instance: "0".into(),
        },
    )
}

pub fn metric_envelope(name: &str) -> Envelope {
    Envelope::new(
        1,
        EventPayload::ValueMetric {
            name: name.into(),
            value: 1.0,
            unit: "count".into(),
        },
    )
}

// ---------------------------------------------------------------------------
// Fake components
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeAppSource {
    pub apps: Vec<AppMetadata>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl AppSource for FakeAppSource {
    async fn list_apps(&self) -> Result<Vec<AppMetadata>, CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.apps.clone())
    }

    async fn fetch_app(&self, guid: &AppGuid) -> Result<Option<AppMetadata>, CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.apps.iter().find(|a| &a.guid == guid).cloned())
    }
}

/// Delegates to the selected strategy and counts closes.
pub struct CountingCache {
    inner: CachingStrategy,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl AppCache for CountingCache {
    async fn open(&self) -> Result<(), CacheError> {
        self.inner.open().await
    }

    fn close(&self) -> Result<(), CacheError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close()
    }

    async fn lookup(&self, guid: &AppGuid) -> Option<AppMetadata> {
        self.inner.lookup(guid).await
    }
}

pub struct FakeSink {
    pub reachable: bool,
    pub connects: AtomicUsize,
    pub shipped: Mutex<Vec<Event>>,
    log: CallLog,
}

impl FakeSink {
    pub fn shipped(&self) -> Vec<Event> {
        self.shipped.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sink for FakeSink {
    async fn connect(&self) -> bool {
        record(&self.log, "sink_connect");
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.reachable
    }

    async fn ship(&self, event: &Event) -> Result<(), SinkError> {
        self.shipped.lock().unwrap().push(event.clone());
        Ok(())
    }
}

struct FakeSession;

#[async_trait]
impl TokenProvider for FakeSession {
    async fn authorization(&self) -> Result<String, AuthError> {
        Ok("bearer fake".into())
    }

    async fn refresh(&self) -> Result<String, AuthError> {
        Ok("bearer fake".into())
    }
}

struct FakeStreamClient {
    fail: bool,
    envelopes: Vec<Envelope>,
    router: Arc<Router>,
    starts: Arc<AtomicUsize>,
    log: CallLog,
}

#[async_trait]
impl StreamClient for FakeStreamClient {
    async fn start(self: Box<Self>) -> Result<JoinHandle<()>, StreamError> {
        record(&self.log, "stream_start");
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(StreamError::Status(503));
        }
        let FakeStreamClient {
            envelopes, router, ..
        } = *self;
        Ok(tokio::spawn(async move {
            for envelope in &envelopes {
                router.route(envelope).await;
            }
            std::future::pending::<()>().await;
        }))
    }
}

/// Configurable [`Collaborators`] recording every call.
pub struct Fakes {
    pub platform_fails: bool,
    pub session_fails: bool,
    pub stream_fails: bool,
    pub envelopes: Vec<Envelope>,
    pub source: Arc<FakeAppSource>,
    pub sink: Arc<FakeSink>,
    pub stream_starts: Arc<AtomicUsize>,
    pub cache_closes: Arc<AtomicUsize>,
    pub session_was_ready: Mutex<Option<bool>>,
    pub log: CallLog,
}

impl Fakes {
    pub fn new() -> Self {
        Self::with_sink(true)
    }

    pub fn with_sink(reachable: bool) -> Self {
        let log = CallLog::default();
        Self {
            platform_fails: false,
            session_fails: false,
            stream_fails: false,
            envelopes: Vec::new(),
            source: Arc::new(FakeAppSource::default()),
            sink: Arc::new(FakeSink {
                reachable,
                connects: AtomicUsize::new(0),
                shipped: Mutex::new(Vec::new()),
                log: Arc::clone(&log),
            }),
            stream_starts: Arc::new(AtomicUsize::new(0)),
            cache_closes: Arc::new(AtomicUsize::new(0)),
            session_was_ready: Mutex::new(None),
            log,
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.log.lock().unwrap().clone()
    }

    pub fn starts(&self) -> usize {
        self.stream_starts.load(Ordering::SeqCst)
    }

    pub fn cache_closes(&self) -> usize {
        self.cache_closes.load(Ordering::SeqCst)
    }

    /// Wait until the sink has received `count` events.
    pub async fn shipped(&self, count: usize) -> Vec<Event> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let shipped = self.sink.shipped();
                if shipped.len() >= count {
                    return shipped;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("events shipped in time")
    }
}

#[async_trait]
impl Collaborators for Fakes {
    async fn connect_platform(
        &self,
        _config: &PlatformConfig,
    ) -> Result<PlatformConnection, PlatformError> {
        record(&self.log, "connect_platform");
        if self.platform_fails {
            return Err(PlatformError::MissingLink("uaa"));
        }
        Ok(PlatformConnection {
            endpoints: PlatformEndpoints {
                api: "https://api.example.com".into(),
                auth: "https://uaa.example.com".into(),
                stream: "https://log-stream.example.com".into(),
            },
            apps: self.source.clone(),
        })
    }

    async fn create_session(
        &self,
        _auth_endpoint: &str,
        _config: &PlatformConfig,
    ) -> Result<CredentialSession, AuthError> {
        record(&self.log, "create_session");
        if self.session_fails {
            return Err(AuthError::Rejected {
                endpoint: "https://uaa.example.com/oauth/token".into(),
                status: 401,
                body: "Bad credentials".into(),
            });
        }
        Ok(Arc::new(FakeSession))
    }

    fn create_cache(&self, strategy: CachingStrategy) -> Arc<dyn AppCache> {
        Arc::new(CountingCache {
            inner: strategy,
            closes: Arc::clone(&self.cache_closes),
        })
    }

    fn create_sink(&self, _config: &RuntimeConfig) -> Arc<dyn Sink> {
        record(&self.log, "create_sink");
        self.sink.clone()
    }

    fn create_stream_client(
        &self,
        _config: StreamConfig,
        session: SessionSlot,
        router: Arc<Router>,
    ) -> Result<Box<dyn StreamClient>, StreamError> {
        record(&self.log, "create_stream_client");
        *self.session_was_ready.lock().unwrap() = Some(matches!(session, SessionSlot::Ready(_)));
        Ok(Box::new(FakeStreamClient {
            fail: self.stream_fails,
            envelopes: self.envelopes.clone(),
            router,
            starts: Arc::clone(&self.stream_starts),
            log: Arc::clone(&self.log),
        }))
    }
}
