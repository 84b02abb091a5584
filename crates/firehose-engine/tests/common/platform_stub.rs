//! In-process platform served with axum: root document, token endpoint,
//! v3 application listing and the log-stream gateway. Every request is
//! recorded for later assertions.

use std::sync::{Arc, Mutex};

use axum::body::{to_bytes, Body};
use axum::extract::{Path, RawQuery, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// One server-sent event carrying a single `OUT` log line ("hello") for
/// `app-1`.
pub const LOG_BATCH: &str = "data: {\"batch\":[{\"timestamp\":\"1700000000000000000\",\
\"source_id\":\"app-1\",\"instance_id\":\"0\",\"tags\":{\"source_type\":\"APP/PROC/WEB\",\
\"origin\":\"rep\"},\"log\":{\"payload\":\"aGVsbG8=\",\"type\":\"OUT\"}}]}\n\n";

/// Failure modes of the stub platform.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubOptions {
    /// Token endpoint answers 401.
    pub reject_credentials: bool,
    /// Stream gateway answers 401.
    pub reject_stream: bool,
    /// Root document lacks the `log_stream` link.
    pub omit_stream_link: bool,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Path including the query string.
    pub target: String,
    pub headers: HeaderMap,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

struct StubState {
    base: String,
    options: StubOptions,
    requests: Mutex<Vec<RecordedRequest>>,
}

pub struct PlatformStub {
    state: Arc<StubState>,
    task: JoinHandle<()>,
}

impl PlatformStub {
    /// A healthy platform.
    pub async fn start() -> Self {
        Self::with_options(StubOptions::default()).await
    }

    pub async fn with_options(options: StubOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let state = Arc::new(StubState {
            base,
            options,
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/", get(root))
            .route("/oauth/token", post(token))
            .route("/v3/apps", get(list_apps))
            .route("/v3/apps/{guid}", get(fetch_app))
            .route("/v2/read", get(read))
            .layer(middleware::from_fn_with_state(Arc::clone(&state), record))
            .with_state(Arc::clone(&state));

        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { state, task }
    }

    pub fn url(&self) -> String {
        self.state.base.clone()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Number of stream subscription attempts so far.
    pub fn subscriptions(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.target.starts_with("/v2/read"))
            .count()
    }
}

impl Drop for PlatformStub {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn record(State(state): State<Arc<StubState>>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, usize::MAX).await.unwrap_or_default();
    let target = parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path().to_string(), ToString::to_string);
    state.requests.lock().unwrap().push(RecordedRequest {
        method: parts.method.to_string(),
        target,
        headers: parts.headers.clone(),
        body: String::from_utf8_lossy(&bytes).into_owned(),
    });
    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

async fn root(State(state): State<Arc<StubState>>) -> Json<Value> {
    let base = state.base.as_str();
    let mut links = json!({
        "self": {"href": base},
        "uaa": {"href": base},
        "credhub": null,
    });
    if !state.options.omit_stream_link {
        links["log_stream"] = json!({"href": base});
    }
    Json(json!({ "links": links }))
}

async fn token(State(state): State<Arc<StubState>>) -> Response {
    if state.options.reject_credentials {
        return (StatusCode::UNAUTHORIZED, "Bad credentials").into_response();
    }
    Json(json!({
        "access_token": "t0k3n",
        "token_type": "bearer",
        "expires_in": 3600,
    }))
    .into_response()
}

fn apps_page(next: Option<String>, guid: &str) -> Value {
    json!({
        "pagination": {"next": next.map(|href| json!({"href": href}))},
        "resources": [{
            "guid": guid,
            "name": format!("web-{guid}"),
            "relationships": {"space": {"data": {"guid": "space-1"}}},
        }],
        "included": {
            "spaces": [{
                "guid": "space-1",
                "name": "dev",
                "relationships": {"organization": {"data": {"guid": "org-1"}}},
            }],
            "organizations": [{"guid": "org-1", "name": "acme"}],
        },
    })
}

async fn list_apps(State(state): State<Arc<StubState>>, RawQuery(query): RawQuery) -> Json<Value> {
    let second_page = query
        .as_deref()
        .is_some_and(|q| q.split('&').any(|pair| pair == "page=2"));
    if second_page {
        Json(apps_page(None, "app-2"))
    } else {
        let next = format!("{}/v3/apps?page=2&per_page=1", state.base);
        Json(apps_page(Some(next), "app-1"))
    }
}

async fn fetch_app(Path(guid): Path<String>) -> Response {
    if guid != "app-1" {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!({
        "guid": "app-1",
        "name": "web-app-1",
        "relationships": {"space": {"data": {"guid": "space-1"}}},
    }))
    .into_response()
}

async fn read(State(state): State<Arc<StubState>>) -> Response {
    if state.options.reject_stream {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    ([(header::CONTENT_TYPE, "text/event-stream")], LOG_BATCH).into_response()
}
