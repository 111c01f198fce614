//! In-process stand-in for the work-log backend, plus fixtures wiring the
//! client and stores against it.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::NaiveDate;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use crate::api::{self, ClientEvent, EventReceiver, HttpClient, WorkLogApi};
use crate::config::{ApiConfig, Config};
use crate::logs::{Clock, FixedClock, SystemClock};
use crate::session::MemoryCredentialStore;
use crate::AppContext;

const REDIRECT_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone)]
struct Reply {
    status: StatusCode,
    body: Value,
    delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct StubState {
    replies: Mutex<HashMap<String, Reply>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Replies are keyed by `"METHOD /path"` or `"METHOD /path?query"`; the
/// exact query form wins over the bare path. Unknown routes get a 404.
#[derive(Debug, Clone)]
pub struct StubBackend {
    addr: SocketAddr,
    state: Arc<StubState>,
}

impl StubBackend {
    pub async fn start() -> Self {
        let state = Arc::new(StubState::default());
        let app = axum::Router::new()
            .fallback(handle)
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn on(&self, method: &str, path: &str, body: Value) {
        self.reply(method, path, StatusCode::OK, body, None);
    }

    pub fn on_status(&self, method: &str, path: &str, status: StatusCode, body: Value) {
        self.reply(method, path, status, body, None);
    }

    pub fn on_delayed(&self, method: &str, path: &str, body: Value, delay: Duration) {
        self.reply(method, path, StatusCode::OK, body, Some(delay));
    }

    fn reply(&self, method: &str, path: &str, status: StatusCode, body: Value, delay: Option<Duration>) {
        self.state.replies.lock().insert(
            format!("{} {}", method.to_uppercase(), path),
            Reply {
                status,
                body,
                delay,
            },
        );
    }

    /// All requests in arrival order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

async fn handle(
    State(state): State<Arc<StubState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let query = uri.query().map(str::to_string);

    state.requests.lock().push(RecordedRequest {
        method: method.to_string(),
        path: path.clone(),
        query: query.clone(),
        headers,
        body,
    });

    let reply = {
        let replies = state.replies.lock();
        let exact = query
            .as_ref()
            .and_then(|q| replies.get(&format!("{} {}?{}", method, path, q)));
        exact
            .or_else(|| replies.get(&format!("{} {}", method, path)))
            .cloned()
    };

    match reply {
        Some(reply) => {
            if let Some(delay) = reply.delay {
                tokio::time::sleep(delay).await;
            }
            (reply.status, Json(reply.body)).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "msg": format!("no stub for {} {}", method, path) })),
        )
            .into_response(),
    }
}

fn api_config(base_url: String) -> ApiConfig {
    ApiConfig {
        base_url,
        timeout_secs: 1,
    }
}

/// A bare client and API wrapper sharing one credential cell and one event channel
pub struct Harness {
    pub backend: StubBackend,
    pub credentials: Arc<MemoryCredentialStore>,
    pub events: EventReceiver,
    pub client: HttpClient,
    pub api: WorkLogApi,
}

impl Harness {
    pub async fn start() -> Self {
        let backend = StubBackend::start().await;
        let url = backend.url();
        Self::build(backend, url)
    }

    /// Client pointed at a port nothing listens on
    pub async fn start_unreachable() -> Self {
        let backend = StubBackend::start().await;
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        Self::build(backend, format!("http://{}", addr))
    }

    fn build(backend: StubBackend, base_url: String) -> Self {
        let config = api_config(base_url);
        let credentials = Arc::new(MemoryCredentialStore::new());
        let (events_tx, events) = api::channel();

        let client =
            HttpClient::new(&config, REDIRECT_DELAY, credentials.clone(), events_tx.clone())
                .unwrap();
        let api = WorkLogApi::new(
            HttpClient::new(&config, REDIRECT_DELAY, credentials.clone(), events_tx).unwrap(),
        );

        Self {
            backend,
            credentials,
            events,
            client,
            api,
        }
    }
}

/// A full [`AppContext`] backed by the stub and an in-memory credential
pub struct TestApp {
    pub backend: StubBackend,
    pub credentials: Arc<MemoryCredentialStore>,
    pub ctx: AppContext,
    pub events: EventReceiver,
}

impl TestApp {
    pub async fn start() -> Self {
        Self::with_clock(Arc::new(SystemClock)).await
    }

    pub async fn start_on(today: NaiveDate) -> Self {
        Self::with_clock(Arc::new(FixedClock(today))).await
    }

    async fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let backend = StubBackend::start().await;
        let config = Config {
            api: api_config(backend.url()),
            ..Config::default()
        };
        let credentials = Arc::new(MemoryCredentialStore::new());
        let (ctx, events) = AppContext::new(config, credentials.clone(), clock).unwrap();

        Self {
            backend,
            credentials,
            ctx,
            events,
        }
    }
}

pub fn drain_events(events: &mut EventReceiver) -> Vec<ClientEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
