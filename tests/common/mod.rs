#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;

use presto_client::{ConnectionParameters, RetryPolicy};

/// One scripted coordinator answer.
#[derive(Clone)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Reply {
    pub fn page(body: Value) -> Self { Self { status: 200, headers: Vec::new(), body: body.to_string() } }
    pub fn status(status: u16) -> Self { Self { status, headers: Vec::new(), body: format!("status {status}") } }
    pub fn redirect(location: &str) -> Self { Self::status(302).header("Location", location) }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: String,
}

#[derive(Default)]
pub struct MockState {
    script: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<Recorded>>,
    delete_status: Mutex<Option<u16>>,
}

pub struct MockCoordinator {
    pub base: String,
    pub port: u16,
    state: Arc<MockState>,
    handle: JoinHandle<()>,
}

impl Drop for MockCoordinator {
    fn drop(&mut self) { self.handle.abort(); }
}

impl MockCoordinator {
    pub async fn start() -> Self { Self::start_on(0).await }

    /// Bind a specific port; 0 picks an ephemeral one.
    pub async fn start_on(port: u16) -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new().fallback(handle).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await.expect("bind 127.0.0.1");
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("mock coordinator error: {e:?}");
            }
        });
        Self { base: format!("http://127.0.0.1:{port}"), port, state, handle }
    }

    pub fn url(&self, path: &str) -> String { format!("{}{}", self.base, path) }

    pub fn push(&self, reply: Reply) { self.state.script.lock().push_back(reply); }

    pub fn set_delete_status(&self, status: u16) { *self.state.delete_status.lock() = Some(status); }

    pub fn requests(&self) -> Vec<Recorded> { self.state.requests.lock().clone() }

    pub fn count(&self, method: Method) -> usize { self.state.requests.lock().iter().filter(|r| r.method == method).count() }

    /// Parameters pointed at this coordinator with a fast retry policy.
    pub fn params(&self) -> ConnectionParameters {
        ConnectionParameters::new("127.0.0.1", self.port, "tester")
            .with_catalog("hive")
            .with_schema("default")
            .with_retry(RetryPolicy::default().with_backoff(Duration::from_millis(1), Duration::from_millis(5)))
    }
}

async fn handle(State(state): State<Arc<MockState>>, method: Method, uri: Uri, headers: HeaderMap, body: String) -> Response {
    state.requests.lock().push(Recorded { method: method.clone(), path: uri.to_string(), headers, body });
    if method == Method::DELETE {
        let status = state.delete_status.lock().unwrap_or(204);
        return StatusCode::from_u16(status).unwrap_or(StatusCode::NO_CONTENT).into_response();
    }
    let Some(reply) = state.script.lock().pop_front() else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "script exhausted").into_response();
    };
    let mut out = HeaderMap::new();
    for (k, v) in &reply.headers {
        out.append(HeaderName::from_bytes(k.as_bytes()).unwrap(), HeaderValue::from_str(v).unwrap());
    }
    let status = StatusCode::from_u16(reply.status).unwrap();
    (status, out, reply.body).into_response()
}
