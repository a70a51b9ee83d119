//! Canned-response mock of the vCenter REST API with session handling.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use serde_json::{Value, json};
use tokio::net::TcpListener;

pub const USER: &str = "administrator@vsphere.local";
pub const PASSWORD: &str = "secret";
/// `Basic base64(USER:PASSWORD)`
const BASIC_AUTH: &str = "Basic YWRtaW5pc3RyYXRvckB2c3BoZXJlLmxvY2FsOnNlY3JldA==";

#[derive(Default)]
struct Store {
    responses: HashMap<String, Value>,
    failures: HashMap<String, u16>,
    sessions: Vec<String>,
    logins: usize,
}

type Shared = Arc<Mutex<Store>>;

pub struct MockVcenter {
    pub url: String,
    store: Shared,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl MockVcenter {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind");
        let url = format!("http://{}", listener.local_addr().unwrap());

        let store: Shared = Arc::new(Mutex::new(Store::default()));
        let router = Router::new()
            .route("/api/session", post(login))
            .route("/api/{*path}", get(respond))
            .with_state(store.clone());

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            url,
            store,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Serve `body` for `path` (below `/api/`, including the query string
    /// if any, e.g. `vcenter/vm?clusters=domain-c8`).
    pub fn set(&self, path: &str, body: Value) {
        self.store
            .lock()
            .unwrap()
            .responses
            .insert(path.to_string(), body);
    }

    pub fn fail(&self, path: &str, status: u16) {
        self.store
            .lock()
            .unwrap()
            .failures
            .insert(path.to_string(), status);
    }

    /// Invalidate every open session.
    pub fn expire_sessions(&self) {
        self.store.lock().unwrap().sessions.clear();
    }

    pub fn logins(&self) -> usize {
        self.store.lock().unwrap().logins
    }
}

impl Drop for MockVcenter {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn login(State(store): State<Shared>, headers: HeaderMap) -> Response {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == BASIC_AUTH);
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error_type": "UNAUTHENTICATED"})),
        )
            .into_response();
    }
    let mut store = store.lock().unwrap();
    store.logins += 1;
    let token = format!("session-{}", store.logins);
    store.sessions.push(token.clone());
    (StatusCode::CREATED, Json(json!(token))).into_response()
}

async fn respond(
    State(store): State<Shared>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let store = store.lock().unwrap();
    let session = headers
        .get("vmware-api-session-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !store.sessions.iter().any(|s| s == session) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error_type": "UNAUTHENTICATED"})),
        )
            .into_response();
    }

    let key = match query.filter(|q| !q.is_empty()) {
        Some(q) => format!("{}?{}", path, q),
        None => path,
    };
    if let Some(status) = store.failures.get(&key) {
        let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, Json(json!({"error_type": "SERVICE_UNAVAILABLE"}))).into_response();
    }
    match store.responses.get(&key) {
        Some(body) => Json(body.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"error_type": "NOT_FOUND"}))).into_response(),
    }
}
