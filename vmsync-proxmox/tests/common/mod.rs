//! Canned-response mock of the Proxmox VE API.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Json;
use serde_json::{Value, json};
use tokio::net::TcpListener;

pub const TOKEN_ID: &str = "root@pam!vmsync";
pub const SECRET: &str = "5d3f0c2e-0000-4000-8000-000000000000";

#[derive(Default)]
struct Store {
    responses: HashMap<String, Value>,
    failures: HashMap<String, u16>,
    requests: Vec<String>,
}

type Shared = Arc<Mutex<Store>>;

pub struct MockPve {
    pub url: String,
    store: Shared,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl MockPve {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind");
        let url = format!("http://{}", listener.local_addr().unwrap());

        let store: Shared = Arc::new(Mutex::new(Store::default()));
        store
            .lock()
            .unwrap()
            .responses
            .insert("version".into(), json!({"version": "8.2.4", "release": "8.2"}));

        let router = Router::new()
            .route("/api2/json/{*path}", get(respond))
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

    /// Serve `data` under `path` (relative to `/api2/json/`, no query).
    pub fn set(&self, path: &str, data: Value) {
        self.store
            .lock()
            .unwrap()
            .responses
            .insert(path.trim_matches('/').to_string(), data);
    }

    /// Answer `path` with an error status.
    pub fn fail(&self, path: &str, status: u16) {
        self.store
            .lock()
            .unwrap()
            .failures
            .insert(path.trim_matches('/').to_string(), status);
    }

    /// Requested paths with their query string, in order.
    pub fn requests(&self) -> Vec<String> {
        self.store.lock().unwrap().requests.clone()
    }
}

impl Drop for MockPve {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn respond(
    State(store): State<Shared>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let expected = format!("PVEAPIToken={}={}", TOKEN_ID, SECRET);
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "authentication failure").into_response();
    }

    let mut store = store.lock().unwrap();
    store.requests.push(match query.filter(|q| !q.is_empty()) {
        Some(q) => format!("{}?{}", path, q),
        None => path.clone(),
    });
    if let Some(status) = store.failures.get(&path) {
        let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, Json(json!({"data": null}))).into_response();
    }
    match store.responses.get(&path) {
        Some(data) => Json(json!({ "data": data })).into_response(),
        None => (StatusCode::NOT_IMPLEMENTED, Json(json!({"data": null}))).into_response(),
    }
}
