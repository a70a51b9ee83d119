//! In-process mock of the NetBox REST API.
//!
//! Stores objects as JSON per endpoint and implements the list filters,
//! pagination and nested references vmsync relies on.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Json;
use serde_json::{Map, Value, json};
use tokio::net::TcpListener;

pub const TOKEN: &str = "test-token";
const DEFAULT_LIMIT: usize = 50;

#[derive(Default)]
struct Store {
    base_url: String,
    next_id: u64,
    objects: HashMap<String, BTreeMap<u64, Value>>,
    writes: Vec<String>,
}

type Shared = Arc<Mutex<Store>>;

/// Mock NetBox server bound to a random local port.
pub struct MockNetBox {
    pub addr: SocketAddr,
    pub url: String,
    store: Shared,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl MockNetBox {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind");
        let addr = listener.local_addr().unwrap();
        let url = format!("http://{}", addr);

        let store: Shared = Arc::new(Mutex::new(Store {
            base_url: url.clone(),
            ..Default::default()
        }));

        let router = Router::new()
            .route("/api/{app}/{model}/", get(list).post(create))
            .route(
                "/api/{app}/{model}/{id}/",
                get(fetch).patch(update).delete(remove),
            )
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
            addr,
            url,
            store,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Insert an object as if it had been POSTed. Returns its ID.
    pub fn insert(&self, endpoint: &str, body: Value) -> u64 {
        let mut store = self.store.lock().unwrap();
        insert_object(&mut store, endpoint, body)["id"]
            .as_u64()
            .unwrap()
    }

    /// All objects of an endpoint such as `virtualization/virtual-machines`.
    pub fn objects(&self, endpoint: &str) -> Vec<Value> {
        let store = self.store.lock().unwrap();
        store
            .objects
            .get(endpoint)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn object(&self, endpoint: &str, id: u64) -> Option<Value> {
        let store = self.store.lock().unwrap();
        store.objects.get(endpoint).and_then(|m| m.get(&id)).cloned()
    }

    /// Overwrite a field of a stored object without recording a write.
    pub fn set_field(&self, endpoint: &str, id: u64, field: &str, value: Value) {
        let mut store = self.store.lock().unwrap();
        if let Some(object) = store.objects.get_mut(endpoint).and_then(|m| m.get_mut(&id)) {
            object[field] = value;
        }
    }

    /// Write requests (`POST`/`PATCH`/`DELETE path`) received so far.
    pub fn writes(&self) -> Vec<String> {
        self.store.lock().unwrap().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.store.lock().unwrap().writes.clear();
    }
}

impl Drop for MockNetBox {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Token {}", TOKEN))
}

fn forbidden() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({"detail": "Invalid token"})),
    )
        .into_response()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"detail": "Not found."}))).into_response()
}

/// Collection holding the target of a foreign key field.
fn reference_target(endpoint: &str, field: &str) -> Option<&'static str> {
    match (endpoint, field) {
        (_, "cluster") => Some("virtualization/clusters"),
        (_, "virtual_machine") => Some("virtualization/virtual-machines"),
        ("virtualization/clusters", "group") => Some("virtualization/cluster-groups"),
        ("virtualization/clusters", "type") => Some("virtualization/cluster-types"),
        _ => None,
    }
}

/// Expand foreign keys and choice fields into their nested representation.
fn normalize(store: &Store, endpoint: &str, object: &mut Map<String, Value>) {
    for field in ["cluster", "virtual_machine", "group", "type"] {
        let Some(target) = reference_target(endpoint, field) else {
            continue;
        };
        if let Some(id) = object.get(field).and_then(Value::as_u64) {
            let name = store
                .objects
                .get(target)
                .and_then(|m| m.get(&id))
                .and_then(|o| o.get("name"))
                .cloned()
                .unwrap_or(Value::Null);
            object.insert(
                field.to_string(),
                json!({
                    "id": id,
                    "name": name,
                    "display": name,
                    "url": format!("{}/api/{}/{}/", store.base_url, target, id),
                }),
            );
        }
    }
    if let Some(Value::String(status)) = object.get("status").cloned() {
        object.insert("status".into(), json!({"value": status, "label": status}));
    }
    if endpoint == "virtualization/virtual-machines" {
        object.insert("last_updated".into(), json!(chrono::Utc::now().to_rfc3339()));
    }
}

fn insert_object(store: &mut Store, endpoint: &str, body: Value) -> Value {
    let mut object = match body {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    store.next_id += 1;
    let id = store.next_id;
    object.insert("id".into(), json!(id));
    object.insert(
        "url".into(),
        json!(format!("{}/api/{}/{}/", store.base_url, endpoint, id)),
    );
    object
        .entry("custom_fields")
        .or_insert_with(|| json!({}));
    normalize(store, endpoint, &mut object);

    let value = Value::Object(object);
    store
        .objects
        .entry(endpoint.to_string())
        .or_default()
        .insert(id, value.clone());
    value
}

fn field_str(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map
            .get("value")
            .or_else(|| map.get("id"))
            .and_then(field_str),
        _ => None,
    }
}

fn matches(store: &Store, endpoint: &str, object: &Value, key: &str, expected: &str) -> bool {
    if endpoint == "ipam/ip-addresses" && key == "virtual_machine_id" {
        let interface_ids: Vec<u64> = store
            .objects
            .get("virtualization/interfaces")
            .map(|m| {
                m.values()
                    .filter(|i| field_str(&i["virtual_machine"]).as_deref() == Some(expected))
                    .filter_map(|i| i["id"].as_u64())
                    .collect()
            })
            .unwrap_or_default();
        return object["assigned_object_id"]
            .as_u64()
            .is_some_and(|id| interface_ids.contains(&id));
    }
    if let Some(field) = key.strip_prefix("cf_") {
        return field_str(&object["custom_fields"][field]).as_deref() == Some(expected);
    }
    let field = if key == "id" {
        key
    } else {
        key.strip_suffix("_id").unwrap_or(key)
    };
    field_str(&object[field]).as_deref() == Some(expected)
}

fn encode(value: &str) -> String {
    let mut out = String::new();
    for b in value.bytes() {
        if b.is_ascii_alphanumeric() || b"-_.~".contains(&b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

async fn list(
    State(store): State<Shared>,
    Path((app, model)): Path<(String, String)>,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return forbidden();
    }
    let endpoint = format!("{}/{}", app, model);
    let store = store.lock().unwrap();

    let mut limit = DEFAULT_LIMIT;
    let mut offset = 0;
    let mut filters = Vec::new();
    for (key, value) in &query {
        match key.as_str() {
            "limit" => limit = value.parse().unwrap_or(DEFAULT_LIMIT).max(1),
            "offset" => offset = value.parse().unwrap_or(0),
            _ => filters.push((key.clone(), value.clone())),
        }
    }

    let matching: Vec<Value> = store
        .objects
        .get(&endpoint)
        .map(|m| {
            m.values()
                .filter(|o| filters.iter().all(|(k, v)| matches(&store, &endpoint, o, k, v)))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    let end = (offset + limit).min(matching.len());
    let results = matching.get(offset..end).map(<[Value]>::to_vec).unwrap_or_default();
    let next = (end < matching.len()).then(|| {
        let mut params: Vec<String> = filters
            .iter()
            .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
            .collect();
        params.push(format!("limit={}", limit));
        params.push(format!("offset={}", end));
        format!("{}/api/{}/?{}", store.base_url, endpoint, params.join("&"))
    });

    Json(json!({
        "count": matching.len(),
        "next": next,
        "previous": null,
        "results": results,
    }))
    .into_response()
}

async fn fetch(
    State(store): State<Shared>,
    Path((app, model, id)): Path<(String, String, u64)>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return forbidden();
    }
    let store = store.lock().unwrap();
    match store
        .objects
        .get(&format!("{}/{}", app, model))
        .and_then(|m| m.get(&id))
    {
        Some(object) => Json(object.clone()).into_response(),
        None => not_found(),
    }
}

async fn create(
    State(store): State<Shared>,
    Path((app, model)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return forbidden();
    }
    let endpoint = format!("{}/{}", app, model);
    let mut store = store.lock().unwrap();
    store.writes.push(format!("POST {}", endpoint));

    if endpoint == "virtualization/virtual-machines" {
        let cluster_exists = body["cluster"]
            .as_u64()
            .and_then(|id| store.objects.get("virtualization/clusters").map(|m| m.contains_key(&id)))
            .unwrap_or(false);
        if !cluster_exists {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"cluster": ["Related object not found."]})),
            )
                .into_response();
        }
    }

    if let Some(slug) = body["slug"].as_str() {
        let taken = store
            .objects
            .get(&endpoint)
            .is_some_and(|m| m.values().any(|o| o["slug"].as_str() == Some(slug)));
        if slug.is_empty() || taken {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"slug": ["An object with this slug already exists."]})),
            )
                .into_response();
        }
    }

    let object = insert_object(&mut store, &endpoint, body);
    (StatusCode::CREATED, Json(object)).into_response()
}

async fn update(
    State(store): State<Shared>,
    Path((app, model, id)): Path<(String, String, u64)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return forbidden();
    }
    let endpoint = format!("{}/{}", app, model);
    let mut guard = store.lock().unwrap();
    let store = &mut *guard;
    store.writes.push(format!("PATCH {}/{}", endpoint, id));

    let Some(mut object) = store
        .objects
        .get(&endpoint)
        .and_then(|m| m.get(&id))
        .and_then(|o| o.as_object().cloned())
    else {
        return not_found();
    };

    let Value::Object(patch) = body else {
        return (StatusCode::BAD_REQUEST, Json(json!({"detail": "expected object"})))
            .into_response();
    };
    for (key, value) in patch {
        if key == "custom_fields" {
            let merged = object
                .entry("custom_fields")
                .or_insert_with(|| json!({}));
            if let (Some(target), Value::Object(fields)) = (merged.as_object_mut(), value) {
                target.extend(fields);
            }
        } else {
            object.insert(key, value);
        }
    }
    normalize(store, &endpoint, &mut object);

    let value = Value::Object(object);
    if let Some(m) = store.objects.get_mut(&endpoint) {
        m.insert(id, value.clone());
    }
    Json(value).into_response()
}

async fn remove(
    State(store): State<Shared>,
    Path((app, model, id)): Path<(String, String, u64)>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return forbidden();
    }
    let endpoint = format!("{}/{}", app, model);
    let mut store = store.lock().unwrap();
    store.writes.push(format!("DELETE {}/{}", endpoint, id));

    let removed = store
        .objects
        .get_mut(&endpoint)
        .and_then(|m| m.remove(&id))
        .is_some();
    if !removed {
        return not_found();
    }

    if endpoint == "virtualization/virtual-machines" {
        let mut interface_ids = Vec::new();
        if let Some(interfaces) = store.objects.get_mut("virtualization/interfaces") {
            interfaces.retain(|iid, i| {
                let owned = i["virtual_machine"]["id"].as_u64() == Some(id);
                if owned {
                    interface_ids.push(*iid);
                }
                !owned
            });
        }
        if let Some(ips) = store.objects.get_mut("ipam/ip-addresses") {
            ips.retain(|_, ip| {
                !ip["assigned_object_id"]
                    .as_u64()
                    .is_some_and(|i| interface_ids.contains(&i))
            });
        }
    }
    StatusCode::NO_CONTENT.into_response()
}
