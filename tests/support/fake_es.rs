//! Purpose: In-process fake of the Elasticsearch REST endpoints the binding uses.
//! Exports: `FakeEs`, `FakeEsState`.
//! Role: Lets integration tests exercise the elasticsearch binding over real HTTP.
//! Invariants: Binds loopback on an ephemeral port; shuts down when dropped.
//! Invariants: Search honours only the range/sort/size shape the binding sends.

use axum::body::Bytes;
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, head, post, put};
use axum::{Json, Router};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use tokio::sync::oneshot;

type Doc = Map<String, Value>;

#[derive(Debug, Default)]
pub struct FakeIndex {
    pub body: Value,
    pub docs: BTreeMap<String, Doc>,
}

#[derive(Debug, Default)]
pub struct FakeEsState {
    pub cluster_name: String,
    pub health_timed_out: bool,
    pub indices: BTreeMap<String, FakeIndex>,
    pub requests: Vec<String>,
    pub authorizations: Vec<String>,
}

type Shared = Arc<Mutex<FakeEsState>>;

pub struct FakeEs {
    addr: SocketAddr,
    state: Shared,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl FakeEs {
    pub fn start() -> Self {
        Self::start_with(FakeEsState {
            cluster_name: "elasticsearch".to_string(),
            ..FakeEsState::default()
        })
    }

    pub fn start_with(initial: FakeEsState) -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind fake es");
        listener.set_nonblocking(true).expect("nonblocking");
        let addr = listener.local_addr().expect("local addr");
        let state: Shared = Arc::new(Mutex::new(initial));
        let (tx, rx) = oneshot::channel::<()>();

        let app = Router::new()
            .route("/_cluster/health/:index", get(cluster_health))
            .route(
                "/:index",
                head(index_exists).put(create_index).delete(delete_index),
            )
            .route("/:index/_doc/:id", put(put_doc).get(get_doc).delete(delete_doc))
            .route("/:index/_update/:id", post(update_doc))
            .route("/:index/_search", post(search))
            .with_state(state.clone());

        let thread = std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("fake es runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).expect("tokio listener");
                axum::serve(listener, app)
                    .with_graceful_shutdown(async {
                        let _ = rx.await;
                    })
                    .await
                    .expect("fake es serve");
            });
        });

        Self {
            addr,
            state,
            shutdown: Some(tx),
            thread: Some(thread),
        }
    }

    pub fn host(&self) -> String {
        format!("127.0.0.1:{}", self.addr.port())
    }

    pub fn state(&self) -> MutexGuard<'_, FakeEsState> {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

impl Drop for FakeEs {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn lock(state: &Shared) -> MutexGuard<'_, FakeEsState> {
    state.lock().unwrap_or_else(|poison| poison.into_inner())
}

fn log(state: &mut FakeEsState, method: &str, path: &str, query: &HashMap<String, String>, headers: &HeaderMap) {
    let mut line = format!("{method} {path}");
    let mut pairs: Vec<_> = query.iter().collect();
    pairs.sort();
    for (i, (name, value)) in pairs.into_iter().enumerate() {
        line.push(if i == 0 { '?' } else { '&' });
        line.push_str(&format!("{name}={value}"));
    }
    state.requests.push(line);
    if let Some(auth) = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    {
        state.authorizations.push(auth.to_string());
    }
}

fn error(status: StatusCode, kind: &str, reason: &str) -> Response {
    (
        status,
        Json(json!({
            "error": {"type": kind, "reason": reason},
            "status": status.as_u16(),
        })),
    )
        .into_response()
}

fn parse_body(body: &Bytes) -> Result<Value, Response> {
    serde_json::from_slice(body)
        .map_err(|err| error(StatusCode::BAD_REQUEST, "parse_exception", &err.to_string()))
}

async fn cluster_health(
    State(state): State<Shared>,
    AxumPath(index): AxumPath<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let mut state = lock(&state);
    log(&mut state, "GET", &format!("/_cluster/health/{index}"), &query, &headers);
    let status = if state.health_timed_out { "red" } else { "green" };
    Json(json!({
        "cluster_name": state.cluster_name,
        "status": status,
        "timed_out": state.health_timed_out,
    }))
    .into_response()
}

async fn index_exists(
    State(state): State<Shared>,
    AxumPath(index): AxumPath<String>,
    headers: HeaderMap,
) -> StatusCode {
    let mut state = lock(&state);
    log(&mut state, "HEAD", &format!("/{index}"), &HashMap::new(), &headers);
    if state.indices.contains_key(&index) {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn create_index(
    State(state): State<Shared>,
    AxumPath(index): AxumPath<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut state = lock(&state);
    log(&mut state, "PUT", &format!("/{index}"), &HashMap::new(), &headers);
    if state.indices.contains_key(&index) {
        return error(
            StatusCode::BAD_REQUEST,
            "resource_already_exists_exception",
            &format!("index [{index}] already exists"),
        );
    }
    let body = match parse_body(&body) {
        Ok(body) => body,
        Err(response) => return response,
    };
    state.indices.insert(
        index.clone(),
        FakeIndex {
            body,
            docs: BTreeMap::new(),
        },
    );
    Json(json!({"acknowledged": true, "index": index})).into_response()
}

async fn delete_index(
    State(state): State<Shared>,
    AxumPath(index): AxumPath<String>,
    headers: HeaderMap,
) -> Response {
    let mut state = lock(&state);
    log(&mut state, "DELETE", &format!("/{index}"), &HashMap::new(), &headers);
    match state.indices.remove(&index) {
        Some(_) => Json(json!({"acknowledged": true})).into_response(),
        None => error(StatusCode::NOT_FOUND, "index_not_found_exception", "no such index"),
    }
}

async fn put_doc(
    State(state): State<Shared>,
    AxumPath((index, id)): AxumPath<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut state = lock(&state);
    log(&mut state, "PUT", &format!("/{index}/_doc/{id}"), &query, &headers);
    let doc = match parse_body(&body) {
        Ok(Value::Object(doc)) => doc,
        Ok(_) => return error(StatusCode::BAD_REQUEST, "parse_exception", "expected object"),
        Err(response) => return response,
    };
    // Real clusters auto-create the index on first write.
    let docs = &mut state.indices.entry(index.clone()).or_default().docs;
    let result = if docs.insert(id.clone(), doc).is_some() {
        "updated"
    } else {
        "created"
    };
    Json(json!({"_index": index, "_id": id, "result": result})).into_response()
}

async fn get_doc(
    State(state): State<Shared>,
    AxumPath((index, id)): AxumPath<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let mut state = lock(&state);
    log(&mut state, "GET", &format!("/{index}/_doc/{id}"), &HashMap::new(), &headers);
    let Some(found) = state.indices.get(&index) else {
        return error(StatusCode::NOT_FOUND, "index_not_found_exception", "no such index");
    };
    match found.docs.get(&id) {
        Some(doc) => Json(json!({"_index": index, "_id": id, "found": true, "_source": doc})).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"_index": index, "_id": id, "found": false})),
        )
            .into_response(),
    }
}

async fn delete_doc(
    State(state): State<Shared>,
    AxumPath((index, id)): AxumPath<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let mut state = lock(&state);
    log(&mut state, "DELETE", &format!("/{index}/_doc/{id}"), &query, &headers);
    let removed = state
        .indices
        .get_mut(&index)
        .and_then(|found| found.docs.remove(&id))
        .is_some();
    if removed {
        Json(json!({"_index": index, "_id": id, "result": "deleted"})).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"_index": index, "_id": id, "result": "not_found"})),
        )
            .into_response()
    }
}

async fn update_doc(
    State(state): State<Shared>,
    AxumPath((index, id)): AxumPath<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut state = lock(&state);
    log(&mut state, "POST", &format!("/{index}/_update/{id}"), &query, &headers);
    let partial = match parse_body(&body) {
        Ok(body) => body.get("doc").and_then(Value::as_object).cloned(),
        Err(response) => return response,
    };
    let Some(partial) = partial else {
        return error(StatusCode::BAD_REQUEST, "action_request_validation_exception", "doc is missing");
    };
    let Some(doc) = state
        .indices
        .get_mut(&index)
        .and_then(|found| found.docs.get_mut(&id))
    else {
        return error(
            StatusCode::NOT_FOUND,
            "document_missing_exception",
            &format!("[{id}]: document missing"),
        );
    };
    doc.extend(partial);
    Json(json!({"_index": index, "_id": id, "result": "updated"})).into_response()
}

async fn search(
    State(state): State<Shared>,
    AxumPath(index): AxumPath<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut state = lock(&state);
    log(&mut state, "POST", &format!("/{index}/_search"), &HashMap::new(), &headers);
    let body = match parse_body(&body) {
        Ok(body) => body,
        Err(response) => return response,
    };
    let size = body.get("size").and_then(Value::as_u64).unwrap_or(10) as usize;
    let Some((field, bounds)) = body
        .pointer("/query/range")
        .and_then(Value::as_object)
        .and_then(|range| range.iter().next())
    else {
        return error(StatusCode::BAD_REQUEST, "parsing_exception", "expected a range query");
    };
    let start = bounds.get("gte").and_then(Value::as_str).unwrap_or_default();
    let Some(found) = state.indices.get(&index) else {
        return error(StatusCode::NOT_FOUND, "index_not_found_exception", "no such index");
    };

    let mut hits: Vec<(&str, &String, &Doc)> = found
        .docs
        .iter()
        .filter_map(|(id, doc)| {
            let sort_key = doc.get(field).and_then(Value::as_str)?;
            (sort_key >= start).then_some((sort_key, id, doc))
        })
        .collect();
    hits.sort_by(|a, b| a.0.cmp(b.0));
    let hits: Vec<Value> = hits
        .into_iter()
        .take(size)
        .map(|(_, id, doc)| json!({"_index": index, "_id": id, "_source": doc}))
        .collect();
    Json(json!({
        "timed_out": false,
        "hits": {"total": {"value": hits.len(), "relation": "eq"}, "hits": hits}
    }))
    .into_response()
}
