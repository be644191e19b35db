//! In-process fake of the store's v2 keys API for integration tests

#![allow(dead_code)]

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use syncrony::{Client, ElectionConfig, RenewWith, StoreConfig};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

type Reply = (StatusCode, Json<Value>);
type Params = HashMap<String, String>;

#[derive(Clone)]
struct Entry {
    value: String,
    created: u64,
    modified: u64,
    lease: Option<(Instant, u64)>,
}

struct Event {
    index: u64,
    key: String,
    body: Value,
}

#[derive(Default)]
struct StoreState {
    index: u64,
    keys: HashMap<String, Entry>,
    history: Vec<Event>,
    stalled_value: Option<String>,
    failing_writes: u64,
    requests: u64,
}

struct Shared {
    state: Mutex<StoreState>,
    changes: watch::Sender<u64>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap()
    }

    fn count_request(&self) {
        self.lock().requests += 1;
    }

    fn take_write_failure(&self) -> bool {
        let mut state = self.lock();
        if state.failing_writes == 0 {
            return false;
        }
        state.failing_writes -= 1;
        true
    }

    fn is_stalled(&self, value: &str) -> bool {
        self.lock().stalled_value.as_deref() == Some(value)
    }

    fn record(&self, mut state: MutexGuard<'_, StoreState>, key: String, body: Value) {
        let index = state.index;
        state.history.push(Event { index, key, body });
        drop(state);
        self.changes.send_replace(index);
    }
}

fn node_json(key: &str, entry: &Entry) -> Value {
    let mut node = json!({
        "key": key,
        "value": entry.value,
        "modifiedIndex": entry.modified,
        "createdIndex": entry.created,
    });
    if let Some((deadline, _)) = entry.lease {
        let remaining = deadline.saturating_duration_since(Instant::now()).as_secs();
        node["ttl"] = json!(remaining.max(1));
    }
    node
}

fn error(status: StatusCode, code: u64, message: &str, cause: &str, index: u64) -> Reply {
    (
        status,
        Json(json!({
            "errorCode": code,
            "message": message,
            "cause": cause,
            "index": index,
        })),
    )
}

/// Which kind of precondition a request carried, once it has passed.
enum Checked {
    Unconditional,
    Exists(bool),
    Compared,
}

fn check(params: &Params, current: Option<&Entry>, key: &str, index: u64) -> Result<Checked, Reply> {
    let not_found = || error(StatusCode::NOT_FOUND, 100, "Key not found", key, index);

    if let Some(prev_exist) = params.get("prevExist") {
        return match (prev_exist.as_str(), current) {
            ("false", Some(_)) => Err(error(
                StatusCode::PRECONDITION_FAILED,
                105,
                "Key already exists",
                key,
                index,
            )),
            ("false", None) => Ok(Checked::Exists(false)),
            ("true", None) => Err(not_found()),
            ("true", Some(_)) => Ok(Checked::Exists(true)),
            _ => Err(error(StatusCode::BAD_REQUEST, 209, "Invalid field", "prevExist", index)),
        };
    }

    let mut checked = Checked::Unconditional;
    if let Some(prev_value) = params.get("prevValue") {
        let current = current.ok_or_else(not_found)?;
        if &current.value != prev_value {
            let cause = format!("[{} != {}]", prev_value, current.value);
            return Err(error(StatusCode::PRECONDITION_FAILED, 101, "Compare failed", &cause, index));
        }
        checked = Checked::Compared;
    }
    if let Some(prev_index) = params.get("prevIndex") {
        let current = current.ok_or_else(not_found)?;
        let Ok(prev_index) = prev_index.parse::<u64>() else {
            return Err(error(
                StatusCode::BAD_REQUEST,
                203,
                "The given index in POST form is not a number",
                "",
                index,
            ));
        };
        if current.modified != prev_index {
            let cause = format!("[{} != {}]", prev_index, current.modified);
            return Err(error(StatusCode::PRECONDITION_FAILED, 101, "Compare failed", &cause, index));
        }
        checked = Checked::Compared;
    }
    Ok(checked)
}

async fn put_key(State(store): State<Arc<Shared>>, Path(key): Path<String>, Query(params): Query<Params>) -> Reply {
    let key = format!("/{}", key);
    store.count_request();

    let Some(value) = params.get("value").cloned() else {
        return error(StatusCode::BAD_REQUEST, 210, "Invalid POST form", "value", 0);
    };
    if store.is_stalled(&value) {
        std::future::pending::<()>().await;
    }
    if store.take_write_failure() {
        return error(StatusCode::INTERNAL_SERVER_ERROR, 300, "Raft Internal Error", "", 0);
    }

    let ttl = match params.get("ttl").map(|t| t.parse::<u64>()) {
        None => None,
        Some(Ok(ttl)) => Some(ttl),
        Some(Err(_)) => {
            return error(StatusCode::BAD_REQUEST, 202, "The given TTL in POST form is not a number", "", 0)
        }
    };

    let mut state = store.lock();
    let current = state.keys.get(&key).cloned();
    let action = match check(&params, current.as_ref(), &key, state.index) {
        Err(reply) => return reply,
        Ok(Checked::Exists(false)) => "create",
        Ok(Checked::Exists(true)) => "update",
        Ok(Checked::Compared) => "compareAndSwap",
        Ok(Checked::Unconditional) => "set",
    };

    state.index += 1;
    let index = state.index;
    let created = match (&current, action) {
        (Some(current), a) if a != "create" => current.created,
        _ => index,
    };
    let entry = Entry {
        value,
        created,
        modified: index,
        lease: ttl.map(|t| (Instant::now() + Duration::from_secs(t), t)),
    };
    state.keys.insert(key.clone(), entry.clone());

    let mut body = json!({ "action": action, "node": node_json(&key, &entry) });
    if let Some(prev) = &current {
        body["prevNode"] = node_json(&key, prev);
    }
    store.record(state, key, body.clone());

    let status = if action == "create" || current.is_none() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    (status, Json(body))
}

async fn delete_key(State(store): State<Arc<Shared>>, Path(key): Path<String>, Query(params): Query<Params>) -> Reply {
    let key = format!("/{}", key);
    store.count_request();

    let mut state = store.lock();
    let current = state.keys.get(&key).cloned();
    let action = match check(&params, current.as_ref(), &key, state.index) {
        Err(reply) => return reply,
        Ok(Checked::Compared) => "compareAndDelete",
        Ok(_) => "delete",
    };
    let Some(current) = current else {
        return error(StatusCode::NOT_FOUND, 100, "Key not found", &key, state.index);
    };

    state.keys.remove(&key);
    state.index += 1;
    let body = json!({
        "action": action,
        "node": { "key": key, "modifiedIndex": state.index, "createdIndex": current.created },
        "prevNode": node_json(&key, &current),
    });
    store.record(state, key, body.clone());
    (StatusCode::OK, Json(body))
}

async fn get_key(State(store): State<Arc<Shared>>, Path(key): Path<String>, Query(params): Query<Params>) -> Reply {
    let key = format!("/{}", key);
    store.count_request();

    if params.get("wait").map(String::as_str) != Some("true") {
        let state = store.lock();
        return match state.keys.get(&key) {
            Some(entry) => (
                StatusCode::OK,
                Json(json!({ "action": "get", "node": node_json(&key, entry) })),
            ),
            None => error(StatusCode::NOT_FOUND, 100, "Key not found", &key, state.index),
        };
    }

    let mut changes = store.changes.subscribe();
    let since = match params.get("waitIndex").map(|i| i.parse::<u64>()) {
        Some(Ok(index)) => index,
        Some(Err(_)) => return error(StatusCode::BAD_REQUEST, 203, "The given index in POST form is not a number", "", 0),
        None => store.lock().index + 1,
    };

    loop {
        {
            let state = store.lock();
            if let Some(event) = state
                .history
                .iter()
                .find(|e| e.index >= since && e.key == key)
            {
                return (StatusCode::OK, Json(event.body.clone()));
            }
        }
        if changes.changed().await.is_err() {
            return error(StatusCode::INTERNAL_SERVER_ERROR, 300, "Raft Internal Error", "", 0);
        }
    }
}

async fn expire_loop(store: Arc<Shared>) {
    loop {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let now = Instant::now();

        let mut state = store.lock();
        let expired: Vec<String> = state
            .keys
            .iter()
            .filter(|(_, e)| e.lease.is_some_and(|(deadline, _)| deadline <= now))
            .map(|(k, _)| k.clone())
            .collect();
        if expired.is_empty() {
            continue;
        }
        for key in expired {
            let Some(old) = state.keys.remove(&key) else {
                continue;
            };
            state.index += 1;
            let index = state.index;
            let body = json!({
                "action": "expire",
                "node": { "key": key, "modifiedIndex": index, "createdIndex": old.created },
                "prevNode": node_json(&key, &old),
            });
            state.history.push(Event { index, key, body });
        }
        let index = state.index;
        drop(state);
        store.changes.send_replace(index);
    }
}

/// A running fake store. Stops when dropped.
pub struct FakeStore {
    pub addr: SocketAddr,
    shared: Arc<Shared>,
    tasks: Vec<JoinHandle<()>>,
}

impl FakeStore {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::serve(listener)
    }

    pub async fn start_on(addr: SocketAddr) -> Self {
        let listener = TcpListener::bind(addr).await.unwrap();
        Self::serve(listener)
    }

    fn serve(listener: TcpListener) -> Self {
        let addr = listener.local_addr().unwrap();
        let (changes, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            state: Mutex::new(StoreState {
                index: 1,
                ..Default::default()
            }),
            changes,
        });

        let app = Router::new()
            .route("/v2/keys/*key", get(get_key).put(put_key).delete(delete_key))
            .with_state(shared.clone());
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let sweeper = tokio::spawn(expire_loop(shared.clone()));

        Self {
            addr,
            shared,
            tasks: vec![server, sweeper],
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn value(&self, path: &str) -> Option<String> {
        let key = format!("/{}", path.trim_start_matches('/'));
        self.shared.lock().keys.get(&key).map(|e| e.value.clone())
    }

    pub fn modified_index(&self, path: &str) -> Option<u64> {
        let key = format!("/{}", path.trim_start_matches('/'));
        self.shared.lock().keys.get(&key).map(|e| e.modified)
    }

    /// Delete a key behind the participants' backs.
    pub fn remove(&self, path: &str) {
        let key = format!("/{}", path.trim_start_matches('/'));
        let mut state = self.shared.lock();
        let Some(old) = state.keys.remove(&key) else {
            return;
        };
        state.index += 1;
        let body = json!({
            "action": "delete",
            "node": { "key": key, "modifiedIndex": state.index, "createdIndex": old.created },
            "prevNode": node_json(&key, &old),
        });
        self.shared.record(state, key, body);
    }

    /// Hang every write of `value` forever, as if its writer were stuck.
    pub fn stall_writes_of(&self, value: &str) {
        self.shared.lock().stalled_value = Some(value.to_string());
    }

    /// Answer the next `count` writes with an internal error instead of applying them.
    pub fn fail_writes(&self, count: u64) {
        self.shared.lock().failing_writes = count;
    }

    pub fn requests(&self) -> u64 {
        self.shared.lock().requests
    }
}

impl Drop for FakeStore {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// An endpoint nothing listens on.
pub async fn dead_endpoint() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// An endpoint that answers every request with a plain-text 500.
pub async fn broken_endpoint() -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let app = Router::new().fallback(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") });
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (url, handle)
}

/// Client with a short retry pause.
pub fn client(endpoints: &[String]) -> Client {
    let mut config = StoreConfig::with_endpoints(endpoints.iter().cloned());
    config.retry_interval_ms = 100;
    Client::new(&config).unwrap()
}

pub fn election_config(path: &str, identifier: &str) -> ElectionConfig {
    ElectionConfig {
        path: path.to_string(),
        ttl_secs: 2,
        interval_ms: 400,
        identifier: Some(identifier.to_string()),
        renew_with: RenewWith::Value,
    }
}

/// Poll `condition` every 10ms until it holds or `timeout` passes.
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
