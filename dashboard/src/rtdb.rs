//! Read-only client for the real-time database's streaming REST API.
//!
//! A subscription keeps a local copy of the subtree at its path, applies the
//! `put` and `patch` events the server streams, and hands out the whole
//! document every time its value changes.

use crate::errors::{Error, Result};
use crate::metrics::STREAM_RECONNECTS_TOTAL;
use crate::sse::{SseDecoder, SseEvent};
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::cmp::min;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Whole document at a subscribed path. A `null` value means the document
/// does not exist.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSnapshot {
    path: String,
    value: Value,
}

impl DataSnapshot {
    pub fn new(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            value,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn exists(&self) -> bool {
        !self.value.is_null()
    }

    pub fn val(&self) -> &Value {
        &self.value
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.value.clone())?)
    }
}

/// What a subscription delivers to its owner.
#[derive(Debug)]
pub enum ValueEvent {
    Value(DataSnapshot),
    /// The server ended the subscription. Nothing follows this event.
    Cancelled(Error),
}

/// Local copy of a subscribed subtree.
#[derive(Debug, Default)]
pub struct DataTree {
    root: Value,
}

impl DataTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> &Value {
        &self.root
    }

    /// Replaces the node at `path`. Returns true if the tree changed.
    pub fn put(&mut self, path: &str, data: Value) -> bool {
        let before = self.root.clone();
        set_node(&mut self.root, &segments(path), data);
        self.root != before
    }

    /// Replaces each listed child of the node at `path`. Returns true if the
    /// tree changed.
    pub fn patch(&mut self, path: &str, data: Value) -> bool {
        let Value::Object(children) = data else {
            return self.put(path, data);
        };

        let before = self.root.clone();
        let base = segments(path);
        for (key, value) in children {
            let mut target = base.clone();
            target.extend(segments(&key));
            set_node(&mut self.root, &target, value);
        }
        self.root != before
    }
}

fn segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn set_node(node: &mut Value, segments: &[String], data: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *node = normalize(data);
        return;
    };

    if !node.is_object() {
        if data.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }

    let mut emptied = false;
    if let Value::Object(children) = node {
        let child = children.entry(first.clone()).or_insert(Value::Null);
        set_node(child, rest, data);
        if child.is_null() {
            children.remove(first);
        }
        emptied = children.is_empty();
    }
    if emptied {
        *node = Value::Null;
    }
}

/// Drops null children and collapses empty objects, as the store does.
fn normalize(value: Value) -> Value {
    match value {
        Value::Object(children) => {
            let children: Map<String, Value> = children
                .into_iter()
                .map(|(key, child)| (key, normalize(child)))
                .filter(|(_, child)| !child.is_null())
                .collect();
            if children.is_empty() {
                Value::Null
            } else {
                Value::Object(children)
            }
        }
        other => other,
    }
}

#[derive(Debug, Deserialize)]
struct StreamPayload {
    path: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Clone)]
pub struct StoreClient {
    http: reqwest::Client,
    database_url: String,
    auth_token: Option<String>,
}

impl StoreClient {
    pub fn new(database_url: &str, auth_token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            database_url: database_url.trim_end_matches('/').to_string(),
            auth_token,
        })
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}.json", self.database_url, path.trim_matches('/'))
    }

    /// Opens a live subscription on `path`. Events go to `tx` until the
    /// returned guard is dropped or unsubscribed.
    pub fn on_value(&self, path: &str, tx: mpsc::Sender<ValueEvent>) -> Subscription {
        let cancel = CancellationToken::new();
        let stream = ValueStream {
            client: self.clone(),
            path: path.to_string(),
            tx,
            tree: DataTree::new(),
            delivered: false,
        };

        let handle = tokio::spawn(stream.run(cancel.clone()));
        debug!("Subscribed to {}", path);

        Subscription {
            path: path.to_string(),
            cancel,
            handle: Some(handle),
        }
    }
}

/// Guard for a live subscription. Dropping it releases the subscription.
#[derive(Debug)]
pub struct Subscription {
    path: String,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Releases the subscription and waits for its task to stop.
    pub async fn unsubscribe(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        debug!("Unsubscribed from {}", self.path);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum StreamEnd {
    Closed,
    Failed(Error),
    Terminal(Error),
    ReceiverGone,
}

struct ValueStream {
    client: StoreClient,
    path: String,
    tx: mpsc::Sender<ValueEvent>,
    tree: DataTree,
    delivered: bool,
}

impl ValueStream {
    async fn run(mut self, cancel: CancellationToken) {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            let outcome = tokio::select! {
                outcome = self.stream_once(&mut backoff) => outcome,
                _ = cancel.cancelled() => return,
            };

            match outcome {
                StreamEnd::Terminal(e) => {
                    error!("Subscription to {} ended: {}", self.path, e);
                    let _ = self.tx.send(ValueEvent::Cancelled(e)).await;
                    return;
                }
                StreamEnd::ReceiverGone => {
                    debug!("Receiver for {} dropped, stopping stream", self.path);
                    return;
                }
                StreamEnd::Closed => {
                    warn!("Stream for {} closed, reconnecting in {:?}", self.path, backoff);
                }
                StreamEnd::Failed(e) => {
                    warn!(
                        "Stream for {} failed: {}. Reconnecting in {:?}",
                        self.path, e, backoff
                    );
                }
            }

            STREAM_RECONNECTS_TOTAL.inc();
            let sleep_for = backoff;
            backoff = min(backoff.saturating_mul(2), MAX_BACKOFF);

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = cancel.cancelled() => return,
            }
        }
    }

    async fn stream_once(&mut self, backoff: &mut Duration) -> StreamEnd {
        let url = self.client.url_for(&self.path);
        let mut request = self
            .client
            .http
            .get(&url)
            .header(ACCEPT, "text/event-stream");
        if let Some(token) = &self.client.auth_token {
            request = request.query(&[("auth", token)]);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return StreamEnd::Failed(e.into()),
        };

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return StreamEnd::Terminal(Error::PermissionDenied(self.path.clone()));
        }
        if status.is_client_error() {
            return StreamEnd::Terminal(Error::Stream(format!("{} returned {}", url, status)));
        }
        if !status.is_success() {
            return StreamEnd::Failed(Error::Stream(format!("{} returned {}", url, status)));
        }

        info!("Streaming {}", self.path);
        *backoff = INITIAL_BACKOFF;

        let mut decoder = SseDecoder::new();
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => return StreamEnd::Failed(e.into()),
            };

            for event in decoder.feed(&chunk) {
                if let Some(end) = self.handle_event(event).await {
                    return end;
                }
            }
        }

        StreamEnd::Closed
    }

    async fn handle_event(&mut self, event: SseEvent) -> Option<StreamEnd> {
        match event.event.as_str() {
            "put" | "patch" => {
                let payload: StreamPayload = match serde_json::from_str(&event.data) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("Ignoring malformed {} event on {}: {}", event.event, self.path, e);
                        return None;
                    }
                };

                let changed = if event.event == "put" {
                    self.tree.put(&payload.path, payload.data)
                } else {
                    self.tree.patch(&payload.path, payload.data)
                };

                if !changed && self.delivered {
                    debug!("{} event on {} left value unchanged", event.event, self.path);
                    return None;
                }
                self.delivered = true;

                let snapshot = DataSnapshot::new(self.path.clone(), self.tree.value().clone());
                if self.tx.send(ValueEvent::Value(snapshot)).await.is_err() {
                    return Some(StreamEnd::ReceiverGone);
                }
                None
            }
            "keep-alive" => {
                debug!("Keep-alive on {}", self.path);
                None
            }
            "cancel" => {
                let reason = serde_json::from_str::<String>(&event.data).unwrap_or(event.data);
                Some(StreamEnd::Terminal(Error::Cancelled(reason)))
            }
            "auth_revoked" => Some(StreamEnd::Terminal(Error::AuthRevoked)),
            other => {
                debug!("Ignoring {} event on {}", other, self.path);
                None
            }
        }
    }
}
