//! Remote realtime store collaborators.
//!
//! The store is addressed by slash-separated paths (`tickets/{id}`,
//! `settings/teacherPassword`). Subscriptions always deliver the full value
//! below the subscribed path, never a diff.

mod firebase;
mod memory;

use serde_json::Value;
use std::sync::Arc;

use crate::config::RemoteConfig;

pub use firebase::FirebaseRemote;
pub use memory::MemoryRemote;

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid database url: {0}")]
    InvalidUrl(String),

    #[error("stream: {0}")]
    Stream(String),

    #[error("rejected: {0}")]
    Rejected(String),
}

/// Receives every snapshot (or error) of one subscription, from any thread.
pub type SnapshotSink = Box<dyn Fn(Result<Value, RemoteError>) + Send + 'static>;

/// Keeps a subscription alive; dropping it unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

pub trait RemoteStore: Send + Sync {
    /// Reads the value at `path` once; missing paths read as `null`.
    fn get(&self, path: &str) -> Result<Value, RemoteError>;

    /// Replaces the value at `path`.
    fn set(&self, path: &str, value: &Value) -> Result<(), RemoteError>;

    fn remove(&self, path: &str) -> Result<(), RemoteError>;

    /// Delivers the current value and then one full snapshot per change.
    fn subscribe(&self, path: &str, sink: SnapshotSink) -> Result<Subscription, RemoteError>;
}

/// Builds the configured remote client, or `None` when the app should run on
/// local persistence only.
pub fn connect(cfg: &RemoteConfig) -> Option<Arc<dyn RemoteStore>> {
    if !cfg.is_configured() {
        log::info!("Remote store not configured; using local persistence");
        return None;
    }
    match FirebaseRemote::connect(cfg) {
        Ok(remote) => {
            log::info!("Using remote store at {}", remote.base_url());
            Some(Arc::new(remote))
        }
        Err(e) => {
            log::warn!("Remote store unavailable, falling back to local persistence: {e}");
            None
        }
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Value below `path` in `root`, `null` when absent.
pub(crate) fn value_at(root: &Value, path: &str) -> Value {
    let mut cur = root;
    for seg in split_path(path) {
        match cur.get(seg) {
            Some(v) => cur = v,
            None => return Value::Null,
        }
    }
    cur.clone()
}

/// Writes `value` below `path`, creating parents; `null` removes the key and
/// prunes parents left empty.
pub(crate) fn write_at(root: &mut Value, path: &str, value: Value) {
    let segs = split_path(path);
    if segs.is_empty() {
        *root = value;
        return;
    }
    write_segments(root, &segs, value);
}

fn write_segments(node: &mut Value, segs: &[&str], value: Value) {
    if !node.is_object() {
        if value.is_null() {
            return;
        }
        *node = Value::Object(serde_json::Map::new());
    }
    let Some(obj) = node.as_object_mut() else {
        return;
    };
    let (head, rest) = (segs[0], &segs[1..]);
    if rest.is_empty() {
        if value.is_null() {
            obj.remove(head);
        } else {
            obj.insert(head.to_string(), value);
        }
        return;
    }
    let child = obj.entry(head.to_string()).or_insert(Value::Null);
    write_segments(child, rest, value);
    if child.is_null() || child.as_object().is_some_and(|o| o.is_empty()) {
        obj.remove(head);
    }
}
