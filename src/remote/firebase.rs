//! Firebase Realtime Database over its REST interface.
//!
//! One-shot reads and writes are plain blocking requests against
//! `{databaseUrl}/{path}.json`. Subscriptions use the streaming variant of the
//! same endpoint (server-sent events): the worker thread keeps a copy of the
//! subscribed subtree, applies every `put`/`patch` to it and hands the whole
//! subtree to the sink, so callers always see a full snapshot.

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::ACCEPT;
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use std::io::{BufRead, BufReader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{write_at, RemoteError, RemoteStore, SnapshotSink, Subscription};
use crate::config::RemoteConfig;

const MAX_BACKOFF_SECS: u64 = 30;

pub struct FirebaseRemote {
    base: String,
    auth: String,
    client: Client,
}

#[derive(Clone)]
struct Endpoint {
    client: Client,
    url: String,
    auth: String,
}

impl Endpoint {
    fn request(&self, method: Method) -> RequestBuilder {
        let rb = self.client.request(method, &self.url);
        if self.auth.is_empty() {
            rb
        } else {
            rb.query(&[("auth", self.auth.as_str())])
        }
    }
}

impl FirebaseRemote {
    pub fn connect(cfg: &RemoteConfig) -> Result<Self, RemoteError> {
        let base = cfg.database_url.trim().trim_end_matches('/').to_string();
        reqwest::Url::parse(&base).map_err(|e| RemoteError::InvalidUrl(format!("{base}: {e}")))?;
        // No request timeout: writes run to completion or transport failure.
        let client = Client::builder().timeout(None::<Duration>).build()?;
        Ok(Self {
            base,
            auth: cfg.auth_token.trim().to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Endpoint {
        Endpoint {
            client: self.client.clone(),
            url: format!("{}/{}.json", self.base, path.trim_matches('/')),
            auth: self.auth.clone(),
        }
    }
}

impl RemoteStore for FirebaseRemote {
    fn get(&self, path: &str) -> Result<Value, RemoteError> {
        let value = self
            .endpoint(path)
            .request(Method::GET)
            .send()?
            .error_for_status()?
            .json::<Value>()?;
        Ok(value)
    }

    fn set(&self, path: &str, value: &Value) -> Result<(), RemoteError> {
        self.endpoint(path)
            .request(Method::PUT)
            .json(value)
            .send()?
            .error_for_status()?;
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<(), RemoteError> {
        self.endpoint(path)
            .request(Method::DELETE)
            .send()?
            .error_for_status()?;
        Ok(())
    }

    fn subscribe(&self, path: &str, sink: SnapshotSink) -> Result<Subscription, RemoteError> {
        let endpoint = self.endpoint(path);
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);
        let label = path.to_string();
        std::thread::Builder::new()
            .name(format!("remote-{}", label.replace('/', "-")))
            .spawn(move || stream_worker(&label, &endpoint, &sink, &worker_stop))
            .map_err(|e| RemoteError::Stream(format!("failed to start stream: {e}")))?;
        Ok(Subscription::new(move || stop.store(true, Ordering::Relaxed)))
    }
}

#[derive(Deserialize)]
struct StreamMessage {
    path: String,
    data: Value,
}

fn stream_worker(label: &str, endpoint: &Endpoint, sink: &SnapshotSink, stop: &AtomicBool) {
    let mut attempt: u32 = 0;
    while !stop.load(Ordering::Relaxed) {
        match read_stream(endpoint, sink, stop, &mut attempt) {
            Ok(()) => break,
            Err(e) => {
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                log::error!("Subscription {label} failed: {e}");
                sink(Err(e));
            }
        }
        let backoff = 1u64 << attempt.min(5);
        attempt = attempt.saturating_add(1);
        std::thread::sleep(Duration::from_secs(backoff.min(MAX_BACKOFF_SECS)));
    }
    log::debug!("Subscription {label} closed");
}

/// Reads one stream connection until it ends. `Ok` only when stopped.
fn read_stream(
    endpoint: &Endpoint,
    sink: &SnapshotSink,
    stop: &AtomicBool,
    attempt: &mut u32,
) -> Result<(), RemoteError> {
    let resp = endpoint
        .request(Method::GET)
        .header(ACCEPT, "text/event-stream")
        .send()?
        .error_for_status()?;
    *attempt = 0;

    let mut tree = Value::Null;
    let mut event = String::new();
    let mut data = String::new();
    for line in BufReader::new(resp).lines() {
        if stop.load(Ordering::Relaxed) {
            return Ok(());
        }
        let line = line.map_err(|e| RemoteError::Stream(e.to_string()))?;
        if line.is_empty() {
            dispatch(&event, &data, &mut tree, sink)?;
            event.clear();
            data.clear();
        } else if let Some(v) = line.strip_prefix("event:") {
            event = v.trim().to_string();
        } else if let Some(v) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(v.trim_start());
        }
    }
    if stop.load(Ordering::Relaxed) {
        return Ok(());
    }
    Err(RemoteError::Stream("stream closed by server".into()))
}

fn dispatch(
    event: &str,
    data: &str,
    tree: &mut Value,
    sink: &SnapshotSink,
) -> Result<(), RemoteError> {
    match event {
        "put" | "patch" => {
            let msg: StreamMessage = serde_json::from_str(data)
                .map_err(|e| RemoteError::Stream(format!("bad {event} payload: {e}")))?;
            if event == "put" {
                write_at(tree, &msg.path, msg.data);
            } else if let Value::Object(fields) = msg.data {
                let base = msg.path.trim_end_matches('/');
                for (k, v) in fields {
                    write_at(tree, &format!("{base}/{k}"), v);
                }
            }
            sink(Ok(tree.clone()));
            Ok(())
        }
        "cancel" => Err(RemoteError::Rejected(format!("stream cancelled: {data}"))),
        "auth_revoked" => Err(RemoteError::Rejected("auth token revoked".into())),
        "keep-alive" | "" => Ok(()),
        other => {
            log::debug!("Ignoring stream event {other}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::mpsc;

    fn capture() -> (SnapshotSink, mpsc::Receiver<Value>) {
        let (tx, rx) = mpsc::channel();
        let sink: SnapshotSink = Box::new(move |v| {
            if let Ok(v) = v {
                let _ = tx.send(v);
            }
        });
        (sink, rx)
    }

    #[test]
    fn put_and_patch_rebuild_the_full_subtree() {
        let (sink, rx) = capture();
        let mut tree = Value::Null;
        dispatch(
            "put",
            r#"{"path":"/","data":{"t1":{"id":"t1","status":"submitted"}}}"#,
            &mut tree,
            &sink,
        )
        .expect("put root");
        dispatch(
            "patch",
            r#"{"path":"/t1","data":{"status":"done"}}"#,
            &mut tree,
            &sink,
        )
        .expect("patch");
        dispatch("put", r#"{"path":"/t2","data":{"id":"t2"}}"#, &mut tree, &sink)
            .expect("put child");
        dispatch("keep-alive", "null", &mut tree, &sink).expect("keep-alive");

        let snapshots: Vec<Value> = rx.try_iter().collect();
        assert_eq!(snapshots.len(), 3);
        assert_eq!(
            snapshots[2],
            json!({"t1": {"id": "t1", "status": "done"}, "t2": {"id": "t2"}})
        );

        dispatch("put", r#"{"path":"/t1","data":null}"#, &mut tree, &sink).expect("delete");
        assert_eq!(rx.try_recv().expect("after delete"), json!({"t2": {"id": "t2"}}));
    }

    #[test]
    fn cancel_is_an_error() {
        let (sink, _rx) = capture();
        let mut tree = Value::Null;
        assert!(dispatch("cancel", "permission denied", &mut tree, &sink).is_err());
    }
}
