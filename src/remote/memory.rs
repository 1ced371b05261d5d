use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use super::{split_path, value_at, write_at, RemoteError, RemoteStore, SnapshotSink, Subscription};

struct Subscriber {
    id: u64,
    path: String,
    sink: SnapshotSink,
}

#[derive(Default)]
struct Inner {
    root: Value,
    subscribers: Vec<Subscriber>,
    next_id: u64,
    fail_writes: Option<String>,
    fail_reads: Option<String>,
}

/// In-process realtime store. Clones share the same tree, so several
/// `SyncStore`s built on clones behave like devices on one database.
#[derive(Clone, Default)]
pub struct MemoryRemote {
    inner: Arc<Mutex<Inner>>,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

fn related(a: &str, b: &str) -> bool {
    let (a, b) = (split_path(a), split_path(b));
    let n = a.len().min(b.len());
    a[..n] == b[..n]
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following set/remove fail with `message` (`None` heals).
    pub fn fail_writes(&self, message: Option<&str>) {
        lock(&self.inner).fail_writes = message.map(str::to_string);
    }

    /// Makes every following one-shot read fail with `message` (`None` heals).
    pub fn fail_reads(&self, message: Option<&str>) {
        lock(&self.inner).fail_reads = message.map(str::to_string);
    }

    /// Delivers a stream error to the subscribers of `path`.
    pub fn emit_error(&self, path: &str, message: &str) {
        let inner = lock(&self.inner);
        for sub in inner.subscribers.iter().filter(|s| s.path == path) {
            (sub.sink)(Err(RemoteError::Stream(message.to_string())));
        }
    }

    pub fn snapshot(&self, path: &str) -> Value {
        value_at(&lock(&self.inner).root, path)
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner).subscribers.len()
    }

    fn write(&self, path: &str, value: Value) -> Result<(), RemoteError> {
        let mut inner = lock(&self.inner);
        if let Some(msg) = &inner.fail_writes {
            return Err(RemoteError::Rejected(msg.clone()));
        }
        write_at(&mut inner.root, path, value);
        let inner = &*inner;
        for sub in inner.subscribers.iter().filter(|s| related(&s.path, path)) {
            (sub.sink)(Ok(value_at(&inner.root, &sub.path)));
        }
        Ok(())
    }
}

impl RemoteStore for MemoryRemote {
    fn get(&self, path: &str) -> Result<Value, RemoteError> {
        let inner = lock(&self.inner);
        if let Some(msg) = &inner.fail_reads {
            return Err(RemoteError::Rejected(msg.clone()));
        }
        Ok(value_at(&inner.root, path))
    }

    fn set(&self, path: &str, value: &Value) -> Result<(), RemoteError> {
        self.write(path, value.clone())
    }

    fn remove(&self, path: &str) -> Result<(), RemoteError> {
        self.write(path, Value::Null)
    }

    fn subscribe(&self, path: &str, sink: SnapshotSink) -> Result<Subscription, RemoteError> {
        let mut inner = lock(&self.inner);
        sink(Ok(value_at(&inner.root, path)));
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push(Subscriber {
            id,
            path: path.to_string(),
            sink,
        });

        let weak: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        Ok(Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                lock(&inner).subscribers.retain(|s| s.id != id);
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::mpsc;

    #[test]
    fn subscribers_get_full_snapshots_until_dropped() {
        let remote = MemoryRemote::new();
        let (tx, rx) = mpsc::channel();
        let sub = remote
            .subscribe(
                "tickets",
                Box::new(move |v| {
                    let _ = tx.send(v.map_err(|e| e.to_string()));
                }),
            )
            .expect("subscribe");
        assert_eq!(rx.try_recv().expect("initial"), Ok(Value::Null));

        remote.set("tickets/a", &json!({"id": "a"})).expect("set a");
        remote.set("students/x", &json!({"id": "x"})).expect("set x");
        remote.set("tickets/b", &json!({"id": "b"})).expect("set b");
        assert_eq!(rx.try_recv().expect("a"), Ok(json!({"a": {"id": "a"}})));
        assert_eq!(
            rx.try_recv().expect("b"),
            Ok(json!({"a": {"id": "a"}, "b": {"id": "b"}}))
        );
        assert!(rx.try_recv().is_err());

        drop(sub);
        assert_eq!(remote.subscriber_count(), 0);
        remote.remove("tickets").expect("remove");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn failing_writes_leave_tree_untouched() {
        let remote = MemoryRemote::new();
        remote.fail_writes(Some("permission denied"));
        assert!(remote.set("tickets/a", &json!({"id": "a"})).is_err());
        assert_eq!(remote.snapshot("tickets"), Value::Null);
    }
}
