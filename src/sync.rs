//! The cache that every read is served from and every write goes through.
//!
//! With a remote store, writes go to the remote and, once accepted, into the
//! cache; every subscription event then replaces the whole collection.
//! Without one, writes persist the whole collection locally and then update
//! the cache.

use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::db::LocalStore;
use crate::error::{Error, Result};
use crate::model::{now_millis, Collection, Collections, Record, Student, Ticket};
use crate::remote::{RemoteError, RemoteStore, SnapshotSink, Subscription};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Unconfigured,
    Loading,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Mode {
    Local,
    Remote,
}

/// Something the store's owner must react to after handling an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// The first authoritative load finished; parked callers may proceed.
    Ready,
    /// Remote data changed while ready; views showing it should re-render.
    Refresh(Collection),
}

#[derive(Debug)]
pub struct StoreEvent {
    generation: u64,
    kind: EventKind,
}

#[derive(Debug)]
enum EventKind {
    Snapshot {
        collection: Collection,
        value: Value,
    },
    SubscriptionFailed {
        collection: Collection,
        message: String,
    },
    InitialLoad(std::result::Result<InitialData, String>),
}

#[derive(Debug)]
struct InitialData {
    tickets: Value,
    students: Value,
    teacher_password: Value,
}

/// Where remote threads deliver their events; the owning thread feeds them
/// back into [`SyncStore::handle_event`] in arrival order.
pub type EventSink = Arc<dyn Fn(StoreEvent) + Send + Sync>;

pub fn event_channel() -> (EventSink, Receiver<StoreEvent>) {
    let (tx, rx) = mpsc::channel();
    let sink: EventSink = Arc::new(move |ev| {
        let _ = tx.send(ev);
    });
    (sink, rx)
}

const SYNCED: [Collection; 3] = [
    Collection::Tickets,
    Collection::Students,
    Collection::TeacherPassword,
];

pub struct SyncStore {
    generation: u64,
    phase: Phase,
    local: LocalStore,
    remote: Option<Arc<dyn RemoteStore>>,
    subscriptions: Vec<Subscription>,
    data: Collections,
    teacher_password: Option<String>,
    default_teacher_password: String,
    /// Collections a subscription already delivered while loading; the
    /// initial fetch may be older than those snapshots.
    streamed: Vec<Collection>,
}

fn snapshot_sink(generation: u64, collection: Collection, sink: &EventSink) -> SnapshotSink {
    let sink = Arc::clone(sink);
    Box::new(move |res| {
        let kind = match res {
            Ok(value) => EventKind::Snapshot { collection, value },
            Err(e) => EventKind::SubscriptionFailed {
                collection,
                message: e.to_string(),
            },
        };
        sink(StoreEvent { generation, kind });
    })
}

fn fetch_initial(remote: &dyn RemoteStore) -> std::result::Result<InitialData, RemoteError> {
    Ok(InitialData {
        tickets: remote.get(Collection::Tickets.path())?,
        students: remote.get(Collection::Students.path())?,
        teacher_password: remote.get(Collection::TeacherPassword.path())?,
    })
}

fn remote_failure(action: &str, path: &str, e: RemoteError) -> Error {
    log::error!("Remote {action} of {path} failed: {e}");
    Error::RemoteWrite(e.to_string())
}

/// Records below a collection snapshot, in creation order. Entries that do
/// not parse are skipped.
fn records_from_snapshot<T: Record>(value: Value) -> Vec<T> {
    let entries: Vec<Value> = match value {
        Value::Null => Vec::new(),
        Value::Object(map) => map
            .into_iter()
            .map(|(key, mut v)| {
                if let Some(obj) = v.as_object_mut() {
                    obj.entry("id").or_insert(Value::String(key));
                }
                v
            })
            .collect(),
        Value::Array(items) => items.into_iter().filter(|v| !v.is_null()).collect(),
        other => {
            log::warn!("Ignoring non-collection {} snapshot: {other}", T::COLLECTION);
            Vec::new()
        }
    };
    let mut records: Vec<T> = entries
        .into_iter()
        .filter_map(|v| {
            serde_json::from_value(v)
                .inspect_err(|e| log::warn!("Skipping malformed {} record: {e}", T::COLLECTION))
                .ok()
        })
        .collect();
    records.sort_by_key(|r| r.created_at());
    records
}

/// Shallow-merges `patch` over `existing` and stamps the timestamps.
fn merge_record<T: Record>(
    existing: Option<&T>,
    id: &str,
    patch: Map<String, Value>,
    now: i64,
) -> Result<T> {
    let mut obj = match existing.map(serde_json::to_value).transpose()? {
        Some(Value::Object(obj)) => obj,
        _ => Map::new(),
    };
    for (k, v) in patch {
        obj.insert(k, v);
    }
    obj.insert("id".into(), Value::String(id.to_string()));
    let created_at = existing.map_or(now, |r| r.created_at());
    obj.insert("createdAt".into(), created_at.into());
    obj.insert("updatedAt".into(), now.into());

    let mut record: T = serde_json::from_value(Value::Object(obj))
        .map_err(|e| Error::Validation(format!("invalid {} record: {e}", T::COLLECTION)))?;
    record.apply_merge_rules(existing, now)?;
    Ok(record)
}

impl SyncStore {
    /// Opens the store. Without a usable remote the local collections are
    /// loaded and the store is ready on return; otherwise it stays `Loading`
    /// until the initial fetch arrives through `sink`.
    pub fn open(
        local: LocalStore,
        remote: Option<Arc<dyn RemoteStore>>,
        default_teacher_password: impl Into<String>,
        sink: EventSink,
    ) -> Self {
        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        let mut store = Self {
            generation,
            phase: Phase::Unconfigured,
            local,
            remote: None,
            subscriptions: Vec::new(),
            data: Collections::default(),
            teacher_password: None,
            default_teacher_password: default_teacher_password.into(),
            streamed: Vec::new(),
        };

        let Some(remote) = remote else {
            store.load_local();
            store.enter_ready();
            return store;
        };

        for collection in SYNCED {
            let sub_sink = snapshot_sink(generation, collection, &sink);
            match remote.subscribe(collection.path(), sub_sink) {
                Ok(sub) => store.subscriptions.push(sub),
                Err(e) => {
                    log::warn!("Subscribing to {collection} failed, using local persistence: {e}");
                    store.subscriptions.clear();
                    store.load_local();
                    store.enter_ready();
                    return store;
                }
            }
        }

        store.remote = Some(Arc::clone(&remote));
        store.phase = Phase::Loading;
        log::info!("Store loading from remote");

        let spawned = std::thread::Builder::new()
            .name("remote-initial-load".into())
            .spawn(move || {
                let result = fetch_initial(remote.as_ref()).map_err(|e| e.to_string());
                sink(StoreEvent {
                    generation,
                    kind: EventKind::InitialLoad(result),
                });
            });
        if let Err(e) = spawned {
            log::warn!("Could not start initial load, using local persistence: {e}");
            store.load_local();
            store.enter_ready();
        }
        store
    }

    fn load_local(&mut self) {
        self.data.tickets = self.local.load_collection(Collection::Tickets.local_key());
        self.data.students = self.local.load_collection(Collection::Students.local_key());
        self.teacher_password = self
            .local
            .load_json::<String>(Collection::TeacherPassword.local_key())
            .filter(|p| !p.is_empty());
        log::info!(
            "Loaded {} tickets and {} students from local persistence",
            self.data.tickets.len(),
            self.data.students.len()
        );
    }

    /// Returns true on the first transition only.
    fn enter_ready(&mut self) -> bool {
        if self.phase == Phase::Ready {
            return false;
        }
        self.phase = Phase::Ready;
        log::info!("Store ready ({:?} mode)", self.mode());
        true
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Ready
    }

    pub fn mode(&self) -> Mode {
        if self.remote.is_some() {
            Mode::Remote
        } else {
            Mode::Local
        }
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    pub fn tickets(&self) -> &[Ticket] {
        &self.data.tickets
    }

    pub fn students(&self) -> &[Student] {
        &self.data.students
    }

    pub fn records<T: Record>(&self) -> &[T] {
        T::slot(&self.data)
    }

    pub fn get<T: Record>(&self, id: &str) -> Option<&T> {
        T::slot(&self.data).iter().find(|r| r.id() == id)
    }

    pub fn ticket(&self, id: &str) -> Option<&Ticket> {
        self.get(id)
    }

    pub fn student(&self, id: &str) -> Option<&Student> {
        self.get(id)
    }

    pub fn teacher_password(&self) -> &str {
        self.teacher_password
            .as_deref()
            .unwrap_or(&self.default_teacher_password)
    }

    /// Applies one event from a remote thread. Events of a previously opened
    /// store are ignored.
    pub fn handle_event(&mut self, event: StoreEvent) -> Vec<Notice> {
        if event.generation != self.generation {
            log::debug!("Dropping event from store generation {}", event.generation);
            return Vec::new();
        }
        let mut notices = Vec::new();
        match event.kind {
            EventKind::Snapshot { collection, value } => {
                // Local data is only overwritten once the remote proved readable.
                let ready = self.is_ready();
                self.apply_snapshot(collection, value, ready);
                if ready {
                    notices.push(Notice::Refresh(collection));
                } else if !self.streamed.contains(&collection) {
                    self.streamed.push(collection);
                }
            }
            EventKind::SubscriptionFailed {
                collection,
                message,
            } => {
                log::error!(
                    "Subscription to {collection} failed, keeping last snapshot: {message}"
                );
            }
            EventKind::InitialLoad(Ok(data)) => {
                let fetched = [
                    (Collection::Tickets, data.tickets),
                    (Collection::Students, data.students),
                    (Collection::TeacherPassword, data.teacher_password),
                ];
                for (collection, value) in fetched {
                    if self.streamed.contains(&collection) {
                        self.mirror(collection);
                    } else {
                        self.apply_snapshot(collection, value, true);
                    }
                }
                self.streamed.clear();
                if self.enter_ready() {
                    notices.push(Notice::Ready);
                }
            }
            EventKind::InitialLoad(Err(message)) => {
                log::warn!("Initial remote load failed, using local persistence: {message}");
                self.streamed.clear();
                self.load_local();
                if self.enter_ready() {
                    notices.push(Notice::Ready);
                }
            }
        }
        notices
    }

    /// Handles every event already queued on `rx`.
    pub fn pump(&mut self, rx: &Receiver<StoreEvent>) -> Vec<Notice> {
        let mut notices = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            notices.extend(self.handle_event(ev));
        }
        notices
    }

    /// Handles events until the store is ready or `timeout` passes.
    pub fn wait_ready(&mut self, rx: &Receiver<StoreEvent>, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_ready() {
            let left = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(left) {
                Ok(ev) => {
                    self.handle_event(ev);
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
            }
        }
        self.is_ready()
    }

    fn apply_snapshot(&mut self, collection: Collection, value: Value, mirror: bool) {
        match collection {
            Collection::Tickets => self.data.tickets = records_from_snapshot(value),
            Collection::Students => self.data.students = records_from_snapshot(value),
            Collection::TeacherPassword => {
                self.teacher_password = value
                    .as_str()
                    .filter(|p| !p.is_empty())
                    .map(str::to_string);
            }
        }
        if mirror {
            self.mirror(collection);
        }
    }

    /// Keeps the local copy in step with the last remote snapshot.
    fn mirror(&self, collection: Collection) {
        match collection {
            Collection::Tickets => self.mirror_records::<Ticket>(),
            Collection::Students => self.mirror_records::<Student>(),
            Collection::TeacherPassword => {
                let key = collection.local_key();
                let res = match &self.teacher_password {
                    Some(p) => self.local.save_json(key, p),
                    None => self.local.remove(key).map_err(Error::from),
                };
                if let Err(e) = res {
                    log::warn!("Failed to cache teacher password locally: {e}");
                }
            }
        }
    }

    fn mirror_records<T: Record>(&self) {
        if let Err(e) = self
            .local
            .save_collection(T::COLLECTION.local_key(), T::slot(&self.data))
        {
            log::warn!("Failed to mirror {} locally: {e}", T::COLLECTION);
        }
    }

    /// Installs `next` as the cached collection. In remote mode the write has
    /// already been accepted remotely and the next snapshot replaces it;
    /// otherwise the collection is persisted first.
    fn commit<T: Record>(&mut self, next: Vec<T>) -> Result<()> {
        if self.remote.is_none() {
            self.local.save_collection(T::COLLECTION.local_key(), &next)?;
        }
        *T::slot_mut(&mut self.data) = next;
        Ok(())
    }

    /// Merges `patch` over the record with the same id (or creates one) and
    /// persists it. Returns the merged record.
    pub fn upsert<T: Record>(&mut self, patch: Value) -> Result<T> {
        let Value::Object(patch) = patch else {
            return Err(Error::Validation(format!(
                "{} patch must be an object",
                T::COLLECTION
            )));
        };
        let id = match patch.get("id") {
            None | Some(Value::Null) => Uuid::new_v4().to_string(),
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            Some(_) => return Err(Error::Validation("id must be a non-empty string".into())),
        };

        let index = T::slot(&self.data).iter().position(|r| r.id() == id);
        let existing = index.map(|i| &T::slot(&self.data)[i]);
        let merged: T = merge_record(existing, &id, patch, now_millis())?;

        if let Some(remote) = &self.remote {
            let path = T::COLLECTION.record_path(&id);
            let value = serde_json::to_value(&merged)?;
            remote
                .set(&path, &value)
                .map_err(|e| remote_failure("write", &path, e))?;
        }

        let mut next = T::slot(&self.data).clone();
        match index {
            Some(i) => next[i] = merged.clone(),
            None => next.push(merged.clone()),
        }
        self.commit(next)?;
        Ok(merged)
    }

    pub fn upsert_ticket(&mut self, patch: Value) -> Result<Ticket> {
        self.upsert(patch)
    }

    pub fn upsert_student(&mut self, patch: Value) -> Result<Student> {
        self.upsert(patch)
    }

    /// Removes one record immediately; there is no soft delete.
    pub fn delete<T: Record>(&mut self, id: &str) -> Result<()> {
        if let Some(remote) = &self.remote {
            let path = T::COLLECTION.record_path(id);
            remote
                .remove(&path)
                .map_err(|e| remote_failure("remove", &path, e))?;
        }
        let mut next = T::slot(&self.data).clone();
        next.retain(|r| r.id() != id);
        self.commit(next)
    }

    /// Removes every record of the collection.
    pub fn clear<T: Record>(&mut self) -> Result<()> {
        if let Some(remote) = &self.remote {
            let path = T::COLLECTION.path();
            remote
                .remove(path)
                .map_err(|e| remote_failure("remove", path, e))?;
        }
        self.commit(Vec::<T>::new())
    }

    pub fn set_teacher_password(&mut self, password: &str) -> Result<()> {
        let collection = Collection::TeacherPassword;
        match &self.remote {
            Some(remote) => remote
                .set(collection.path(), &Value::String(password.to_string()))
                .map_err(|e| remote_failure("write", collection.path(), e))?,
            None => self
                .local
                .save_json(collection.local_key(), &password.to_string())?,
        }
        self.teacher_password = Some(password.to_string());
        Ok(())
    }
}
