use std::path::PathBuf;

use questiond::config::Config;
use questiond::gate::ReadyGate;
use questiond::session::Sessions;
use questiond::sync::{EventSink, SyncStore};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub config: Config,
    pub store: Option<SyncStore>,
    pub sessions: Sessions,
    /// Requests that arrived while the store was still loading.
    pub pending: ReadyGate<Request>,
    pub sink: EventSink,
}

impl AppState {
    pub fn new(sink: EventSink) -> Self {
        Self {
            workspace: None,
            config: Config::default(),
            store: None,
            sessions: Sessions::new(),
            pending: ReadyGate::new(),
            sink,
        }
    }
}
