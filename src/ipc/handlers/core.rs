use questiond::config;
use questiond::db::LocalStore;
use questiond::remote;
use questiond::session::{self, Sessions};
use questiond::sync::{Phase, SyncStore};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    let local = match LocalStore::open(&path) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_open_failed", format!("{e:?}"), None),
    };
    let cfg = config::load_config(&path);
    let remote = remote::connect(&cfg.remote);

    // Drop the previous store (and its subscriptions) before opening the next.
    state.store = None;
    let store = SyncStore::open(
        local,
        remote,
        cfg.default_teacher_password.clone(),
        Arc::clone(&state.sink),
    );
    let result = json!({
        "workspacePath": path.to_string_lossy(),
        "mode": store.mode(),
        "phase": store.phase(),
    });

    state.workspace = Some(path);
    state.config = cfg;
    state.sessions = Sessions::new();
    state.store = Some(store);
    ok(&req.id, result)
}

fn handle_store_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return ok(&req.id, json!({ "phase": Phase::Unconfigured }));
    };
    ok(
        &req.id,
        json!({
            "phase": store.phase(),
            "mode": store.mode(),
            "ticketCount": store.tickets().len(),
            "studentCount": store.students().len(),
            "maxOpenTickets": state.config.max_open_tickets,
            "parkedRequests": state.pending.parked(),
        }),
    )
}

fn handle_prefs_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    ok(&req.id, json!(session::load_preferences(store.local())))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "store.status" => Some(handle_store_status(state, req)),
        "prefs.get" => Some(handle_prefs_get(state, req)),
        _ => None,
    }
}
