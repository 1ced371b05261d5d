use questiond::sync::{Notice, StoreEvent};
use serde_json::json;

use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

fn is_ok(resp: &serde_json::Value) -> bool {
    resp.get("ok").and_then(|v| v.as_bool()) == Some(true)
}

/// Re-arms the gate for a newly opened store. Requests parked for the
/// previous store are answered with `workspace_changed`.
fn rearm_gate(state: &mut AppState) -> Vec<serde_json::Value> {
    let abandoned = state
        .pending
        .reset()
        .into_iter()
        .map(|parked| {
            err(
                &parked.id,
                "workspace_changed",
                "workspace changed before the store was ready",
                None,
            )
        })
        .collect();
    if state.store.as_ref().is_some_and(|s| s.is_ready()) {
        state.pending.open();
    }
    abandoned
}

/// Handles one request line. Returns nothing when the request was parked
/// until the store is ready; may return extra responses for requests the
/// call abandoned.
pub fn handle_request(state: &mut AppState, req: Request) -> Vec<serde_json::Value> {
    let mut out = Vec::new();
    if let Some(resp) = handlers::core::try_handle(state, &req) {
        // A failed select keeps the previous store and its gate.
        if req.method == "workspace.select" && is_ok(&resp) {
            out.extend(rearm_gate(state));
        }
        out.push(resp);
        return out;
    }
    if state.store.is_none() {
        out.push(err(&req.id, "no_workspace", "select a workspace first", None));
        return out;
    }
    if let Some(req) = state.pending.admit(req) {
        out.push(dispatch(state, &req));
    }
    out
}

fn dispatch(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(resp) = handlers::session::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::students::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::tickets::try_handle(state, req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}

/// Applies an event from a remote thread; answers parked requests once the
/// store becomes ready and turns remote changes into refresh notifications.
pub fn handle_store_event(state: &mut AppState, ev: StoreEvent) -> Vec<serde_json::Value> {
    let Some(store) = state.store.as_mut() else {
        return Vec::new();
    };
    let notices = store.handle_event(ev);

    let mut out = Vec::new();
    for notice in notices {
        match notice {
            Notice::Ready => {
                for req in state.pending.open() {
                    out.push(dispatch(state, &req));
                }
            }
            Notice::Refresh(collection) => {
                out.push(json!({ "event": "refresh", "collection": collection }));
            }
        }
    }
    out
}
