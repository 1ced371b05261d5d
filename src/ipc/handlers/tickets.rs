use questiond::model::{ImageSlot, TicketStatus};
use questiond::rules;
use questiond::session::Actor;
use questiond::tickets::{self, TicketDraft};
use serde_json::json;

use crate::ipc::error::{err, ok, store_err};
use crate::ipc::helpers::{opt_str_param, params_as, str_param};
use crate::ipc::types::{AppState, Request};

fn slot_param(req: &Request) -> Result<ImageSlot, serde_json::Value> {
    let raw = str_param(req, "slot")?;
    ImageSlot::parse(raw)
        .ok_or_else(|| err(&req.id, "bad_params", format!("unknown image slot: {raw}"), None))
}

fn handle_tickets_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let status = match opt_str_param(req, "status") {
        None => None,
        Some("submitted") => Some(TicketStatus::Submitted),
        Some("done") => Some(TicketStatus::Done),
        Some(other) => {
            return err(
                &req.id,
                "bad_params",
                format!("unknown status filter: {other}"),
                None,
            )
        }
    };
    match tickets::visible_tickets(store, &state.sessions, status) {
        Ok(list) => ok(&req.id, json!({ "tickets": list })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_tickets_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let ticket_id = match str_param(req, "ticketId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match tickets::visible_ticket(store, &state.sessions, ticket_id) {
        Ok(t) => ok(
            &req.id,
            json!({
                "ticket": t,
                "memo": t.effective_memo(),
                "answerImages": t.effective_answer_images(),
            }),
        ),
        Err(e) => store_err(&req.id, &e),
    }
}

/// Students see their own count; teachers may ask about any student.
fn handle_tickets_open_count(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match state.sessions.actor() {
        Ok(Actor::Student(s)) => s.id.clone(),
        Ok(Actor::Teacher) => match str_param(req, "studentId") {
            Ok(v) => v.to_string(),
            Err(resp) => return resp,
        },
        Err(e) => return store_err(&req.id, &e),
    };
    let count = rules::count_open_tickets(store.tickets(), &student_id, None);
    ok(
        &req.id,
        json!({
            "studentId": student_id,
            "openCount": count,
            "limit": state.config.max_open_tickets,
        }),
    )
}

fn handle_tickets_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let draft: TicketDraft = match params_as(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let limit = state.config.max_open_tickets;
    match tickets::submit_ticket(store, &state.sessions, &draft, limit) {
        Ok(t) => ok(&req.id, json!({ "ticket": t })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_tickets_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let ticket_id = match str_param(req, "ticketId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let draft: TicketDraft = match params_as(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let limit = state.config.max_open_tickets;
    match tickets::edit_ticket(store, &state.sessions, ticket_id, &draft, limit) {
        Ok(t) => ok(&req.id, json!({ "ticket": t })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_tickets_answer(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let ticket_id = match str_param(req, "ticketId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let memo = req
        .params
        .get("memo")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let answer_images = match req.params.get("answerImages") {
        None | Some(serde_json::Value::Null) => None,
        Some(v) => match serde_json::from_value::<Vec<String>>(v.clone()) {
            Ok(images) => Some(images),
            Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
        },
    };
    match tickets::answer_ticket(store, &state.sessions, ticket_id, memo, answer_images) {
        Ok(t) => ok(&req.id, json!({ "ticket": t })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_tickets_complete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let ticket_id = match str_param(req, "ticketId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match tickets::complete_ticket(store, &state.sessions, ticket_id) {
        Ok(t) => ok(&req.id, json!({ "ticket": t })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_images_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let ticket_id = match str_param(req, "ticketId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let slot = match slot_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let data = match str_param(req, "data") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match tickets::add_image(store, &state.sessions, ticket_id, slot, data) {
        Ok(t) => ok(&req.id, json!({ "ticket": t })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_images_remove(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let ticket_id = match str_param(req, "ticketId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let slot = match slot_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(index) = req.params.get("index").and_then(|v| v.as_u64()) else {
        return err(&req.id, "bad_params", "missing index", None);
    };
    match tickets::remove_image(store, &state.sessions, ticket_id, slot, index as usize) {
        Ok(t) => ok(&req.id, json!({ "ticket": t })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_tickets_wipe(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match tickets::wipe_tickets(store, &state.sessions) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => store_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "tickets.list" => Some(handle_tickets_list(state, req)),
        "tickets.get" => Some(handle_tickets_get(state, req)),
        "tickets.openCount" => Some(handle_tickets_open_count(state, req)),
        "tickets.submit" => Some(handle_tickets_submit(state, req)),
        "tickets.update" => Some(handle_tickets_update(state, req)),
        "tickets.answer" => Some(handle_tickets_answer(state, req)),
        "tickets.complete" => Some(handle_tickets_complete(state, req)),
        "tickets.images.add" => Some(handle_images_add(state, req)),
        "tickets.images.remove" => Some(handle_images_remove(state, req)),
        "tickets.wipe" => Some(handle_tickets_wipe(state, req)),
        _ => None,
    }
}
