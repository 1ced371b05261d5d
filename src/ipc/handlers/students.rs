use questiond::rules;
use questiond::students::{self, StudentForm};
use serde_json::json;

use crate::ipc::error::{err, ok, store_err};
use crate::ipc::helpers::{params_as, str_param};
use crate::ipc::types::{AppState, Request};

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    if let Err(e) = state.sessions.require_teacher() {
        return store_err(&req.id, &e);
    }
    ok(
        &req.id,
        json!({ "students": students::sorted_students(store) }),
    )
}

fn handle_students_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    if let Err(e) = state.sessions.require_teacher() {
        return store_err(&req.id, &e);
    }
    let student_id = match str_param(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match store.student(student_id) {
        Some(s) => ok(&req.id, json!({ "student": s })),
        None => err(&req.id, "not_found", "student not found", None),
    }
}

/// Lookup by class and initials, used by the registration form to warn about
/// duplicates before saving.
fn handle_students_find(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    if let Err(e) = state.sessions.require_teacher() {
        return store_err(&req.id, &e);
    }
    let class_name = match str_param(req, "className") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let initials = match str_param(req, "initials") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let initials = rules::normalize_initials(initials);
    let found = rules::duplicate_check(store.students(), class_name.trim(), &initials, None);
    ok(&req.id, json!({ "student": found }))
}

fn handle_students_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let form: StudentForm = match params_as(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match students::save_student(store, &state.sessions, &form) {
        Ok(s) => ok(&req.id, json!({ "student": s })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match str_param(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match students::delete_student(store, &state.sessions, student_id) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => store_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.get" => Some(handle_students_get(state, req)),
        "students.find" => Some(handle_students_find(state, req)),
        "students.upsert" => Some(handle_students_upsert(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
