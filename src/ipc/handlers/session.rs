use questiond::session;
use serde_json::json;

use crate::ipc::error::{err, ok, store_err};
use crate::ipc::helpers::str_param;
use crate::ipc::types::{AppState, Request};

fn handle_session_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "student": state.sessions.student(),
            "teacher": state.sessions.is_teacher(),
        }),
    )
}

fn handle_student_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let class_name = match str_param(req, "className") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let initials = match str_param(req, "initials") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let birthday = match str_param(req, "birthday") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match state
        .sessions
        .login_student(store, class_name, initials, birthday)
    {
        Ok(student) => ok(&req.id, json!({ "student": student })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_student_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.sessions.logout_student();
    ok(&req.id, json!({ "ok": true }))
}

fn handle_teacher_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let password = match str_param(req, "password") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.sessions.login_teacher(store, password) {
        Ok(()) => ok(&req.id, json!({ "teacher": true })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_teacher_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.sessions.logout_teacher();
    ok(&req.id, json!({ "ok": true }))
}

fn handle_teacher_password_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let password = match str_param(req, "password") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match session::change_teacher_password(store, &state.sessions, password) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => store_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.get" => Some(handle_session_get(state, req)),
        "session.studentLogin" => Some(handle_student_login(state, req)),
        "session.studentLogout" => Some(handle_student_logout(state, req)),
        "session.teacherLogin" => Some(handle_teacher_login(state, req)),
        "session.teacherLogout" => Some(handle_teacher_logout(state, req)),
        "settings.teacherPassword.set" => Some(handle_teacher_password_set(state, req)),
        _ => None,
    }
}
