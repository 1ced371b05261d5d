use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_questiond");
    let mut child = Command::new(exe)
        .env_remove("QUESTIOND_DATABASE_URL")
        .env_remove("QUESTIOND_AUTH_TOKEN")
        .env_remove("QUESTIOND_MAX_OPEN_TICKETS")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn questiond");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

#[test]
fn requests_before_workspace_and_unknown_methods_are_answered() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());

    let status = request_ok(&mut stdin, &mut reader, "2", "store.status", json!({}));
    assert_eq!(status.get("phase").and_then(|v| v.as_str()), Some("unconfigured"));

    let early = request(&mut stdin, &mut reader, "3", "tickets.list", json!({}));
    assert_eq!(error_code(&early), Some("no_workspace"));

    writeln!(stdin, "{{not json").expect("write bad line");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read bad_json response");
    let bad: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(error_code(&bad), Some("bad_json"));

    let workspace = temp_dir("questiond-smoke");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let unknown = request(&mut stdin, &mut reader, "5", "tickets.reopen", json!({}));
    assert_eq!(error_code(&unknown), Some("not_implemented"));

    let missing = request(&mut stdin, &mut reader, "6", "session.teacherLogin", json!({}));
    assert_eq!(error_code(&missing), Some("bad_params"));
}

#[test]
fn registered_student_survives_restart_without_remote() {
    let workspace = temp_dir("questiond-students-local");

    {
        let (mut child, mut stdin, mut reader) = spawn_sidecar();
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "1",
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );

        let denied = request(
            &mut stdin,
            &mut reader,
            "2",
            "students.upsert",
            json!({ "className": "5S", "initials": "cd", "birthday": "0202" }),
        );
        assert_eq!(error_code(&denied), Some("not_logged_in"));

        let bad_pw = request(
            &mut stdin,
            &mut reader,
            "3",
            "session.teacherLogin",
            json!({ "password": "0000" }),
        );
        assert_eq!(error_code(&bad_pw), Some("login_failed"));
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "4",
            "session.teacherLogin",
            json!({ "password": "1234" }),
        );

        let saved = request_ok(
            &mut stdin,
            &mut reader,
            "5",
            "students.upsert",
            json!({ "className": "5S", "initials": "cd", "birthday": "0202" }),
        );
        let student = saved.get("student").expect("student");
        assert_eq!(student.get("initials").and_then(|v| v.as_str()), Some("CD"));
        let student_id = student
            .get("id")
            .and_then(|v| v.as_str())
            .expect("student id")
            .to_string();

        let dup = request(
            &mut stdin,
            &mut reader,
            "6",
            "students.upsert",
            json!({ "className": "5S", "initials": "Cd", "birthday": "0303" }),
        );
        assert_eq!(error_code(&dup), Some("duplicate_student"));

        // Editing the same record under its own id is not a duplicate.
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "7",
            "students.upsert",
            json!({ "id": student_id, "className": "5S", "initials": "cd", "birthday": "0202" }),
        );

        let found = request_ok(
            &mut stdin,
            &mut reader,
            "8",
            "students.find",
            json!({ "className": "5S", "initials": "CD" }),
        );
        assert_eq!(
            found
                .get("student")
                .and_then(|s| s.get("id"))
                .and_then(|v| v.as_str()),
            Some(student_id.as_str())
        );

        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "9",
            "settings.teacherPassword.set",
            json!({ "password": "5678" }),
        );
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "10",
            "session.studentLogin",
            json!({ "className": "5S", "initials": "CD", "birthday": "0202" }),
        );

        drop(stdin);
        let _ = child.wait();
    }

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let prefs = request_ok(&mut stdin, &mut reader, "2", "prefs.get", json!({}));
    assert_eq!(prefs.get("lastClassName").and_then(|v| v.as_str()), Some("5S"));
    assert_eq!(prefs.get("lastInitials").and_then(|v| v.as_str()), Some("CD"));

    let session = request_ok(&mut stdin, &mut reader, "3", "session.get", json!({}));
    assert_eq!(session.get("student"), Some(&serde_json::Value::Null));
    assert_eq!(session.get("teacher").and_then(|v| v.as_bool()), Some(false));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "session.studentLogin",
        json!({ "className": "5S", "initials": "cd", "birthday": "0202" }),
    );

    let old_pw = request(
        &mut stdin,
        &mut reader,
        "5",
        "session.teacherLogin",
        json!({ "password": "1234" }),
    );
    assert_eq!(error_code(&old_pw), Some("login_failed"));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "session.teacherLogin",
        json!({ "password": "5678" }),
    );

    let listed = request_ok(&mut stdin, &mut reader, "7", "students.list", json!({}));
    let students = listed
        .get("students")
        .and_then(|v| v.as_array())
        .expect("students");
    assert_eq!(students.len(), 1);
    let id = students[0]
        .get("id")
        .and_then(|v| v.as_str())
        .expect("id")
        .to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "students.delete",
        json!({ "studentId": id }),
    );
    let gone = request(
        &mut stdin,
        &mut reader,
        "9",
        "students.get",
        json!({ "studentId": id }),
    );
    assert_eq!(error_code(&gone), Some("not_found"));
}

#[test]
fn failed_workspace_select_keeps_serving_the_open_workspace() {
    let workspace = temp_dir("questiond-reselect");
    let not_a_dir = workspace.join("plain-file.txt");
    std::fs::write(&not_a_dir, "not a workspace").expect("write plain file");

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let failed = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": not_a_dir.to_string_lossy() }),
    );
    assert_eq!(failed.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(error_code(&failed), Some("db_open_failed"));

    // Answered right away, not parked behind the failed select.
    let session = request_ok(&mut stdin, &mut reader, "3", "session.get", json!({}));
    assert_eq!(session.get("teacher").and_then(|v| v.as_bool()), Some(false));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "session.teacherLogin",
        json!({ "password": "1234" }),
    );
    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.upsert",
        json!({ "className": "2A", "initials": "mn", "birthday": "0505" }),
    );
    assert_eq!(
        saved
            .get("student")
            .and_then(|s| s.get("initials"))
            .and_then(|v| v.as_str()),
        Some("MN")
    );

    let status = request_ok(&mut stdin, &mut reader, "6", "store.status", json!({}));
    assert_eq!(status.get("phase").and_then(|v| v.as_str()), Some("ready"));
    assert_eq!(status.get("studentCount").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(status.get("parkedRequests").and_then(|v| v.as_u64()), Some(0));
}
