use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Maps a store/workflow failure onto the protocol's error shape. Failures the
/// UI must show as a notification carry `details.notify = true`.
pub fn store_err(id: &str, e: &questiond::Error) -> serde_json::Value {
    let details = e.notify().then(|| json!({ "notify": true }));
    err(id, e.code(), e.to_string(), details)
}
