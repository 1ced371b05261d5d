mod ipc;

use questiond::sync::{EventSink, StoreEvent};
use std::io::{self, BufRead, Write};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

/// Everything the main loop reacts to, merged onto one channel so requests
/// and remote events are applied in arrival order on this thread.
enum Inbound {
    Line(String),
    Store(StoreEvent),
    Closed,
}

fn write_line(stdout: &mut io::Stdout, value: &serde_json::Value) {
    let _ = writeln!(
        stdout,
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{\"ok\":false}".to_string())
    );
    let _ = stdout.flush();
}

fn main() {
    // stdout carries the protocol; logs go to stderr.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (tx, rx) = mpsc::channel::<Inbound>();

    let store_tx = tx.clone();
    let sink: EventSink = Arc::new(move |ev| {
        let _ = store_tx.send(Inbound::Store(ev));
    });

    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(Inbound::Line(line)).is_err() {
                return;
            }
        }
        let _ = tx.send(Inbound::Closed);
    });

    let mut state = ipc::AppState::new(sink);
    let mut stdout = io::stdout();
    log::info!("questiond {} ready", env!("CARGO_PKG_VERSION"));

    while let Ok(msg) = rx.recv() {
        let responses = match msg {
            Inbound::Closed => break,
            Inbound::Store(ev) => ipc::handle_store_event(&mut state, ev),
            Inbound::Line(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ipc::Request>(&line) {
                    Ok(req) => ipc::handle_request(&mut state, req),
                    Err(e) => {
                        // Can't reply without id.
                        vec![serde_json::json!({
                            "ok": false,
                            "error": { "code": "bad_json", "message": e.to_string() }
                        })]
                    }
                }
            }
        };
        for resp in &responses {
            write_line(&mut stdout, resp);
        }
    }
    log::info!("stdin closed, shutting down");
}
