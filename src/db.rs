use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

pub const DB_FILE: &str = "questiond.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    Ok(())
}

/// String-keyed blob store used as the fallback when no remote store is usable.
pub struct LocalStore {
    conn: Connection,
}

impl LocalStore {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            conn: open_db(workspace)?,
        })
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn get(&self, key: &str) -> rusqlite::Result<Option<String>> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?", [key], |r| r.get(0))
            .optional()
    }

    pub fn set(&self, key: &str, value: &str) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO kv(key, value, updated_at)
             VALUES(?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))
             ON CONFLICT(key) DO UPDATE
             SET value = excluded.value, updated_at = excluded.updated_at",
            (key, value),
        )?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> rusqlite::Result<()> {
        self.conn.execute("DELETE FROM kv WHERE key = ?", [key])?;
        Ok(())
    }

    /// Reads a serialized collection. Missing or corrupt blobs read as empty.
    pub fn load_collection<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        let raw = match self.get(key) {
            Ok(Some(v)) => v,
            Ok(None) => return Vec::new(),
            Err(e) => {
                log::error!("Failed to read {key} from local store: {e}");
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("Discarding malformed local {key}: {e}");
                Vec::new()
            }
        }
    }

    pub fn save_collection<T: Serialize>(
        &self,
        key: &str,
        items: &[T],
    ) -> crate::error::Result<()> {
        let raw = serde_json::to_string(items)?;
        self.set(key, &raw)?;
        Ok(())
    }

    pub fn load_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self
            .get(key)
            .inspect_err(|e| log::error!("Failed to read {key} from local store: {e}"))
            .ok()??;
        serde_json::from_str(&raw)
            .inspect_err(|e| log::warn!("Discarding malformed local {key}: {e}"))
            .ok()
    }

    pub fn save_json<T: Serialize>(&self, key: &str, value: &T) -> crate::error::Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw)?;
        Ok(())
    }
}
