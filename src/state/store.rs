//! Snapshot Store
//!
//! SQLite-backed key-value blob store for aggregate state snapshots.
//! Uses rusqlite for synchronous, single-process access. The core only
//! ever writes here during a session; reads happen at startup and from
//! the status command.

use std::fs;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use chrono::Utc;

use crate::types::InfinitySnapshot;

/// Key the aggregate snapshot is stored under.
pub const SNAPSHOT_KEY: &str = "infinity_state";

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// The snapshot store handle. The connection sits behind a mutex so the
/// store can be shared across the coordinator's callback handlers.
pub struct SnapshotStore {
    conn: Mutex<Connection>,
}

impl SnapshotStore {
    /// Open (or create) the store at `db_path` and initialize the schema.
    pub fn open(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create db directory: {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open database: {db_path}"))?;

        // WAL keeps status reads cheap while the run loop writes.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(CREATE_TABLES)
            .context("failed to create tables")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLES)
            .context("failed to create tables")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Upsert a raw value under a key.
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Read a raw value by key.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let result = conn
            .query_row(
                "SELECT value FROM kv WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(result)
    }

    /// Serialize and store the aggregate snapshot.
    pub fn save_snapshot(&self, snapshot: &InfinitySnapshot) -> Result<()> {
        let json = serde_json::to_string(snapshot).context("failed to serialize snapshot")?;
        self.put(SNAPSHOT_KEY, &json)
    }

    /// Load the last persisted snapshot, if any.
    pub fn load_snapshot(&self) -> Result<Option<InfinitySnapshot>> {
        match self.get(SNAPSHOT_KEY)? {
            Some(json) => {
                let snapshot =
                    serde_json::from_str(&json).context("failed to parse stored snapshot")?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InfinityState;

    #[test]
    fn test_put_get_round_trip() {
        let store = SnapshotStore::open_in_memory().unwrap();
        assert!(store.get("missing").unwrap().is_none());

        store.put("k", "v1").unwrap();
        assert_eq!(store.get("k").unwrap().unwrap(), "v1");

        store.put("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap().unwrap(), "v2");
    }

    #[test]
    fn test_snapshot_round_trip() {
        let store = SnapshotStore::open_in_memory().unwrap();
        assert!(store.load_snapshot().unwrap().is_none());

        let mut state = InfinityState::default();
        state.total_upgrades = 13;
        state.cycle_count = 2;
        let snapshot = InfinitySnapshot::from_state(&state);
        store.save_snapshot(&snapshot).unwrap();

        let loaded = store.load_snapshot().unwrap().unwrap();
        assert_eq!(loaded.total_upgrades, 13);
        assert_eq!(loaded.cycle_count, 2);
        assert_eq!(loaded.infinity_level, state.infinity_level);
    }
}
