//! SQLite-backed durable key-value store.
//!
//! One `kv_entries` table holds every namespaced value (`pending_<table>`
//! write lists, `backup_<table>` snapshots). The connection sits behind a
//! mutex; the coordinator's access pattern is short, serialized operations.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::debug;
use rusqlite::{params, Connection, OptionalExtension};

use stockbook_core::errors::StorageError;
use stockbook_core::store::LocalStore;

const INIT_SQL: &str =
    "CREATE TABLE IF NOT EXISTS kv_entries (key TEXT PRIMARY KEY, value TEXT NOT NULL)";

pub struct SqliteKvStore {
    conn: Mutex<Connection>,
}

impl SqliteKvStore {
    /// Opens (or creates) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path.as_ref()).map_err(db_err)?;
        debug!("[Storage] Opened kv store at {}", path.as_ref().display());
        Self::init(conn)
    }

    /// In-memory store for tests; contents die with the connection.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute(INIT_SQL, []).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn db_err(err: rusqlite::Error) -> StorageError {
    StorageError::unavailable(err.to_string())
}

/// Escape LIKE wildcards so key prefixes containing `_` match literally.
fn escape_like(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

impl LocalStore for SqliteKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.conn()
            .query_row(
                "SELECT value FROM kv_entries WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.conn()
            .execute(
                "INSERT INTO kv_entries (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .map(|_| ())
            .map_err(db_err)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.conn()
            .execute("DELETE FROM kv_entries WHERE key = ?1", params![key])
            .map(|_| ())
            .map_err(db_err)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let pattern = format!("{}%", escape_like(prefix));
        let conn = self.conn();
        let mut statement = conn
            .prepare("SELECT key FROM kv_entries WHERE key LIKE ?1 ESCAPE '\\' ORDER BY key")
            .map_err(db_err)?;
        let keys = statement
            .query_map(params![pattern], |row| row.get::<_, String>(0))
            .map_err(db_err)?
            .collect::<Result<Vec<String>, _>>()
            .map_err(db_err)?;
        Ok(keys)
    }
}
