//! SQLite-backed key-value store
//!
//! A single `kv` table keyed by string. A write is one `INSERT OR REPLACE`,
//! which SQLite applies atomically.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};

use super::backend::KeyValueBackend;
use super::error::{StorageError, StorageResult};

/// Key-value backend over a SQLite database file
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open (or create) the database at `db_path`
    pub fn open(db_path: &str) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn)
    }

    /// In-memory database, mostly useful for tests
    pub fn open_in_memory() -> SqliteResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> SqliteResult<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY NOT NULL,
                value BLOB NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn sqlite_failure(action: &str, key: &str, err: rusqlite::Error) -> StorageError {
    StorageError::unknown(format!("SQLite {} failed for key '{}'", action, key)).with_cause(err)
}

#[async_trait]
impl KeyValueBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn read(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let conn = self.conn.lock();
        conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
            row.get::<_, Vec<u8>>(0)
        })
        .optional()
        .map_err(|e| sqlite_failure("read", key, e))
    }

    async fn write(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, chrono::Utc::now().to_rfc3339()],
        )
        .map_err(|e| sqlite_failure("write", key, e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map_err(|e| sqlite_failure("delete", key, e))?;
        Ok(())
    }
}
