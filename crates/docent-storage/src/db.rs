//! SQLite handle behind the passage store.
//!
//! One connection serves both ingestion writes and retrieval reads. Search
//! runs on blocking threads, so the connection sits behind a Mutex and every
//! caller goes through `with_conn` or `with_conn_mut`.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

use docent_core::error::DocentError;

use crate::migrations;

/// Pragmas for an on-disk passage database.
const FILE_PRAGMAS: &str = "PRAGMA journal_mode = WAL;
     PRAGMA synchronous = NORMAL;
     PRAGMA foreign_keys = ON;";

/// Passages cascade from their document, so foreign keys are always on.
const MEMORY_PRAGMAS: &str = "PRAGMA foreign_keys = ON;";

/// The passage database: documents, passages and their FTS5 index.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the passage database at `path`, creating parent
    /// directories and bringing the schema up to date.
    pub fn new(path: &Path) -> Result<Self, DocentError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| DocentError::Storage(format!("Failed to open database: {}", e)))?;
        let db = Self::prepare(conn, FILE_PRAGMAS)?;
        info!(path = %path.display(), "Passage database opened");
        Ok(db)
    }

    /// A throwaway passage database held in memory.
    pub fn in_memory() -> Result<Self, DocentError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DocentError::Storage(format!("Failed to open in-memory db: {}", e)))?;
        Self::prepare(conn, MEMORY_PRAGMAS)
    }

    fn prepare(conn: Connection, pragmas: &str) -> Result<Self, DocentError> {
        conn.execute_batch(pragmas)
            .map_err(|e| DocentError::Storage(format!("Failed to set pragmas: {}", e)))?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` against the connection. The lock is held until `f` returns.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DocentError>
    where
        F: FnOnce(&Connection) -> Result<T, DocentError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| DocentError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Like `with_conn`, with the mutable access transactions need.
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, DocentError>
    where
        F: FnOnce(&mut Connection) -> Result<T, DocentError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| DocentError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&mut conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}
