//! Database schema migrations.
//!
//! Applies the passage schema: documents, passages, and the FTS5 index
//! kept in sync by triggers.

use rusqlite::Connection;
use tracing::info;

use docent_core::error::DocentError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), DocentError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| DocentError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version = current_version(conn)?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: passages");
    }

    Ok(())
}

/// Highest applied schema version, 0 for a fresh database.
pub fn current_version(conn: &Connection) -> Result<i64, DocentError> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| DocentError::Storage(format!("Failed to query migration version: {}", e)))
}

/// Version 1: documents, passages, passages_fts.
fn apply_v1(conn: &Connection) -> Result<(), DocentError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS documents (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            source_name     TEXT NOT NULL UNIQUE,
            ingested_at     INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE TABLE IF NOT EXISTS passages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id     INTEGER NOT NULL,
            source_name     TEXT NOT NULL,
            locator         TEXT NOT NULL,
            ordinal         INTEGER NOT NULL,
            text            TEXT NOT NULL,
            FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_passages_document
            ON passages (document_id, ordinal);

        CREATE INDEX IF NOT EXISTS idx_passages_source
            ON passages (source_name COLLATE NOCASE);

        CREATE VIRTUAL TABLE IF NOT EXISTS passages_fts USING fts5(
            text,
            content='passages',
            content_rowid='id',
            tokenize='porter unicode61'
        );

        CREATE TRIGGER IF NOT EXISTS passages_ai AFTER INSERT ON passages BEGIN
            INSERT INTO passages_fts(rowid, text) VALUES (new.id, new.text);
        END;

        CREATE TRIGGER IF NOT EXISTS passages_ad AFTER DELETE ON passages BEGIN
            INSERT INTO passages_fts(passages_fts, rowid, text)
                VALUES ('delete', old.id, old.text);
        END;

        CREATE TRIGGER IF NOT EXISTS passages_au AFTER UPDATE ON passages BEGIN
            INSERT INTO passages_fts(passages_fts, rowid, text)
                VALUES ('delete', old.id, old.text);
            INSERT INTO passages_fts(rowid, text) VALUES (new.id, new.text);
        END;

        INSERT INTO schema_migrations (version, name) VALUES (1, 'passages');
        ",
    )
    .map_err(|e| DocentError::Storage(format!("Migration v1 failed: {}", e)))
}
