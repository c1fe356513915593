//! Passage store and full-text search using SQLite FTS5.
//!
//! Provides keyword search over the `passages_fts` virtual table,
//! returning passages ranked by BM25 relevance, optionally restricted
//! to a single source document.

use std::sync::Arc;

use rusqlite::{params, OptionalExtension};
use tracing::debug;

use docent_core::error::DocentError;
use docent_core::types::RetrievedPassage;

use crate::db::Database;

/// Text of one page of a document, ready to be stored as passages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// Locator stored with every passage of this page.
    pub locator: String,
    /// Passages in reading order.
    pub passages: Vec<String>,
}

/// Convert free-form user text into a safe FTS5 query.
///
/// Every alphanumeric token is quoted and the tokens are OR-ed together,
/// so operators, quotes, and punctuation in the input can never produce
/// an FTS5 syntax error. Returns `None` when the input has no tokens.
pub fn sanitize_fts5_query(raw: &str) -> Option<String> {
    let tokens: Vec<String> = raw
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();

    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" OR "))
    }
}

/// Passage storage and BM25-ranked search over it.
#[derive(Debug, Clone)]
pub struct PassageStore {
    db: Arc<Database>,
}

impl PassageStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Search passages matching `query`.
    ///
    /// `source_filter` restricts results to one document (case-insensitive
    /// exact match on the source name). Results are ordered by relevance
    /// and capped at `limit`.
    pub fn search(
        &self,
        query: &str,
        source_filter: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RetrievedPassage>, DocentError> {
        let Some(fts_query) = sanitize_fts5_query(query) else {
            return Ok(Vec::new());
        };
        if limit == 0 {
            return Ok(Vec::new());
        }
        let source_filter = source_filter.map(str::trim).filter(|s| !s.is_empty());

        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT p.source_name, p.locator, p.text
                     FROM passages_fts
                     JOIN passages p ON p.id = passages_fts.rowid
                     WHERE passages_fts MATCH ?1
                       AND (?2 IS NULL OR p.source_name = ?2 COLLATE NOCASE)
                     ORDER BY rank, p.id
                     LIMIT ?3",
                )
                .map_err(|e| DocentError::Storage(format!("FTS5 query prepare failed: {}", e)))?;

            let rows = stmt
                .query_map(params![fts_query, source_filter, limit as i64], |row| {
                    Ok(RetrievedPassage {
                        source_name: row.get(0)?,
                        locator: row.get(1)?,
                        text: row.get(2)?,
                    })
                })
                .map_err(|e| DocentError::Storage(format!("FTS5 query failed: {}", e)))?;

            let results = rows
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| DocentError::Storage(e.to_string()))?;
            debug!(query = %fts_query, results = results.len(), "Passage search");
            Ok(results)
        })
    }

    /// Replace every passage of `source_name` with `pages`.
    ///
    /// Runs in a single transaction, so re-ingesting a document never leaves
    /// a mix of old and new passages. Returns the number of passages stored.
    pub fn replace_document(
        &self,
        source_name: &str,
        pages: &[PageText],
    ) -> Result<usize, DocentError> {
        if source_name.trim().is_empty() {
            return Err(DocentError::Storage(
                "source name must not be empty".to_string(),
            ));
        }

        self.db.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| DocentError::Storage(format!("Failed to begin transaction: {}", e)))?;

            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM documents WHERE source_name = ?1",
                    params![source_name],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| DocentError::Storage(e.to_string()))?;

            if let Some(doc_id) = existing {
                tx.execute("DELETE FROM passages WHERE document_id = ?1", params![doc_id])
                    .map_err(|e| DocentError::Storage(e.to_string()))?;
                tx.execute("DELETE FROM documents WHERE id = ?1", params![doc_id])
                    .map_err(|e| DocentError::Storage(e.to_string()))?;
            }

            tx.execute(
                "INSERT INTO documents (source_name) VALUES (?1)",
                params![source_name],
            )
            .map_err(|e| DocentError::Storage(e.to_string()))?;
            let doc_id = tx.last_insert_rowid();

            let mut stored = 0usize;
            {
                let mut insert = tx
                    .prepare(
                        "INSERT INTO passages (document_id, source_name, locator, ordinal, text)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                    )
                    .map_err(|e| DocentError::Storage(e.to_string()))?;
                for page in pages {
                    for text in page.passages.iter().filter(|t| !t.trim().is_empty()) {
                        insert
                            .execute(params![
                                doc_id,
                                source_name,
                                page.locator,
                                stored as i64,
                                text
                            ])
                            .map_err(|e| DocentError::Storage(e.to_string()))?;
                        stored += 1;
                    }
                }
            }

            tx.commit()
                .map_err(|e| DocentError::Storage(format!("Failed to commit: {}", e)))?;
            Ok(stored)
        })
    }

    /// Total number of stored passages.
    pub fn count(&self) -> Result<u64, DocentError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM passages", [], |row| row.get(0))
                .map_err(|e| DocentError::Storage(e.to_string()))?;
            Ok(count as u64)
        })
    }

    /// Names of all ingested documents, alphabetically.
    pub fn sources(&self) -> Result<Vec<String>, DocentError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT source_name FROM documents ORDER BY source_name")
                .map_err(|e| DocentError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| row.get(0))
                .map_err(|e| DocentError::Storage(e.to_string()))?;
            rows.collect::<Result<Vec<String>, _>>()
                .map_err(|e| DocentError::Storage(e.to_string()))
        })
    }
}
