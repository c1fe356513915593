//! Docent Storage crate - SQLite passage store, FTS5 search, document ingestion.
//!
//! Provides a WAL-mode SQLite database with migrations, a keyword search
//! over retrievable passages ranked by BM25, and ingestion of text and PDF
//! documents into page-located passages.

pub mod db;
pub mod ingest;
pub mod migrations;
pub mod search;

pub use db::Database;
pub use ingest::{chunk_page, ingest_directory, ingest_file, split_pages, IngestReport};
pub use search::{sanitize_fts5_query, PageText, PassageStore};
