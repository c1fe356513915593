//! Application state shared across all route handlers.
//!
//! AppState holds references to the chat engine and the passage store.
//! It is passed to handlers via axum's State extractor.

use std::sync::Arc;
use std::time::Instant;

use docent_chat::ChatEngine;
use docent_core::config::DocentConfig;
use docent_storage::PassageStore;

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<DocentConfig>,
    /// The conversation engine. One conversation per process.
    pub engine: Arc<ChatEngine>,
    /// Passage store backing the retrieval tool.
    pub store: PassageStore,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: DocentConfig, engine: Arc<ChatEngine>, store: PassageStore) -> Self {
        Self {
            config: Arc::new(config),
            engine,
            store,
            start_time: Instant::now(),
        }
    }
}
