//! Retrieval backend seam.
//!
//! Defines the `RetrievalBackend` async trait consumed by the tool
//! dispatcher and the `StoreRetrieval` implementation backed by the
//! SQLite passage store.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use docent_core::types::RetrievedPassage;
use docent_storage::PassageStore;

use crate::error::ChatError;

/// Ranked passage search over the knowledge store.
#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    /// Return at most `max_results` passages matching `query`, best first.
    ///
    /// Implementations must stop waiting and return `ChatError::Cancelled`
    /// once `cancel` fires.
    async fn search(
        &self,
        query: &str,
        source_filter: Option<&str>,
        max_results: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<RetrievedPassage>, ChatError>;
}

/// Retrieval over the local FTS5 passage store.
#[derive(Debug, Clone)]
pub struct StoreRetrieval {
    store: PassageStore,
}

impl StoreRetrieval {
    pub fn new(store: PassageStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RetrievalBackend for StoreRetrieval {
    async fn search(
        &self,
        query: &str,
        source_filter: Option<&str>,
        max_results: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<RetrievedPassage>, ChatError> {
        let store = self.store.clone();
        let query = query.to_string();
        let filter = source_filter.map(str::to_string);

        // SQLite calls block; keep them off the async workers.
        let task = tokio::task::spawn_blocking(move || {
            store.search(&query, filter.as_deref(), max_results)
        });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ChatError::Cancelled),
            joined = task => match joined {
                Ok(result) => result.map_err(ChatError::from),
                Err(e) => Err(ChatError::BackendUnavailable(format!(
                    "retrieval task failed: {}",
                    e
                ))),
            },
        }
    }
}
