//! Retrieval tool dispatcher.
//!
//! The one capability the generation backend may call on its own during a
//! turn. Arguments are validated locally, the retrieval backend is queried
//! for a fixed number of results, and each passage comes back as a
//! citation fragment.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::citation::format_passage;
use crate::error::ChatError;
use crate::retrieval::RetrievalBackend;

/// Name under which the retrieval tool is declared.
pub const SEARCH_TOOL_NAME: &str = "search_documents";

/// Results requested per invocation. Policy constant, not configurable.
pub const MAX_RESULTS: usize = 5;

/// A callable capability as declared to the generation backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object.
    pub parameters: Value,
}

/// A tool call emitted by the generation backend mid-stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Backend-assigned id used to route the result back.
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Arguments of the retrieval tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocationRequest {
    pub search_phrase: String,
    #[serde(default, alias = "filenameFilter", skip_serializing_if = "Option::is_none")]
    pub source_filter: Option<String>,
}

impl ToolInvocationRequest {
    pub fn new(search_phrase: impl Into<String>) -> Self {
        Self {
            search_phrase: search_phrase.into(),
            source_filter: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source_filter = Some(source.into());
        self
    }
}

/// Formatted passages, in the retrieval backend's ranking order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ToolInvocationResult {
    pub passages: Vec<String>,
}

/// What the generation backend receives back for one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutput {
    Passages(Vec<String>),
    /// The tool failed; the message is shown to the backend.
    Error(String),
}

impl ToolOutput {
    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutput::Error(_))
    }

    /// Text content of the tool message sent to the backend.
    pub fn to_content(&self) -> String {
        match self {
            ToolOutput::Passages(passages) => {
                serde_json::to_string(passages).unwrap_or_else(|_| "[]".to_string())
            }
            ToolOutput::Error(message) => format!("Tool error: {}", message),
        }
    }
}

impl From<ToolInvocationResult> for ToolOutput {
    fn from(result: ToolInvocationResult) -> Self {
        ToolOutput::Passages(result.passages)
    }
}

/// Validates, executes, and shapes retrieval tool calls.
#[derive(Clone)]
pub struct RetrievalToolDispatcher {
    backend: Arc<dyn RetrievalBackend>,
}

impl RetrievalToolDispatcher {
    pub fn new(backend: Arc<dyn RetrievalBackend>) -> Self {
        Self { backend }
    }

    /// Declaration handed to the generation backend with every stream.
    pub fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: SEARCH_TOOL_NAME.to_string(),
            description: "Searches for information using a phrase or keyword in the museum's documents"
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "searchPhrase": {
                        "type": "string",
                        "description": "The phrase or keyword to search for"
                    },
                    "sourceFilter": {
                        "type": "string",
                        "description": "Restrict results to one named source document. Omit to search all sources."
                    }
                },
                "required": ["searchPhrase"]
            }),
        }
    }

    /// Run one retrieval.
    ///
    /// An empty phrase fails with `InvalidArgument` before the backend is
    /// called. At most [`MAX_RESULTS`] passages are returned, in backend order.
    pub async fn invoke(
        &self,
        request: &ToolInvocationRequest,
        cancel: &CancellationToken,
    ) -> Result<ToolInvocationResult, ChatError> {
        let phrase = request.search_phrase.trim();
        if phrase.is_empty() {
            return Err(ChatError::InvalidArgument(
                "searchPhrase must not be empty".to_string(),
            ));
        }
        let filter = request
            .source_filter
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let passages = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChatError::Cancelled),
            result = self.backend.search(phrase, filter, MAX_RESULTS, cancel) => result?,
        };

        debug!(
            phrase = %phrase,
            filter = filter.unwrap_or(""),
            results = passages.len(),
            "Retrieval tool invoked"
        );

        Ok(ToolInvocationResult {
            passages: passages.iter().take(MAX_RESULTS).map(format_passage).collect(),
        })
    }

    /// Route a raw tool call from the generation backend.
    ///
    /// Unknown tool names and malformed arguments fail with `InvalidArgument`.
    pub async fn dispatch(
        &self,
        call: &ToolCallRequest,
        cancel: &CancellationToken,
    ) -> Result<ToolInvocationResult, ChatError> {
        if call.name != SEARCH_TOOL_NAME {
            return Err(ChatError::InvalidArgument(format!(
                "unknown tool: {}",
                call.name
            )));
        }
        let request: ToolInvocationRequest = serde_json::from_value(call.arguments.clone())
            .map_err(|e| ChatError::InvalidArgument(format!("malformed tool arguments: {}", e)))?;
        self.invoke(&request, cancel).await
    }
}

impl std::fmt::Debug for RetrievalToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalToolDispatcher")
            .field("tool", &SEARCH_TOOL_NAME)
            .finish()
    }
}
