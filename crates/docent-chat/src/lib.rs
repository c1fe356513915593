//! Conversational engine for Docent.
//!
//! Keeps the conversation transcript, streams replies from a generation
//! backend, and lets that backend call a retrieval tool mid-reply whose
//! results come back as citation-ready passage fragments.

pub mod backend;
pub mod citation;
pub mod conversation;
pub mod error;
pub mod mock;
pub mod openai;
pub mod orchestrator;
pub mod prompt;
pub mod retrieval;
pub mod tools;
pub mod turn;

pub use backend::{GenerationBackend, GenerationStream, StreamEvent};
pub use citation::{format_passage, parse_citations, strip_citations, Citation};
pub use conversation::ConversationState;
pub use error::ChatError;
pub use openai::OpenAiBackend;
pub use orchestrator::{ChatEngine, TurnReport};
pub use prompt::{OFF_TOPIC_REPLY, SYSTEM_PROMPT};
pub use retrieval::{RetrievalBackend, StoreRetrieval};
pub use tools::{
    RetrievalToolDispatcher, ToolCallRequest, ToolDeclaration, ToolInvocationRequest,
    ToolInvocationResult, ToolOutput, MAX_RESULTS, SEARCH_TOOL_NAME,
};
pub use turn::{TurnState, TurnStateMachine};

pub use tokio_util::sync::CancellationToken;
