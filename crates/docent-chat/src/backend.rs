//! Generation backend seam.
//!
//! A backend turns a transcript plus tool declarations into a stream of
//! events. The stream pauses after a tool call until the orchestrator
//! delivers its result with [`GenerationStream::submit_tool_result`].

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use docent_core::types::ChatMessage;

use crate::error::ChatError;
use crate::tools::{ToolCallRequest, ToolDeclaration, ToolOutput};

/// One event emitted by a generation stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A fragment of reply text, in emission order.
    Content(String),
    /// The backend wants a tool executed before it continues.
    ToolCall(ToolCallRequest),
}

/// Opens generation streams.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Open a stream for `transcript`.
    ///
    /// The token is the turn's cancellation handle; implementations observe
    /// it at every await.
    async fn open_stream(
        &self,
        transcript: Vec<ChatMessage>,
        tools: Vec<ToolDeclaration>,
        cancel: CancellationToken,
    ) -> Result<Box<dyn GenerationStream>, ChatError>;

    /// Short identifier used in logs.
    fn name(&self) -> &str;
}

/// A single reply being generated.
#[async_trait]
pub trait GenerationStream: Send {
    /// Next event, or `None` once the reply is complete.
    async fn next_event(&mut self) -> Result<Option<StreamEvent>, ChatError>;

    /// Deliver the result of an emitted tool call into the stream's context.
    async fn submit_tool_result(
        &mut self,
        call_id: &str,
        output: ToolOutput,
    ) -> Result<(), ChatError>;
}
