//! Streaming response orchestrator.
//!
//! Drives one turn at a time: appends the user message, opens a generation
//! stream over the transcript, accumulates content, routes tool calls to the
//! retrieval dispatcher, and commits the finished reply. An interrupted or
//! failed turn leaves only the user message behind.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use docent_core::types::ChatMessage;

use crate::backend::{GenerationBackend, StreamEvent};
use crate::conversation::ConversationState;
use crate::error::ChatError;
use crate::prompt::SYSTEM_PROMPT;
use crate::tools::{RetrievalToolDispatcher, ToolCallRequest, ToolOutput};
use crate::turn::{TurnState, TurnStateMachine};

/// Summary of a committed turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnReport {
    pub turn_id: Uuid,
    /// Full reply text exactly as committed to the transcript.
    pub reply: String,
    pub tool_calls: usize,
    /// Tool calls whose failure was reported back to the backend.
    pub tool_errors: usize,
    pub elapsed_ms: u64,
}

/// The reply under construction. Never visible outside the engine.
struct InFlightResponse {
    id: Uuid,
    text: String,
    cancel: CancellationToken,
    started: Instant,
    tool_calls: usize,
    tool_errors: usize,
}

impl InFlightResponse {
    fn new(cancel: CancellationToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: String::new(),
            cancel,
            started: Instant::now(),
            tool_calls: 0,
            tool_errors: 0,
        }
    }
}

/// Conversational engine owning one conversation.
pub struct ChatEngine {
    backend: Arc<dyn GenerationBackend>,
    dispatcher: RetrievalToolDispatcher,
    conversation: Mutex<ConversationState>,
    turn: TurnStateMachine,
    in_flight: Mutex<Option<CancellationToken>>,
}

impl ChatEngine {
    /// Create an engine whose transcript is seeded with the museum system prompt.
    pub fn new(backend: Arc<dyn GenerationBackend>, dispatcher: RetrievalToolDispatcher) -> Self {
        let conversation = ConversationState::with_system_prompt(SYSTEM_PROMPT)
            .expect("system prompt is a non-empty constant");
        Self::assemble(backend, dispatcher, conversation)
    }

    /// Create an engine over an explicitly owned conversation.
    ///
    /// The conversation must be initialized and have no open turn.
    pub fn with_conversation(
        backend: Arc<dyn GenerationBackend>,
        dispatcher: RetrievalToolDispatcher,
        conversation: ConversationState,
    ) -> Result<Self, ChatError> {
        if !conversation.is_initialized() {
            return Err(ChatError::InvalidState(
                "conversation has not been initialized".to_string(),
            ));
        }
        if conversation.has_open_turn() {
            return Err(ChatError::InvalidState(
                "conversation has a turn in flight".to_string(),
            ));
        }
        Ok(Self::assemble(backend, dispatcher, conversation))
    }

    fn assemble(
        backend: Arc<dyn GenerationBackend>,
        dispatcher: RetrievalToolDispatcher,
        conversation: ConversationState,
    ) -> Self {
        Self {
            backend,
            dispatcher,
            conversation: Mutex::new(conversation),
            turn: TurnStateMachine::new(),
            in_flight: Mutex::new(None),
        }
    }

    /// Run one turn and return the full reply.
    pub async fn send_message(&self, text: &str) -> Result<String, ChatError> {
        self.send_message_with_cancel(text, CancellationToken::new())
            .await
    }

    /// Run one turn under a caller-supplied cancellation handle.
    pub async fn send_message_with_cancel(
        &self,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<String, ChatError> {
        self.send_message_detailed(text, cancel)
            .await
            .map(|report| report.reply)
    }

    /// Run one turn and return the reply with turn statistics.
    pub async fn send_message_detailed(
        &self,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<TurnReport, ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::InvalidArgument(
                "user text must not be empty".to_string(),
            ));
        }

        self.turn.begin()?;
        let transcript = {
            let mut conversation = self.lock_conversation();
            if let Err(e) = conversation.append_user(text) {
                drop(conversation);
                self.turn.reset();
                return Err(e);
            }
            conversation.snapshot()
        };
        *self.lock_in_flight() = Some(cancel.clone());

        let mut guard = TurnGuard {
            engine: self,
            cancel: cancel.clone(),
            armed: true,
        };
        let mut response = InFlightResponse::new(cancel);
        info!(
            turn_id = %response.id,
            backend = self.backend.name(),
            messages = transcript.len(),
            "Turn started"
        );

        let outcome = self.drive(&mut response, transcript).await;
        guard.armed = false;
        self.clear_in_flight();

        let elapsed_ms = response.started.elapsed().as_millis() as u64;
        match outcome {
            Ok(()) => {
                let reply = std::mem::take(&mut response.text);
                let committed = self.lock_conversation().append_assistant(&reply);
                if let Err(e) = committed {
                    self.settle(TurnState::Failed);
                    error!(turn_id = %response.id, error = %e, "Failed to commit reply");
                    return Err(e);
                }
                self.settle(TurnState::Committed);
                info!(
                    turn_id = %response.id,
                    chars = reply.chars().count(),
                    tool_calls = response.tool_calls,
                    tool_errors = response.tool_errors,
                    elapsed_ms,
                    "Turn committed"
                );
                Ok(TurnReport {
                    turn_id: response.id,
                    reply,
                    tool_calls: response.tool_calls,
                    tool_errors: response.tool_errors,
                    elapsed_ms,
                })
            }
            Err(e) => {
                self.lock_conversation().abandon_turn();
                if e == ChatError::Cancelled {
                    self.settle(TurnState::Cancelled);
                    warn!(turn_id = %response.id, elapsed_ms, "Turn cancelled");
                } else {
                    self.settle(TurnState::Failed);
                    error!(turn_id = %response.id, error = %e, elapsed_ms, "Turn failed");
                }
                Err(e)
            }
        }
    }

    /// Consume the stream until it ends, the turn is cancelled, or a backend fails.
    async fn drive(
        &self,
        response: &mut InFlightResponse,
        transcript: Vec<ChatMessage>,
    ) -> Result<(), ChatError> {
        let cancel = response.cancel.clone();
        let tools = vec![self.dispatcher.declaration()];

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChatError::Cancelled),
            opened = self.backend.open_stream(transcript, tools, cancel.clone()) => opened?,
        };

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ChatError::Cancelled),
                event = stream.next_event() => event?,
            };

            match event {
                None => return Ok(()),
                Some(StreamEvent::Content(fragment)) => {
                    debug!(turn_id = %response.id, chars = fragment.len(), "Content fragment");
                    response.text.push_str(&fragment);
                }
                Some(StreamEvent::ToolCall(call)) => {
                    self.turn.transition(TurnState::AwaitingTool)?;
                    response.tool_calls += 1;
                    let output = self.run_tool(response, &call).await?;

                    // A result that arrives after cancellation is discarded.
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(ChatError::Cancelled),
                        delivered = stream.submit_tool_result(&call.id, output) => delivered?,
                    }
                    self.turn.transition(TurnState::Streaming)?;
                }
            }
        }
    }

    /// Execute one tool call. Only cancellation ends the turn; every other
    /// failure becomes a tool-error output for the backend.
    async fn run_tool(
        &self,
        response: &mut InFlightResponse,
        call: &ToolCallRequest,
    ) -> Result<ToolOutput, ChatError> {
        let started = Instant::now();
        match self.dispatcher.dispatch(call, &response.cancel).await {
            Ok(result) => {
                debug!(
                    turn_id = %response.id,
                    tool = %call.name,
                    call_id = %call.id,
                    results = result.passages.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Tool call completed"
                );
                Ok(result.into())
            }
            Err(e) if e.is_turn_ending() => Err(e),
            Err(e) => {
                response.tool_errors += 1;
                warn!(
                    turn_id = %response.id,
                    tool = %call.name,
                    call_id = %call.id,
                    error = %e,
                    "Tool call failed; reporting to backend"
                );
                Ok(ToolOutput::Error(e.to_string()))
            }
        }
    }

    /// Cancel the turn in flight. Returns whether there was one to cancel.
    pub fn cancel_current(&self) -> bool {
        match self.lock_in_flight().as_ref() {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn turn_state(&self) -> TurnState {
        self.turn.current()
    }

    /// Ordered copy of the committed transcript.
    pub fn transcript(&self) -> Vec<ChatMessage> {
        self.lock_conversation().snapshot()
    }

    pub fn message_count(&self) -> usize {
        self.lock_conversation().len()
    }

    fn settle(&self, terminal: TurnState) {
        if let Err(e) = self.turn.finish(terminal) {
            warn!(error = %e, "Turn state out of sync");
            self.turn.reset();
        }
    }

    fn clear_in_flight(&self) {
        *self.lock_in_flight() = None;
    }

    fn lock_conversation(&self) -> MutexGuard<'_, ConversationState> {
        self.conversation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ChatEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatEngine")
            .field("backend", &self.backend.name())
            .field("turn", &self.turn.current())
            .field("messages", &self.message_count())
            .finish()
    }
}

/// Cleans up a turn whose future was dropped before it finished.
struct TurnGuard<'a> {
    engine: &'a ChatEngine,
    cancel: CancellationToken,
    armed: bool,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.cancel.cancel();
            self.engine.lock_conversation().abandon_turn();
            self.engine.clear_in_flight();
            self.engine.turn.reset();
            warn!("Turn dropped before completion");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
