//! Scripted in-process backends.
//!
//! `ScriptedBackend` replays a fixed sequence of stream steps per turn and
//! records everything the engine hands it. `MockRetrieval` returns canned
//! passages and records every search. Both stand in for the network-backed
//! implementations in tests and local demos.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use docent_core::types::{ChatMessage, RetrievedPassage};

use crate::backend::{GenerationBackend, GenerationStream, StreamEvent};
use crate::error::ChatError;
use crate::retrieval::RetrievalBackend;
use crate::tools::{ToolCallRequest, ToolDeclaration, ToolOutput, SEARCH_TOOL_NAME};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// Generation
// =============================================================================

/// Builds reply text from the tool results delivered so far in the turn.
pub type Responder = Arc<dyn Fn(&[DeliveredResult]) -> String + Send + Sync>;

/// One step of a scripted reply.
pub enum ScriptStep {
    /// Emit a content fragment.
    Content(String),
    /// Emit a tool call and wait for its result.
    ToolCall(ToolCallRequest),
    /// Emit content computed from the delivered tool results.
    Respond(Responder),
    /// Fail the stream with this error.
    Fail(ChatError),
    /// Never produce another event until cancelled.
    Hang,
    /// Pause before the next step.
    Delay(Duration),
}

impl ScriptStep {
    pub fn content(text: impl Into<String>) -> Self {
        ScriptStep::Content(text.into())
    }

    /// A call to the retrieval tool with the given phrase.
    pub fn search(id: impl Into<String>, phrase: &str) -> Self {
        ScriptStep::ToolCall(ToolCallRequest {
            id: id.into(),
            name: SEARCH_TOOL_NAME.to_string(),
            arguments: json!({ "searchPhrase": phrase }),
        })
    }

    pub fn respond<F>(f: F) -> Self
    where
        F: Fn(&[DeliveredResult]) -> String + Send + Sync + 'static,
    {
        ScriptStep::Respond(Arc::new(f))
    }
}

/// A tool result the engine delivered into a scripted stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredResult {
    pub call_id: String,
    pub output: ToolOutput,
}

#[derive(Default)]
struct Recording {
    transcripts: Vec<Vec<ChatMessage>>,
    tools: Vec<Vec<ToolDeclaration>>,
    results: Vec<DeliveredResult>,
}

/// Generation backend replaying one script per opened stream.
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<VecDeque<Vec<ScriptStep>>>,
    recording: Arc<Mutex<Recording>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the script for the next opened stream.
    pub fn with_script(self, steps: Vec<ScriptStep>) -> Self {
        self.push_script(steps);
        self
    }

    pub fn push_script(&self, steps: Vec<ScriptStep>) {
        lock(&self.scripts).push_back(steps);
    }

    /// Transcripts received by `open_stream`, in call order.
    pub fn transcripts(&self) -> Vec<Vec<ChatMessage>> {
        lock(&self.recording).transcripts.clone()
    }

    /// Tool declarations received by `open_stream`, in call order.
    pub fn declared_tools(&self) -> Vec<Vec<ToolDeclaration>> {
        lock(&self.recording).tools.clone()
    }

    /// Every tool result delivered across all streams.
    pub fn delivered_results(&self) -> Vec<DeliveredResult> {
        lock(&self.recording).results.clone()
    }

    pub fn streams_opened(&self) -> usize {
        lock(&self.recording).transcripts.len()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn open_stream(
        &self,
        transcript: Vec<ChatMessage>,
        tools: Vec<ToolDeclaration>,
        cancel: CancellationToken,
    ) -> Result<Box<dyn GenerationStream>, ChatError> {
        {
            let mut recording = lock(&self.recording);
            recording.transcripts.push(transcript);
            recording.tools.push(tools);
        }
        let steps = lock(&self.scripts).pop_front().ok_or_else(|| {
            ChatError::BackendUnavailable("scripted backend has no script left".to_string())
        })?;
        Ok(Box::new(ScriptedStream {
            steps: steps.into(),
            pending_call: None,
            delivered: Vec::new(),
            recording: self.recording.clone(),
            cancel,
        }))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct ScriptedStream {
    steps: VecDeque<ScriptStep>,
    pending_call: Option<String>,
    delivered: Vec<DeliveredResult>,
    recording: Arc<Mutex<Recording>>,
    cancel: CancellationToken,
}

#[async_trait]
impl GenerationStream for ScriptedStream {
    async fn next_event(&mut self) -> Result<Option<StreamEvent>, ChatError> {
        if let Some(id) = &self.pending_call {
            return Err(ChatError::BackendProtocolError(format!(
                "stream advanced before result for {} was delivered",
                id
            )));
        }
        loop {
            if self.cancel.is_cancelled() {
                return Err(ChatError::Cancelled);
            }
            let Some(step) = self.steps.pop_front() else {
                return Ok(None);
            };
            match step {
                ScriptStep::Content(text) => return Ok(Some(StreamEvent::Content(text))),
                ScriptStep::ToolCall(call) => {
                    self.pending_call = Some(call.id.clone());
                    return Ok(Some(StreamEvent::ToolCall(call)));
                }
                ScriptStep::Respond(f) => {
                    return Ok(Some(StreamEvent::Content(f(&self.delivered))));
                }
                ScriptStep::Fail(err) => return Err(err),
                ScriptStep::Hang => {
                    self.cancel.cancelled().await;
                    return Err(ChatError::Cancelled);
                }
                ScriptStep::Delay(duration) => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(ChatError::Cancelled),
                        _ = tokio::time::sleep(duration) => {}
                    }
                }
            }
        }
    }

    async fn submit_tool_result(
        &mut self,
        call_id: &str,
        output: ToolOutput,
    ) -> Result<(), ChatError> {
        if self.pending_call.as_deref() != Some(call_id) {
            return Err(ChatError::BackendProtocolError(format!(
                "unexpected tool result for {}",
                call_id
            )));
        }
        self.pending_call = None;
        let delivered = DeliveredResult {
            call_id: call_id.to_string(),
            output,
        };
        lock(&self.recording).results.push(delivered.clone());
        self.delivered.push(delivered);
        Ok(())
    }
}

// =============================================================================
// Retrieval
// =============================================================================

/// A search the engine issued against `MockRetrieval`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSearch {
    pub query: String,
    pub source_filter: Option<String>,
    pub max_results: usize,
}

enum Behavior {
    Return,
    Fail(String),
    TimeOut(Duration),
    Hang,
}

/// Retrieval backend with canned passages.
pub struct MockRetrieval {
    passages: Vec<RetrievedPassage>,
    behavior: Behavior,
    ignore_limit: bool,
    calls: Mutex<Vec<RecordedSearch>>,
}

impl MockRetrieval {
    /// Always return `passages`, capped at the requested count.
    pub fn new(passages: Vec<RetrievedPassage>) -> Self {
        Self::with_behavior(passages, Behavior::Return)
    }

    /// Always fail with `BackendUnavailable(message)`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_behavior(Vec::new(), Behavior::Fail(message.into()))
    }

    /// Wait `after`, then fail as a timed-out search.
    pub fn timing_out(after: Duration) -> Self {
        Self::with_behavior(Vec::new(), Behavior::TimeOut(after))
    }

    /// Never answer; only cancellation ends the search.
    pub fn hanging() -> Self {
        Self::with_behavior(Vec::new(), Behavior::Hang)
    }

    /// Return every passage regardless of the requested count.
    pub fn ignoring_limit(mut self) -> Self {
        self.ignore_limit = true;
        self
    }

    fn with_behavior(passages: Vec<RetrievedPassage>, behavior: Behavior) -> Self {
        Self {
            passages,
            behavior,
            ignore_limit: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedSearch> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

#[async_trait]
impl RetrievalBackend for MockRetrieval {
    async fn search(
        &self,
        query: &str,
        source_filter: Option<&str>,
        max_results: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<RetrievedPassage>, ChatError> {
        lock(&self.calls).push(RecordedSearch {
            query: query.to_string(),
            source_filter: source_filter.map(str::to_string),
            max_results,
        });

        match &self.behavior {
            Behavior::Return => {
                let limit = if self.ignore_limit {
                    self.passages.len()
                } else {
                    max_results
                };
                Ok(self.passages.iter().take(limit).cloned().collect())
            }
            Behavior::Fail(message) => Err(ChatError::BackendUnavailable(message.clone())),
            Behavior::TimeOut(after) => {
                tokio::select! {
                    _ = cancel.cancelled() => Err(ChatError::Cancelled),
                    _ = tokio::time::sleep(*after) => Err(ChatError::BackendUnavailable(
                        format!("search timed out after {}ms", after.as_millis())
                    )),
                }
            }
            Behavior::Hang => {
                cancel.cancelled().await;
                Err(ChatError::Cancelled)
            }
        }
    }
}
