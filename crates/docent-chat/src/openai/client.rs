//! One streamed reply against a chat-completions endpoint.
//!
//! A reply may span several HTTP rounds: when a round ends in tool calls,
//! the stream waits for every result, then issues a follow-up request with
//! the assistant's `tool_calls` message and one `tool` message per call.

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::backend::{GenerationStream, StreamEvent};
use crate::error::ChatError;
use crate::tools::{ToolCallRequest, ToolOutput};

use super::sse::{ChatCompletionRequest, ChunkDecoder, RoundEvent, WireMessage, WireTool};
use super::Settings;

type SseStream =
    Pin<Box<dyn Stream<Item = Result<Event, EventStreamError<reqwest::Error>>> + Send>>;

/// Longest slice of an error body kept in messages.
const MAX_ERROR_BODY: usize = 512;

pub(crate) struct OpenAiStream {
    settings: Arc<Settings>,
    messages: Vec<WireMessage>,
    tools: Vec<WireTool>,
    cancel: CancellationToken,
    events: Option<SseStream>,
    decoder: ChunkDecoder,
    queue: VecDeque<StreamEvent>,
    /// Content of the current round, replayed with its tool calls.
    round_content: String,
    /// Calls emitted this round, in emission order.
    pending: Vec<ToolCallRequest>,
    results: HashMap<String, ToolOutput>,
    tool_rounds: u32,
}

impl OpenAiStream {
    pub(crate) fn new(
        settings: Arc<Settings>,
        messages: Vec<WireMessage>,
        tools: Vec<WireTool>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            settings,
            messages,
            tools,
            cancel,
            events: None,
            decoder: ChunkDecoder::new(),
            queue: VecDeque::new(),
            round_content: String::new(),
            pending: Vec::new(),
            results: HashMap::new(),
            tool_rounds: 0,
        }
    }

    /// Send the request for the next round and attach its event stream.
    pub(crate) async fn start_round(&mut self) -> Result<(), ChatError> {
        let body = ChatCompletionRequest {
            model: &self.settings.model,
            messages: &self.messages,
            tools: &self.tools,
            temperature: self.settings.temperature,
            stream: true,
        };
        let mut request = self.settings.http.post(&self.settings.url).json(&body);
        if let Some(key) = &self.settings.api_key {
            request = request.bearer_auth(key);
        }

        debug!(
            url = %self.settings.url,
            messages = self.messages.len(),
            tool_rounds = self.tool_rounds,
            "Opening completion round"
        );

        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(ChatError::Cancelled),
            sent = request.send() => sent.map_err(|e| {
                ChatError::BackendUnavailable(format!("request to {} failed: {}", self.settings.url, e))
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(MAX_ERROR_BODY).collect();
            error!(status = %status, body = %snippet, "Generation backend rejected request");
            return Err(ChatError::BackendUnavailable(format!(
                "backend returned {}: {}",
                status, snippet
            )));
        }

        self.events = Some(Box::pin(response.bytes_stream().eventsource()));
        self.decoder = ChunkDecoder::new();
        self.round_content.clear();
        Ok(())
    }

    /// Append the finished tool round to the request messages and start the next one.
    async fn resume(&mut self) -> Result<(), ChatError> {
        if self.results.len() < self.pending.len() {
            return Err(ChatError::BackendProtocolError(
                "stream advanced before every tool result was delivered".to_string(),
            ));
        }
        self.tool_rounds += 1;
        if self.tool_rounds > self.settings.max_tool_rounds {
            return Err(ChatError::BackendProtocolError(format!(
                "backend exceeded {} tool rounds",
                self.settings.max_tool_rounds
            )));
        }

        let calls = std::mem::take(&mut self.pending);
        self.messages
            .push(WireMessage::assistant_tool_calls(&self.round_content, &calls));
        for call in &calls {
            let output = self.results.remove(&call.id).ok_or_else(|| {
                ChatError::BackendProtocolError(format!("missing result for {}", call.id))
            })?;
            self.messages
                .push(WireMessage::tool_result(&call.id, output.to_content()));
        }
        self.start_round().await
    }

    fn apply(&mut self, event: RoundEvent) {
        match event {
            RoundEvent::Content(text) => {
                self.round_content.push_str(&text);
                self.queue.push_back(StreamEvent::Content(text));
            }
            RoundEvent::ToolCalls(calls) => {
                for call in calls {
                    self.pending.push(call.clone());
                    self.queue.push_back(StreamEvent::ToolCall(call));
                }
            }
            RoundEvent::Done => self.events = None,
        }
    }
}

#[async_trait]
impl GenerationStream for OpenAiStream {
    async fn next_event(&mut self) -> Result<Option<StreamEvent>, ChatError> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Ok(Some(event));
            }

            let Some(events) = self.events.as_mut() else {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                self.resume().await?;
                continue;
            };

            let idle = self.settings.idle_timeout;
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ChatError::Cancelled),
                next = timeout(idle, events.next()) => next,
            };

            match next {
                Err(_) => {
                    return Err(ChatError::BackendUnavailable(format!(
                        "no data from backend for {}s",
                        idle.as_secs()
                    )))
                }
                Ok(None) => {
                    self.events = None;
                    for event in self.decoder.finish()? {
                        self.apply(event);
                    }
                }
                Ok(Some(Err(e))) => {
                    return Err(ChatError::BackendUnavailable(format!(
                        "SSE stream error: {}",
                        e
                    )))
                }
                Ok(Some(Ok(sse))) => {
                    for event in self.decoder.push(&sse.data)? {
                        self.apply(event);
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
        if !self.pending.iter().any(|call| call.id == call_id) {
            return Err(ChatError::BackendProtocolError(format!(
                "unknown tool call id: {}",
                call_id
            )));
        }
        if self.results.contains_key(call_id) {
            return Err(ChatError::BackendProtocolError(format!(
                "duplicate result for tool call {}",
                call_id
            )));
        }
        self.results.insert(call_id.to_string(), output);
        Ok(())
    }
}
