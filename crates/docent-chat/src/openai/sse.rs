//! Chat-completions wire types and SSE chunk decoding.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use docent_core::types::ChatMessage;

use crate::error::ChatError;
use crate::tools::{ToolCallRequest, ToolDeclaration};

const CHAT_COMPLETION_CHUNK_OBJECT: &str = "chat.completion.chunk";
const DONE_SENTINEL: &str = "[DONE]";
const FINISH_TOOL_CALLS: &str = "tool_calls";

// =============================================================================
// Request
// =============================================================================

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [WireMessage],
    #[serde(skip_serializing_if = "<[WireTool]>::is_empty")]
    pub tools: &'a [WireTool],
    pub temperature: f32,
    pub stream: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl WireMessage {
    pub fn from_chat(message: &ChatMessage) -> Self {
        Self {
            role: message.role.as_str().to_string(),
            content: Some(message.text()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// The assistant turn that requested `calls`, replayed when resuming.
    pub fn assistant_tool_calls(content: &str, calls: &[ToolCallRequest]) -> Self {
        Self {
            role: "assistant".to_string(),
            content: (!content.is_empty()).then(|| content.to_string()),
            tool_calls: Some(calls.iter().map(WireToolCall::from_request).collect()),
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: &str, content: String) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content),
            tool_calls: None,
            tool_call_id: Some(call_id.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: WireFunctionCall,
}

impl WireToolCall {
    fn from_request(call: &ToolCallRequest) -> Self {
        let arguments = match &call.arguments {
            Value::String(raw) => raw.clone(),
            other => other.to_string(),
        };
        Self {
            id: call.id.clone(),
            kind: "function".to_string(),
            function: WireFunctionCall {
                name: call.name.clone(),
                arguments,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireFunctionCall {
    pub name: String,
    /// JSON-encoded arguments object.
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: WireFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireFunction {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl From<&ToolDeclaration> for WireTool {
    fn from(decl: &ToolDeclaration) -> Self {
        Self {
            kind: "function".to_string(),
            function: WireFunction {
                name: decl.name.clone(),
                description: decl.description.clone(),
                parameters: decl.parameters.clone(),
            },
        }
    }
}

// =============================================================================
// Response chunks
// =============================================================================

#[derive(Debug, Deserialize)]
struct ChunkData {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: Option<usize>,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

/// What one round of the stream produced so far.
#[derive(Debug, Clone, PartialEq)]
pub enum RoundEvent {
    Content(String),
    /// Every tool call of the round, fully assembled.
    ToolCalls(Vec<ToolCallRequest>),
    /// The `[DONE]` sentinel.
    Done,
}

#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Decodes the `data` fields of one round's SSE events.
///
/// Content deltas are passed through immediately. Tool-call deltas are
/// accumulated by index and released together once the round finishes.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    calls: BTreeMap<usize, PartialCall>,
    finish_reason: Option<String>,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one SSE `data` payload.
    pub fn push(&mut self, data: &str) -> Result<Vec<RoundEvent>, ChatError> {
        let data = data.trim();
        if data == DONE_SENTINEL {
            let mut events = self.flush();
            events.push(RoundEvent::Done);
            return Ok(events);
        }

        let json: Value = serde_json::from_str(data).map_err(|e| {
            ChatError::BackendProtocolError(format!("SSE parsing error: {}, data: {}", e, data))
        })?;

        if let Some(message) = extract_sse_api_error_message(&json) {
            return Err(ChatError::BackendProtocolError(format!(
                "SSE API error: {}",
                message
            )));
        }

        if !is_chat_completion_chunk(&json) {
            warn!(
                object = json.get("object").and_then(serde_json::Value::as_str).unwrap_or("<missing>"),
                "Skipping non-standard SSE event"
            );
            return Ok(Vec::new());
        }

        let chunk: ChunkData = serde_json::from_value(json).map_err(|e| {
            ChatError::BackendProtocolError(format!("SSE data schema error: {}", e))
        })?;

        let mut events = Vec::new();
        let Some(choice) = chunk.choices.into_iter().next() else {
            return Ok(events);
        };

        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            events.push(RoundEvent::Content(content));
        }
        for (position, delta) in choice.delta.tool_calls.unwrap_or_default().into_iter().enumerate() {
            let entry = self.calls.entry(delta.index.unwrap_or(position)).or_default();
            if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
                entry.id = Some(id);
            }
            if let Some(function) = delta.function {
                if let Some(name) = function.name {
                    entry.name.push_str(&name);
                }
                if let Some(arguments) = function.arguments {
                    entry.arguments.push_str(&arguments);
                }
            }
        }
        if let Some(reason) = choice.finish_reason {
            if reason == FINISH_TOOL_CALLS {
                events.extend(self.flush());
            }
            self.finish_reason = Some(reason);
        }
        Ok(events)
    }

    /// Called when the event stream closes. Releases any unreleased tool calls.
    ///
    /// A stream that closes before reporting a finish reason was truncated.
    pub fn finish(&mut self) -> Result<Vec<RoundEvent>, ChatError> {
        if self.finish_reason.is_none() && self.calls.is_empty() {
            return Err(ChatError::BackendProtocolError(
                "SSE stream closed before response completed".to_string(),
            ));
        }
        Ok(self.flush())
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref()
    }

    fn flush(&mut self) -> Vec<RoundEvent> {
        if self.calls.is_empty() {
            return Vec::new();
        }
        let calls = std::mem::take(&mut self.calls)
            .into_iter()
            .map(|(index, partial)| ToolCallRequest {
                id: partial.id.unwrap_or_else(|| format!("call_{}", index)),
                name: partial.name,
                arguments: parse_arguments(&partial.arguments),
            })
            .collect();
        vec![RoundEvent::ToolCalls(calls)]
    }
}

/// Malformed argument text is kept as a string so the dispatcher can
/// report it back to the backend.
fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn is_chat_completion_chunk(json: &Value) -> bool {
    matches!(
        json.get("object").and_then(Value::as_str),
        Some(CHAT_COMPLETION_CHUNK_OBJECT)
    )
}

fn extract_sse_api_error_message(json: &Value) -> Option<String> {
    let error = json.get("error")?;
    if let Some(message) = error.get("message").and_then(Value::as_str) {
        return Some(message.to_string());
    }
    if let Some(message) = error.as_str() {
        return Some(message.to_string());
    }
    Some("An error occurred during streaming".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk(delta: Value, finish_reason: Option<&str>) -> String {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "choices": [{"index": 0, "delta": delta, "finish_reason": finish_reason}]
        })
        .to_string()
    }

    // ---- Content ----

    #[test]
    fn test_content_delta_passes_through() {
        let mut decoder = ChunkDecoder::new();
        let events = decoder.push(&chunk(json!({"content": "Hello"}), None)).unwrap();
        assert_eq!(events, vec![RoundEvent::Content("Hello".into())]);
    }

    #[test]
    fn test_role_only_and_empty_deltas_yield_nothing() {
        let mut decoder = ChunkDecoder::new();
        assert!(decoder
            .push(&chunk(json!({"role": "assistant", "content": ""}), None))
            .unwrap()
            .is_empty());
        assert!(decoder.push(&chunk(json!({}), None)).unwrap().is_empty());
    }

    #[test]
    fn test_done_sentinel() {
        let mut decoder = ChunkDecoder::new();
        decoder.push(&chunk(json!({"content": "x"}), Some("stop"))).unwrap();
        assert_eq!(decoder.push("[DONE]").unwrap(), vec![RoundEvent::Done]);
        assert_eq!(decoder.finish_reason(), Some("stop"));
    }

    // ---- Tool calls ----

    #[test]
    fn test_tool_call_accumulated_across_chunks() {
        let mut decoder = ChunkDecoder::new();
        let first = decoder
            .push(&chunk(
                json!({"tool_calls": [{"index": 0, "id": "call_abc", "type": "function",
                    "function": {"name": "search_documents", "arguments": "{\"searchPh"}}]}),
                None,
            ))
            .unwrap();
        assert!(first.is_empty());

        decoder
            .push(&chunk(
                json!({"tool_calls": [{"index": 0, "function": {"arguments": "rase\":\"Mona Lisa\"}"}}]}),
                None,
            ))
            .unwrap();
        let events = decoder.push(&chunk(json!({}), Some("tool_calls"))).unwrap();

        assert_eq!(
            events,
            vec![RoundEvent::ToolCalls(vec![ToolCallRequest {
                id: "call_abc".into(),
                name: "search_documents".into(),
                arguments: json!({"searchPhrase": "Mona Lisa"}),
            }])]
        );
    }

    #[test]
    fn test_parallel_tool_calls_ordered_by_index() {
        let mut decoder = ChunkDecoder::new();
        decoder
            .push(&chunk(
                json!({"tool_calls": [
                    {"index": 1, "id": "call_b", "function": {"name": "search_documents", "arguments": "{}"}},
                    {"index": 0, "id": "call_a", "function": {"name": "search_documents", "arguments": "{}"}}
                ]}),
                None,
            ))
            .unwrap();
        let events = decoder.push("[DONE]").unwrap();
        let RoundEvent::ToolCalls(calls) = &events[0] else {
            panic!("expected tool calls, got {:?}", events);
        };
        let ids: Vec<&str> = calls.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["call_a", "call_b"]);
        assert_eq!(events[1], RoundEvent::Done);
    }

    #[test]
    fn test_missing_id_and_bad_arguments() {
        let mut decoder = ChunkDecoder::new();
        decoder
            .push(&chunk(
                json!({"tool_calls": [{"index": 0, "function": {"name": "search_documents", "arguments": "{not json"}}]}),
                None,
            ))
            .unwrap();
        let events = decoder.finish().unwrap();
        let RoundEvent::ToolCalls(calls) = &events[0] else {
            panic!("expected tool calls");
        };
        assert_eq!(calls[0].id, "call_0");
        assert_eq!(calls[0].arguments, Value::String("{not json".into()));
    }

    #[test]
    fn test_empty_arguments_become_empty_object() {
        assert_eq!(parse_arguments(""), json!({}));
        assert_eq!(parse_arguments("{\"a\":1}"), json!({"a": 1}));
    }

    // ---- Errors and filtering ----

    #[test]
    fn test_invalid_json_is_protocol_error() {
        let mut decoder = ChunkDecoder::new();
        assert!(matches!(
            decoder.push("{oops"),
            Err(ChatError::BackendProtocolError(_))
        ));
    }

    #[test]
    fn test_api_error_payload() {
        let mut decoder = ChunkDecoder::new();
        let result = decoder.push(&json!({"error": {"message": "model not found"}}).to_string());
        assert!(matches!(result, Err(ChatError::BackendProtocolError(ref m)) if m.contains("model not found")));

        let result = decoder.push(&json!({"error": "overloaded"}).to_string());
        assert!(matches!(result, Err(ChatError::BackendProtocolError(ref m)) if m.contains("overloaded")));
    }

    #[test]
    fn test_non_chunk_objects_skipped() {
        let mut decoder = ChunkDecoder::new();
        let events = decoder
            .push(&json!({"object": "keepalive", "choices": []}).to_string())
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_truncated_stream_detected() {
        let mut decoder = ChunkDecoder::new();
        decoder.push(&chunk(json!({"content": "half"}), None)).unwrap();
        assert!(matches!(
            decoder.finish(),
            Err(ChatError::BackendProtocolError(_))
        ));
    }

    // ---- Request encoding ----

    #[test]
    fn test_request_serialization() {
        let messages = vec![
            WireMessage::from_chat(&ChatMessage::system("Be a guide.")),
            WireMessage::assistant_tool_calls(
                "",
                &[ToolCallRequest {
                    id: "call_1".into(),
                    name: "search_documents".into(),
                    arguments: json!({"searchPhrase": "Vermeer"}),
                }],
            ),
            WireMessage::tool_result("call_1", "[]".into()),
        ];
        let tools = vec![WireTool::from(&ToolDeclaration {
            name: "search_documents".into(),
            description: "Search".into(),
            parameters: json!({"type": "object"}),
        })];
        let request = ChatCompletionRequest {
            model: "llama3.1",
            messages: &messages,
            tools: &tools,
            temperature: 0.2,
            stream: true,
        };
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "system");
        assert!(json["messages"][1].get("content").is_none());
        assert_eq!(json["messages"][1]["tool_calls"][0]["type"], "function");
        assert_eq!(
            json["messages"][1]["tool_calls"][0]["function"]["arguments"],
            "{\"searchPhrase\":\"Vermeer\"}"
        );
        assert_eq!(json["messages"][2]["tool_call_id"], "call_1");
        assert_eq!(json["tools"][0]["function"]["name"], "search_documents");
    }

    #[test]
    fn test_request_omits_empty_tools() {
        let request = ChatCompletionRequest {
            model: "m",
            messages: &[],
            tools: &[],
            temperature: 0.0,
            stream: true,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("tools").is_none());
    }
}
