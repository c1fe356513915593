use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Transcript
// =============================================================================

/// Author of a transcript entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    /// Fixed instructions seeded at construction. Always transcript entry zero.
    System,
    /// An utterance from the person chatting.
    User,
    /// A finalized reply from the generation backend.
    Assistant,
}

impl ChatRole {
    /// Wire name used by chat-completion style APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One part of a message body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }
}

/// A single transcript entry.
///
/// Messages produced by the engine always carry exactly one text part.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Vec<ContentPart>,
}

impl ChatMessage {
    /// Build a message with a single text part.
    pub fn new(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentPart::text(text)],
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(ChatRole::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(ChatRole::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, text)
    }

    /// Concatenated text of all parts.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => text.as_str(),
            })
            .collect()
    }
}

// =============================================================================
// Retrieval
// =============================================================================

/// One search result from the knowledge store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    /// Document the excerpt came from (e.g. `louvre.pdf`).
    pub source_name: String,
    /// Position inside the document, usually a 1-based page number.
    pub locator: String,
    /// The excerpt itself.
    pub text: String,
}

impl RetrievedPassage {
    pub fn new(
        source_name: impl Into<String>,
        locator: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            source_name: source_name.into(),
            locator: locator.into(),
            text: text.into(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // ---- ChatRole ----

    #[test]
    fn test_role_wire_names() {
        assert_eq!(ChatRole::System.as_str(), "system");
        assert_eq!(ChatRole::User.as_str(), "user");
        assert_eq!(ChatRole::Assistant.as_str(), "assistant");
        assert_eq!(ChatRole::Assistant.to_string(), "assistant");
    }

    #[test]
    fn test_role_serde_snake_case() {
        let json = serde_json::to_string(&ChatRole::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
        let back: ChatRole = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(back, ChatRole::User);
    }

    // ---- ChatMessage ----

    #[test]
    fn test_message_has_single_text_part() {
        let msg = ChatMessage::user("hello");
        assert_eq!(msg.role, ChatRole::User);
        assert_eq!(msg.content.len(), 1);
        assert_eq!(msg.text(), "hello");
    }

    #[test]
    fn test_message_text_concatenates_parts() {
        let msg = ChatMessage {
            role: ChatRole::Assistant,
            content: vec![ContentPart::text("Hello, "), ContentPart::text("world")],
        };
        assert_eq!(msg.text(), "Hello, world");
    }

    #[test]
    fn test_content_part_serializes_tagged() {
        let json = serde_json::to_value(ContentPart::text("hi")).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["text"], "hi");
    }

    // ---- RetrievedPassage ----

    #[test]
    fn test_passage_constructor() {
        let p = RetrievedPassage::new("louvre.pdf", "3", "Leonardo painted it.");
        assert_eq!(p.source_name, "louvre.pdf");
        assert_eq!(p.locator, "3");
        assert_eq!(p.text, "Leonardo painted it.");
    }
}
