//! Conversation state: the ordered transcript of one session.
//!
//! Entry zero is always the system message. User and assistant messages
//! follow in turn order; an assistant message is only ever appended once
//! its reply is complete.

use docent_core::types::{ChatMessage, ChatRole};

use crate::error::ChatError;

/// Ordered transcript owned by a single engine.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    messages: Vec<ChatMessage>,
    /// Set by `append_user`, cleared when the turn commits or is abandoned.
    turn_open: bool,
}

impl ConversationState {
    /// Create a transcript seeded with `system_prompt`.
    pub fn with_system_prompt(system_prompt: &str) -> Result<Self, ChatError> {
        let mut state = Self::default();
        state.initialize(system_prompt)?;
        Ok(state)
    }

    /// Seed the transcript with its system message. May be called once.
    pub fn initialize(&mut self, system_prompt: &str) -> Result<(), ChatError> {
        if self.is_initialized() {
            return Err(ChatError::InvalidState(
                "conversation is already initialized".to_string(),
            ));
        }
        if system_prompt.trim().is_empty() {
            return Err(ChatError::InvalidArgument(
                "system prompt must not be empty".to_string(),
            ));
        }
        self.messages.push(ChatMessage::system(system_prompt));
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        !self.messages.is_empty()
    }

    /// Append the user message that opens a turn.
    pub fn append_user(&mut self, text: &str) -> Result<(), ChatError> {
        self.ensure_initialized()?;
        if text.trim().is_empty() {
            return Err(ChatError::InvalidArgument(
                "user text must not be empty".to_string(),
            ));
        }
        self.messages.push(ChatMessage::user(text));
        self.turn_open = true;
        Ok(())
    }

    /// Append the finalized reply that closes the open turn.
    pub fn append_assistant(&mut self, text: &str) -> Result<(), ChatError> {
        self.ensure_initialized()?;
        if !self.turn_open {
            return Err(ChatError::InvalidState(
                "no turn is open for an assistant reply".to_string(),
            ));
        }
        self.messages.push(ChatMessage::assistant(text));
        self.turn_open = false;
        Ok(())
    }

    /// Close the open turn without a reply. The user message stays.
    ///
    /// Returns whether a turn was open.
    pub fn abandon_turn(&mut self) -> bool {
        std::mem::replace(&mut self.turn_open, false)
    }

    pub fn has_open_turn(&self) -> bool {
        self.turn_open
    }

    /// Ordered copy of every message, for handing to the generation backend.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn system_prompt(&self) -> Option<String> {
        self.messages
            .first()
            .filter(|m| m.role == ChatRole::System)
            .map(ChatMessage::text)
    }

    fn ensure_initialized(&self) -> Result<(), ChatError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(ChatError::InvalidState(
                "conversation has not been initialized".to_string(),
            ))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> ConversationState {
        ConversationState::with_system_prompt("You are a museum guide.").unwrap()
    }

    // ---- Initialization ----

    #[test]
    fn test_initialize_seeds_system_message() {
        let state = seeded();
        assert_eq!(state.len(), 1);
        assert_eq!(state.messages()[0].role, ChatRole::System);
        assert_eq!(state.system_prompt().as_deref(), Some("You are a museum guide."));
    }

    #[test]
    fn test_initialize_twice_fails() {
        let mut state = seeded();
        let result = state.initialize("again");
        assert!(matches!(result, Err(ChatError::InvalidState(_))));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_initialize_empty_prompt_fails() {
        let mut state = ConversationState::default();
        assert!(matches!(
            state.initialize(""),
            Err(ChatError::InvalidArgument(_))
        ));
        assert!(!state.is_initialized());
    }

    #[test]
    fn test_operations_before_initialize_fail() {
        let mut state = ConversationState::default();
        assert!(matches!(
            state.append_user("hello"),
            Err(ChatError::InvalidState(_))
        ));
        assert!(matches!(
            state.append_assistant("hi"),
            Err(ChatError::InvalidState(_))
        ));
        assert!(state.is_empty());
    }

    // ---- Appending ----

    #[test]
    fn test_append_user_then_assistant() {
        let mut state = seeded();
        state.append_user("Tell me about the Mona Lisa").unwrap();
        assert!(state.has_open_turn());
        state.append_assistant("It hangs in the Louvre.").unwrap();
        assert!(!state.has_open_turn());

        let roles: Vec<ChatRole> = state.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![ChatRole::System, ChatRole::User, ChatRole::Assistant]
        );
    }

    #[test]
    fn test_append_user_empty_fails_without_mutation() {
        let mut state = seeded();
        assert!(matches!(
            state.append_user(""),
            Err(ChatError::InvalidArgument(_))
        ));
        assert!(matches!(
            state.append_user("   "),
            Err(ChatError::InvalidArgument(_))
        ));
        assert_eq!(state.len(), 1);
        assert!(!state.has_open_turn());
    }

    #[test]
    fn test_append_assistant_without_turn_fails() {
        let mut state = seeded();
        let result = state.append_assistant("unprompted");
        assert!(matches!(result, Err(ChatError::InvalidState(_))));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_append_assistant_twice_fails() {
        let mut state = seeded();
        state.append_user("q").unwrap();
        state.append_assistant("a").unwrap();
        assert!(state.append_assistant("a again").is_err());
    }

    #[test]
    fn test_empty_assistant_reply_is_allowed() {
        let mut state = seeded();
        state.append_user("q").unwrap();
        state.append_assistant("").unwrap();
        assert_eq!(state.last().map(ChatMessage::text).as_deref(), Some(""));
    }

    // ---- Abandoned turns ----

    #[test]
    fn test_abandon_turn_keeps_user_message() {
        let mut state = seeded();
        state.append_user("will be cancelled").unwrap();
        assert!(state.abandon_turn());
        assert_eq!(state.len(), 2);
        assert_eq!(state.last().unwrap().role, ChatRole::User);
        assert!(state.append_assistant("late").is_err());
    }

    #[test]
    fn test_abandon_without_turn_returns_false() {
        let mut state = seeded();
        assert!(!state.abandon_turn());
    }

    #[test]
    fn test_user_may_follow_abandoned_user() {
        let mut state = seeded();
        state.append_user("first").unwrap();
        state.abandon_turn();
        state.append_user("second").unwrap();
        state.append_assistant("reply").unwrap();
        assert_eq!(state.len(), 4);
    }

    // ---- Snapshot ----

    #[test]
    fn test_snapshot_is_independent_copy() {
        let mut state = seeded();
        state.append_user("q").unwrap();
        let snapshot = state.snapshot();
        state.append_assistant("a").unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(state.len(), 3);
    }

    #[test]
    fn test_system_message_stays_first_across_turns() {
        let mut state = seeded();
        for i in 0..10 {
            state.append_user(&format!("question {}", i)).unwrap();
            state.append_assistant(&format!("answer {}", i)).unwrap();
        }
        let systems = state
            .messages()
            .iter()
            .filter(|m| m.role == ChatRole::System)
            .count();
        assert_eq!(systems, 1);
        assert_eq!(state.messages()[0].role, ChatRole::System);
        assert_eq!(state.len(), 21);
    }
}
