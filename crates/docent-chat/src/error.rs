//! Error types for the conversational engine.

use docent_core::error::DocentError;

/// Errors from the chat engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// Input rejected before any backend call.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Operation issued in the wrong lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// A backend could not be reached or failed to answer.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    /// A backend answered with something the engine cannot interpret.
    #[error("backend protocol error: {0}")]
    BackendProtocolError(String),
    /// The turn was cancelled before the reply completed.
    #[error("turn cancelled")]
    Cancelled,
}

impl ChatError {
    /// Whether this error, raised while a tool call runs, ends the turn.
    ///
    /// Only cancellation does. Every other tool failure is reported back to
    /// the generation backend as tool output so the reply can continue.
    pub fn is_turn_ending(&self) -> bool {
        matches!(self, ChatError::Cancelled)
    }
}

impl From<DocentError> for ChatError {
    fn from(err: DocentError) -> Self {
        ChatError::BackendUnavailable(err.to_string())
    }
}
