//! Turn state machine with thread-safe transitions.
//!
//! Enforces the lifecycle of one turn:
//! - Idle -> Streaming (turn started)
//! - Streaming -> AwaitingTool (backend requested a tool call)
//! - AwaitingTool -> Streaming (tool result delivered)
//! - Streaming -> Committed (stream ended, reply appended)
//! - Streaming | AwaitingTool -> Cancelled | Failed
//! - Committed | Cancelled | Failed -> Idle

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::error::ChatError;

/// Lifecycle state of the engine's current turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    /// No turn in flight. Ready to start.
    Idle,
    /// Consuming events from the generation stream.
    Streaming,
    /// Stream suspended while the retrieval tool runs.
    AwaitingTool,
    /// Reply finalized into the transcript.
    Committed,
    /// Turn abandoned through its cancellation handle.
    Cancelled,
    /// Turn aborted by a backend error.
    Failed,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnState::Idle => write!(f, "Idle"),
            TurnState::Streaming => write!(f, "Streaming"),
            TurnState::AwaitingTool => write!(f, "AwaitingTool"),
            TurnState::Committed => write!(f, "Committed"),
            TurnState::Cancelled => write!(f, "Cancelled"),
            TurnState::Failed => write!(f, "Failed"),
        }
    }
}

impl TurnState {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &TurnState) -> bool {
        use TurnState::*;
        matches!(
            (self, target),
            (Idle, Streaming)
                | (Streaming, AwaitingTool)
                | (AwaitingTool, Streaming)
                | (Streaming, Committed)
                // Abort transitions
                | (Streaming | AwaitingTool, Cancelled)
                | (Streaming | AwaitingTool, Failed)
                // Terminal states return to Idle
                | (Committed | Cancelled | Failed, Idle)
        )
    }

    /// Whether a turn is in flight.
    pub fn is_active(&self) -> bool {
        matches!(self, TurnState::Streaming | TurnState::AwaitingTool)
    }
}

/// Thread-safe state machine for turn transitions.
///
/// A poisoned lock is recovered rather than propagated; the state is a
/// plain `Copy` value and cannot be left half-written.
#[derive(Debug, Clone)]
pub struct TurnStateMachine {
    state: Arc<Mutex<TurnState>>,
}

impl Default for TurnStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnStateMachine {
    /// Create a new state machine initialized to `Idle`.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TurnState::Idle)),
        }
    }

    pub fn current(&self) -> TurnState {
        *self.lock()
    }

    /// Attempt to transition to the target state.
    pub fn transition(&self, target: TurnState) -> Result<(), ChatError> {
        let mut state = self.lock();
        if state.can_transition_to(&target) {
            tracing::debug!("Turn state: {} -> {}", *state, target);
            *state = target;
            Ok(())
        } else {
            Err(ChatError::InvalidState(format!(
                "Invalid turn transition: {} -> {}",
                *state, target
            )))
        }
    }

    /// Start a turn. Fails with `InvalidState` while another turn is in flight.
    pub fn begin(&self) -> Result<(), ChatError> {
        let mut state = self.lock();
        if *state != TurnState::Idle {
            return Err(ChatError::InvalidState(format!(
                "a turn is already in flight ({})",
                *state
            )));
        }
        *state = TurnState::Streaming;
        Ok(())
    }

    /// Move through a terminal state back to Idle.
    pub fn finish(&self, terminal: TurnState) -> Result<(), ChatError> {
        self.transition(terminal)?;
        self.transition(TurnState::Idle)
    }

    /// Force the state machine back to Idle (used for error recovery).
    pub fn reset(&self) {
        let mut state = self.lock();
        if *state != TurnState::Idle {
            tracing::warn!("Turn state machine reset to Idle from {}", *state);
            *state = TurnState::Idle;
        }
    }

    fn lock(&self) -> MutexGuard<'_, TurnState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// =============================================================================
// Tests
// =============================================================================
