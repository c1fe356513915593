//! Route handler functions for all API endpoints.
//!
//! Each handler extracts its JSON body via axum extractors, calls the
//! chat engine, and returns a JSON response.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use docent_chat::{parse_citations, CancellationToken, Citation, TurnState};

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request types
// =============================================================================

/// Request body for POST /chatbot.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatbotRequest {
    #[serde(alias = "UserPrompt")]
    pub user_prompt: String,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatbotResponse {
    /// Full reply text, exactly as committed to the transcript.
    pub reply: String,
    /// Citation tags found at the end of the reply.
    pub citations: Vec<Citation>,
    pub tool_calls: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub passages: u64,
    pub turn_state: String,
}

// =============================================================================
// Handler functions
// =============================================================================

/// POST /chatbot - run one turn and return the reply.
///
/// Dropping the request (client disconnect) cancels the turn.
pub async fn chatbot(
    State(state): State<AppState>,
    Json(body): Json<ChatbotRequest>,
) -> Result<Json<ChatbotResponse>, ApiError> {
    let report = state
        .engine
        .send_message_detailed(&body.user_prompt, CancellationToken::new())
        .await?;

    Ok(Json(ChatbotResponse {
        citations: parse_citations(&report.reply),
        reply: report.reply,
        tool_calls: report.tool_calls,
    }))
}

/// POST /chatbot/cancel - cancel the turn in flight, if any.
pub async fn cancel(State(state): State<AppState>) -> Json<CancelResponse> {
    let cancelled = state.engine.cancel_current();
    if cancelled {
        tracing::info!("Turn cancelled via API");
    }
    Json(CancelResponse { cancelled })
}

/// GET /chatbot/history - the committed transcript, oldest first.
pub async fn history(State(state): State<AppState>) -> Json<Vec<HistoryEntry>> {
    let entries = state
        .engine
        .transcript()
        .iter()
        .map(|message| HistoryEntry {
            role: message.role.as_str().to_string(),
            content: message.text(),
        })
        .collect();
    Json(entries)
}

/// GET /health - health check.
///
/// Reports `degraded` when the passage store cannot be read.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (status, passages) = match state.store.count() {
        Ok(count) => ("healthy", count),
        Err(e) => {
            tracing::warn!(error = %e, "Passage store unreadable during health check");
            ("degraded", 0)
        }
    };
    let turn_state: TurnState = state.engine.turn_state();

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        passages,
        turn_state: turn_state.to_string(),
    })
}
