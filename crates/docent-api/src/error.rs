//! API error types and JSON error response formatting.
//!
//! ApiError provides a consistent JSON error response format across all
//! endpoints, mapping engine errors to appropriate HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use docent_chat::ChatError;
use docent_core::error::DocentError;

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "turn_cancelled").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - missing or invalid input.
    BadRequest(String),
    /// 409 Conflict - a turn is already in flight.
    Conflict(String),
    /// 409 Conflict - the turn was cancelled before it completed.
    TurnCancelled(String),
    /// 500 Internal Server Error - unexpected server error.
    Internal(String),
    /// 502 Bad Gateway - the generation backend answered with garbage.
    BadGateway(String),
    /// 503 Service Unavailable - a backend could not be reached.
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) | ApiError::TurnCancelled(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Conflict(_) => "conflict",
            ApiError::TurnCancelled(_) => "turn_cancelled",
            ApiError::Internal(_) => "internal_error",
            ApiError::BadGateway(_) => "bad_gateway",
            ApiError::ServiceUnavailable(_) => "service_unavailable",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = self.code().to_string();
        let message = match self {
            ApiError::BadRequest(msg)
            | ApiError::Conflict(msg)
            | ApiError::TurnCancelled(msg)
            | ApiError::Internal(msg)
            | ApiError::BadGateway(msg)
            | ApiError::ServiceUnavailable(msg) => msg,
        };

        (status, Json(ErrorBody { error, message })).into_response()
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        let message = err.to_string();
        match err {
            ChatError::InvalidArgument(_) => ApiError::BadRequest(message),
            ChatError::InvalidState(_) => ApiError::Conflict(message),
            ChatError::Cancelled => ApiError::TurnCancelled(message),
            ChatError::BackendUnavailable(_) => ApiError::ServiceUnavailable(message),
            ChatError::BackendProtocolError(_) => ApiError::BadGateway(message),
        }
    }
}

impl From<DocentError> for ApiError {
    fn from(err: DocentError) -> Self {
        match &err {
            DocentError::Config(msg) => ApiError::BadRequest(msg.clone()),
            DocentError::Storage(msg) => ApiError::Internal(msg.clone()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_error_status_mapping() {
        let cases = [
            (ChatError::InvalidArgument("x".into()), StatusCode::BAD_REQUEST),
            (ChatError::InvalidState("x".into()), StatusCode::CONFLICT),
            (ChatError::Cancelled, StatusCode::CONFLICT),
            (ChatError::BackendUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (ChatError::BackendProtocolError("x".into()), StatusCode::BAD_GATEWAY),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_cancelled_has_distinct_code() {
        let err = ApiError::from(ChatError::Cancelled);
        assert_eq!(err.code(), "turn_cancelled");
        assert_eq!(ApiError::from(ChatError::InvalidState("busy".into())).code(), "conflict");
    }

    #[test]
    fn test_docent_error_mapping() {
        let err = ApiError::from(DocentError::Storage("disk full".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
