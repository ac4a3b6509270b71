// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Rejections produced by the exam session engine.
///
/// Every variant is scoped to one session or one participant and is reported
/// back to whoever triggered it. None of them is fatal to the process.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Unknown paper key, title mismatch, or Question Store failure.
    #[error("session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("session has ended")]
    SessionEnded,

    #[error("session has not started")]
    NotStarted,

    #[error("stale submission: question {got} is not live (current {expected})")]
    StaleSubmission { expected: usize, got: usize },

    #[error("duplicate submission")]
    DuplicateSubmission,

    #[error("invalid option {0}")]
    InvalidOption(usize),

    #[error("delivery to connection failed")]
    DeliveryFailed,
}

impl SessionError {
    /// Short reason string sent to clients in `answerResult`.
    pub fn reason(&self) -> &'static str {
        match self {
            SessionError::SessionUnavailable(_) => "session unavailable",
            SessionError::SessionEnded => "session ended",
            SessionError::NotStarted => "session not started",
            SessionError::StaleSubmission { .. } => "stale submission",
            SessionError::DuplicateSubmission => "duplicate submission",
            SessionError::InvalidOption(_) => "invalid option",
            SessionError::DeliveryFailed => "delivery failed",
        }
    }
}

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    // 500 Internal Server Error
    #[error("internal server error: {0}")]
    InternalServerError(String),

    // 400 Bad Request
    #[error("bad request: {0}")]
    BadRequest(String),

    // 401 Unauthorized
    #[error("unauthorized: {0}")]
    AuthError(String),

    // 403 Forbidden
    #[error("forbidden: {0}")]
    Forbidden(String),

    // 404 Not Found
    #[error("not found: {0}")]
    NotFound(String),

    // 409 Conflict
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };
        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::SessionUnavailable(key) => {
                AppError::NotFound(format!("No live session for '{}'", key))
            }
            SessionError::SessionEnded => AppError::Conflict(err.to_string()),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_session_maps_to_404() {
        let err: AppError = SessionError::SessionUnavailable("PHY-101".to_string()).into();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn internal_error_hides_details() {
        let resp = AppError::InternalServerError("pool timed out".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn stale_submission_reason() {
        let err = SessionError::StaleSubmission {
            expected: 1,
            got: 0,
        };
        assert_eq!(err.reason(), "stale submission");
        assert!(err.to_string().contains("question 0"));
    }
}
