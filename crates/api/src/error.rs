//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use ticketline_shared::StoreError;

/// Errors raised by queue operations
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    // User-visible request outcomes
    #[error("User already holds a reservation")]
    AlreadyReserved,
    #[error("User holds no reservation")]
    NotReserved,
    #[error("Unknown user")]
    UnknownUser,

    // Connection-local protocol problems
    #[error("Protocol error: {0}")]
    Protocol(String),

    // Internal errors
    #[error("Queue engine is not running")]
    EngineUnavailable,
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl QueueError {
    /// Text sent to the client in an `error` message
    pub fn user_message(&self) -> String {
        match self {
            QueueError::AlreadyReserved => {
                "You already have a reservation. Please complete it before reserving again."
                    .to_string()
            }
            QueueError::NotReserved => "You have no active reservation.".to_string(),
            QueueError::UnknownUser => "Unknown user. Please connect first.".to_string(),
            QueueError::Protocol(_) => "Invalid request".to_string(),
            QueueError::EngineUnavailable | QueueError::Store(_) => {
                "The queue is temporarily unavailable. Please try again.".to_string()
            }
        }
    }
}

/// Result type alias for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// HTTP error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Internal server error")]
    Internal,
    #[error("Service unavailable")]
    ServiceUnavailable,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::ServiceUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::EngineUnavailable => ApiError::ServiceUnavailable,
            other => {
                tracing::error!(error = %other, "Queue error in HTTP handler");
                ApiError::Internal
            }
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
