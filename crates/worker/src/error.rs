use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Errors returned by the worker's HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The body did not parse as a task assignment.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The assignment parsed but cannot be scanned.
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    #[error("Task backlog is full")]
    Busy,

    #[error("Worker is shutting down")]
    ShuttingDown,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::InvalidTask(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::Busy => (StatusCode::SERVICE_UNAVAILABLE, "BUSY"),
            ApiError::ShuttingDown => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
        };

        let body = json!({
            "error": self.to_string(),
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
