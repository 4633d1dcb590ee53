use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crackhash_core::error::CoreError;
use crackhash_core::queue::QueueError;
use crackhash_core::store::StoreError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds the store / queue
/// failures a handler can hit. Implements [`IntoResponse`] to produce
/// consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `crackhash_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A Request Store failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A message queue failure.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

fn internal(err: &dyn std::fmt::Display) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %err, "Internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                // Pool unavailability is reported to the client as a plain 500.
                CoreError::Unavailable(msg) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "UNAVAILABLE",
                    msg.clone(),
                ),
                CoreError::Internal(msg) => internal(msg),
            },

            AppError::Store(StoreError::NotFound(id)) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("CrackRequest with id {id} not found"),
            ),
            AppError::Store(err) => internal(err),
            AppError::Queue(err) => internal(err),

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
