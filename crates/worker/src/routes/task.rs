use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use tokio::sync::mpsc::error::TrySendError;

use crackhash_core::protocol::TaskAssignment;

use crate::error::{ApiError, ApiResult};
use crate::state::WorkerState;

/// POST /internal/api/worker/hash/crack/task
///
/// Validates the assignment and queues it for the local runner. The scan
/// itself happens after the response; results travel back separately.
pub async fn accept_task(
    State(state): State<WorkerState>,
    body: Result<Json<TaskAssignment>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let Json(task) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    state
        .executor
        .check(&task)
        .map_err(|e| ApiError::InvalidTask(e.to_string()))?;

    tracing::info!(
        request_id = %task.request_id,
        part = task.part_number,
        parts = task.part_count,
        "Task accepted",
    );
    state.tasks.try_send(task).map_err(|e| match e {
        TrySendError::Full(_) => ApiError::Busy,
        TrySendError::Closed(_) => ApiError::ShuttingDown,
    })?;
    Ok(StatusCode::OK)
}
