use axum::extract::State;
use axum::Json;

use crackhash_core::protocol::WorkerHealth;

use crate::state::WorkerState;

/// GET /health -- liveness plus the assignment being scanned.
pub async fn health(State(state): State<WorkerState>) -> Json<WorkerHealth> {
    Json(state.executor.health().await)
}

/// GET /progress -- `processed / total` of the current scan, as text.
pub async fn progress(State(state): State<WorkerState>) -> String {
    state.executor.progress().to_string()
}
