pub mod health;
pub mod task;

use axum::routing::{get, post};
use axum::Router;

use crackhash_core::protocol::{WORKER_HEALTH_PATH, WORKER_PROGRESS_PATH, WORKER_TASK_PATH};

use crate::state::WorkerState;

/// Build the worker route tree.
///
/// ```text
/// POST /internal/api/worker/hash/crack/task   accept_task
/// GET  /health                                health
/// GET  /progress                              progress
/// ```
pub fn worker_routes() -> Router<WorkerState> {
    Router::new()
        .route(WORKER_TASK_PATH, post(task::accept_task))
        .route(WORKER_HEALTH_PATH, get(health::health))
        .route(WORKER_PROGRESS_PATH, get(health::progress))
}
