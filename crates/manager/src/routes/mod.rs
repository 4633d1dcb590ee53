pub mod health;

use axum::routing::{get, patch, post};
use axum::Router;

use crackhash_core::protocol::{MANAGER_CRACK_PATH, MANAGER_RESULT_PATH, MANAGER_STATUS_PATH};

use crate::handlers::{crack, results};
use crate::state::AppState;

/// Build the manager route tree.
///
/// ```text
/// POST  /api/hash/crack                              submit_crack
/// GET   /api/hash/status?requestId=                  crack_status
/// PATCH /internal/api/manager/hash/crack/request     receive_result
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route(MANAGER_CRACK_PATH, post(crack::submit_crack))
        .route(MANAGER_STATUS_PATH, get(crack::crack_status))
        .route(MANAGER_RESULT_PATH, patch(results::receive_result))
}
