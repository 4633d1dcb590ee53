//! Result ingestion endpoint used by workers in direct mode.

use axum::extract::State;
use axum::http::StatusCode;

use crackhash_core::protocol::ResultReport;

use crate::engine::results::ingest;
use crate::error::AppResult;
use crate::state::AppState;

/// PATCH /internal/api/manager/hash/crack/request
///
/// Accepts a `ResultReport`. Malformed payloads are rejected with 400;
/// reports for unknown or finished requests are acknowledged and ignored.
pub async fn receive_result(State(state): State<AppState>, body: String) -> AppResult<StatusCode> {
    let report = ResultReport::decode(&body)?;
    ingest(state.store.as_ref(), &report).await?;
    Ok(StatusCode::OK)
}
