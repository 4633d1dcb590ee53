//! Handlers for the client-facing `/api/hash` endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crackhash_core::error::CoreError;
use crackhash_core::progress::{format_percent, request_percent};
use crackhash_core::protocol::IntakeMessage;
use crackhash_core::request::NewCrackRequest;
use crackhash_core::status::RequestStatus;
use crackhash_core::types::{new_request_id, RequestId};
use crackhash_core::validation::{validate_hash, validate_max_length};

use crate::engine::health::unhealthy_workers;
use crate::engine::progress::poll_fractions;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Body of `POST /api/hash/crack`.
#[derive(Debug, Deserialize)]
pub struct SubmitCrack {
    pub hash: Option<String>,
    #[serde(rename = "maxLength")]
    pub max_length: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    #[serde(rename = "RequestId")]
    pub request_id: RequestId,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    #[serde(rename = "requestId")]
    pub request_id: Option<String>,
}

/// Body of `GET /api/hash/status`.
///
/// While the request is not READY the found candidates are reported as
/// `partial_result`; once READY they move to `data`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: RequestStatus,
    pub progress: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_result: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/hash/crack
///
/// Validates the input, checks that every worker answers its health probe,
/// creates the request and queues it for dispatch. Nothing is created when
/// the pool is unavailable.
pub async fn submit_crack(
    State(state): State<AppState>,
    body: Result<Json<SubmitCrack>, JsonRejection>,
) -> AppResult<Json<SubmitResponse>> {
    let Json(input) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let (Some(hash), Some(max_length)) = (input.hash, input.max_length) else {
        return Err(AppError::BadRequest("Missing hash or maxLength".to_string()));
    };
    let hash = hash.trim().to_ascii_lowercase();
    validate_hash(&hash, state.config.hash_algorithm)?;
    validate_max_length(max_length)?;

    let unhealthy =
        unhealthy_workers(state.workers.as_ref(), &state.pool, state.config.retry).await;
    if !unhealthy.is_empty() {
        return Err(CoreError::Unavailable(format!(
            "One or more workers are down: {}",
            unhealthy.join(", ")
        ))
        .into());
    }

    let request = state
        .store
        .create(NewCrackRequest {
            request_id: new_request_id(),
            hash: hash.clone(),
            max_length,
            part_count: state.pool.size(),
            timeout_secs: state.config.request_timeout_secs,
        })
        .await?;

    state
        .intake
        .push(&IntakeMessage {
            request_id: request.request_id.clone(),
            hash,
            max_length,
        })
        .await?;

    tracing::info!(
        request_id = %request.request_id,
        max_length,
        part_count = request.part_count,
        "Crack request submitted",
    );

    Ok(Json(SubmitResponse {
        request_id: request.request_id,
    }))
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// GET /api/hash/status?requestId=
///
/// Runs a timeout sweep first so an expired request is reported as ERROR.
/// Progress is only polled from the workers while the request is running.
pub async fn crack_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> AppResult<Json<StatusResponse>> {
    let request_id = query
        .request_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing requestId".to_string()))?;

    if let Err(e) = state.store.check_timeouts().await {
        tracing::warn!(error = %e, "Timeout sweep before status query failed");
    }

    let request = state
        .store
        .get(&request_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "CrackRequest",
            id: request_id,
        })?;

    let fractions = if request.status == RequestStatus::InProgress {
        poll_fractions(state.workers.as_ref(), &state.pool, state.config.retry).await
    } else {
        Vec::new()
    };
    let progress = format_percent(request_percent(&request, &fractions));
    let results: Vec<String> = request.results.iter().cloned().collect();

    let response = if request.status == RequestStatus::Ready {
        StatusResponse {
            status: request.status,
            progress,
            partial_result: None,
            data: Some(results),
        }
    } else {
        StatusResponse {
            status: request.status,
            progress,
            partial_result: Some(results),
            data: None,
        }
    };
    Ok(Json(response))
}
