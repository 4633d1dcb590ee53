//! Request Store contract.
//!
//! Every mutation is atomic per request: intake dispatch, result ingestion
//! and the timeout sweep may race on the same record. Implementations apply
//! the transition rules from [`CrackRequest`](crate::request::CrackRequest)
//! while holding the record's lock (or row lock, for the durable variant).

pub mod memory;

use async_trait::async_trait;

use crate::protocol::ResultReport;
use crate::request::{CrackRequest, NewCrackRequest, Transition, UpdateOutcome};
use crate::status::{RequestStatus, TransitionError};
use crate::types::RequestId;

pub use memory::MemoryRequestStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("crack request {0} not found")]
    NotFound(RequestId),

    #[error("crack request {0} already exists")]
    Duplicate(RequestId),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("store backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Insert a NEW request with no results.
    async fn create(&self, request: NewCrackRequest) -> Result<CrackRequest, StoreError>;

    /// Current snapshot, or `None` if unknown.
    async fn get(&self, request_id: &str) -> Result<Option<CrackRequest>, StoreError>;

    /// Explicit forward-only status change. Returns [`Transition::Unchanged`]
    /// when the request already has `status`, which makes this the
    /// compare-and-set used to claim a request for dispatch.
    async fn set_status(
        &self,
        request_id: &str,
        status: RequestStatus,
    ) -> Result<Transition, StoreError>;

    /// Merge a worker report and advance completion accounting.
    async fn update(&self, report: &ResultReport) -> Result<UpdateOutcome, StoreError>;

    /// Move every IN_PROGRESS request older than its timeout to ERROR.
    /// Returns how many requests expired.
    async fn check_timeouts(&self) -> Result<u64, StoreError>;

    /// Move a non-terminal request to ERROR (task delivery gave up).
    async fn mark_failed(&self, request_id: &str) -> Result<Transition, StoreError>;
}
