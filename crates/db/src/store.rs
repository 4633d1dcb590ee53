//! Repository for the `crack_requests` table.
//!
//! Every mutation runs in a transaction that takes the row lock with
//! `SELECT ... FOR UPDATE`, applies the lifecycle rules from
//! [`CrackRequest`], and writes the row back. Concurrent replicas touching
//! the same request are serialized by the row lock.

use async_trait::async_trait;
use sqlx::FromRow;

use crackhash_core::protocol::ResultReport;
use crackhash_core::request::{CrackRequest, NewCrackRequest, Transition, UpdateOutcome};
use crackhash_core::status::RequestStatus;
use crackhash_core::store::{RequestStore, StoreError};
use crackhash_core::types::Timestamp;

use crate::{backend_error, DbPool};

/// Column list for `crack_requests` queries.
const COLUMNS: &str = "\
    request_id, hash, max_length, status, part_count, \
    received_parts, results, start_time, timeout_secs";

/// A row from the `crack_requests` table.
#[derive(Debug, Clone, FromRow)]
struct CrackRequestRow {
    request_id: String,
    hash: String,
    max_length: i32,
    status: String,
    part_count: i32,
    received_parts: Vec<i32>,
    results: Vec<String>,
    start_time: Timestamp,
    timeout_secs: i64,
}

impl TryFrom<CrackRequestRow> for CrackRequest {
    type Error = StoreError;

    fn try_from(row: CrackRequestRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<RequestStatus>().map_err(StoreError::Backend)?;
        Ok(CrackRequest {
            request_id: row.request_id,
            hash: row.hash,
            max_length: row.max_length.max(0) as u32,
            status,
            part_count: row.part_count.max(0) as u32,
            received_parts: row.received_parts.into_iter().map(|p| p.max(0) as u32).collect(),
            results: row.results.into_iter().collect(),
            start_time: row.start_time,
            timeout_secs: row.timeout_secs.max(0) as u64,
        })
    }
}

fn db_err(err: sqlx::Error) -> StoreError {
    StoreError::Backend(backend_error(err))
}

/// Durable, shareable Request Store.
#[derive(Clone)]
pub struct PgRequestStore {
    pool: DbPool,
}

impl PgRequestStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Lock a request row, let `f` mutate it, and persist any change.
    ///
    /// Returns `None` if the request does not exist.
    async fn mutate<R, F>(&self, request_id: &str, f: F) -> Result<Option<R>, StoreError>
    where
        F: FnOnce(&mut CrackRequest) -> R + Send,
        R: Send,
    {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let query = format!("SELECT {COLUMNS} FROM crack_requests WHERE request_id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, CrackRequestRow>(&query)
            .bind(request_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;

        let Some(row) = row else {
            tx.rollback().await.map_err(db_err)?;
            return Ok(None);
        };

        let mut request = CrackRequest::try_from(row)?;
        let before = request.clone();
        let outcome = f(&mut request);

        if request != before {
            let received: Vec<i32> = request.received_parts.iter().map(|&p| p as i32).collect();
            let results: Vec<String> = request.results.iter().cloned().collect();
            sqlx::query(
                "UPDATE crack_requests \
                 SET status = $2, received_parts = $3, results = $4, updated_at = NOW() \
                 WHERE request_id = $1",
            )
            .bind(request_id)
            .bind(request.status.as_str())
            .bind(&received)
            .bind(&results)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(Some(outcome))
    }
}

#[async_trait]
impl RequestStore for PgRequestStore {
    async fn create(&self, input: NewCrackRequest) -> Result<CrackRequest, StoreError> {
        let query = format!(
            "INSERT INTO crack_requests \
                 (request_id, hash, max_length, status, part_count, timeout_secs) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (request_id) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, CrackRequestRow>(&query)
            .bind(&input.request_id)
            .bind(&input.hash)
            .bind(input.max_length as i32)
            .bind(RequestStatus::New.as_str())
            .bind(input.part_count as i32)
            .bind(input.timeout_secs as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match row {
            Some(row) => CrackRequest::try_from(row),
            None => Err(StoreError::Duplicate(input.request_id)),
        }
    }

    async fn get(&self, request_id: &str) -> Result<Option<CrackRequest>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM crack_requests WHERE request_id = $1");
        sqlx::query_as::<_, CrackRequestRow>(&query)
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(CrackRequest::try_from)
            .transpose()
    }

    async fn set_status(
        &self,
        request_id: &str,
        status: RequestStatus,
    ) -> Result<Transition, StoreError> {
        let outcome = self
            .mutate(request_id, |request| request.transition(status))
            .await?
            .ok_or_else(|| StoreError::NotFound(request_id.to_string()))?;
        Ok(outcome?)
    }

    async fn update(&self, report: &ResultReport) -> Result<UpdateOutcome, StoreError> {
        Ok(self
            .mutate(&report.request_id, |request| request.apply_report(report))
            .await?
            .unwrap_or(UpdateOutcome::UnknownRequest))
    }

    async fn check_timeouts(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE crack_requests \
             SET status = $1, updated_at = NOW() \
             WHERE status = $2 \
               AND NOW() - start_time > make_interval(secs => timeout_secs::double precision)",
        )
        .bind(RequestStatus::Error.as_str())
        .bind(RequestStatus::InProgress.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        let expired = result.rows_affected();
        if expired > 0 {
            tracing::warn!(expired, "Crack requests timed out");
        }
        Ok(expired)
    }

    async fn mark_failed(&self, request_id: &str) -> Result<Transition, StoreError> {
        self.mutate(request_id, CrackRequest::fail)
            .await?
            .ok_or_else(|| StoreError::NotFound(request_id.to_string()))
    }
}
