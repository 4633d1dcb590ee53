//! Result ingestion shared by the HTTP endpoint and the results consumer.

use crackhash_core::protocol::ResultReport;
use crackhash_core::request::UpdateOutcome;
use crackhash_core::store::{RequestStore, StoreError};

/// Apply a worker report to the store and log what happened.
pub async fn ingest(
    store: &dyn RequestStore,
    report: &ResultReport,
) -> Result<UpdateOutcome, StoreError> {
    let outcome = store.update(report).await?;
    match outcome {
        UpdateOutcome::Applied { completed: true, .. } => {
            tracing::info!(request_id = %report.request_id, "Crack request ready");
        }
        UpdateOutcome::Applied { counted, .. } => {
            tracing::debug!(
                request_id = %report.request_id,
                part_number = report.part_number,
                found = report.results.len(),
                counted,
                "Result report applied",
            );
        }
        UpdateOutcome::DuplicatePart => {
            tracing::debug!(
                request_id = %report.request_id,
                part_number = report.part_number,
                "Duplicate final report ignored",
            );
        }
        UpdateOutcome::PartMismatch => {
            tracing::warn!(
                request_id = %report.request_id,
                part_number = report.part_number,
                part_count = report.part_count,
                "Result report does not match the request's partitioning",
            );
        }
        UpdateOutcome::Ignored(status) => {
            tracing::debug!(
                request_id = %report.request_id,
                %status,
                "Result report for a request not in progress ignored",
            );
        }
        UpdateOutcome::UnknownRequest => {
            tracing::warn!(request_id = %report.request_id, "Result report for unknown request");
        }
    }
    Ok(outcome)
}
