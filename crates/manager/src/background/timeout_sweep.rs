//! Periodic request timeout sweep.
//!
//! Moves IN_PROGRESS requests older than their timeout to ERROR. Runs on a
//! fixed interval using `tokio::time::interval`.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crackhash_core::store::RequestStore;

/// Run the timeout sweep loop until `cancel` is triggered.
pub async fn run(store: Arc<dyn RequestStore>, period: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = period.as_secs(), "Timeout sweep started");

    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Timeout sweep stopping");
                break;
            }
            _ = interval.tick() => {
                match store.check_timeouts().await {
                    Ok(0) => tracing::trace!("Timeout sweep: nothing expired"),
                    Ok(expired) => tracing::info!(expired, "Timeout sweep: requests moved to ERROR"),
                    Err(e) => tracing::error!(error = %e, "Timeout sweep failed"),
                }
            }
        }
    }
}
