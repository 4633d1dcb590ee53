//! Result queue consumer (queue mode).
//!
//! Applies each report to the store and acknowledges it afterwards, so a
//! report is never lost to a crash between pull and update. Redelivered
//! reports are absorbed by the store's per-part accounting.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crackhash_core::protocol::ResultReport;
use crackhash_core::queue::{MessageQueue, QueueError};
use crackhash_core::store::{RequestStore, StoreError};

use crate::engine::results::ingest;

#[derive(Debug, thiserror::Error)]
pub enum ConsumeError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct ResultConsumer {
    store: Arc<dyn RequestStore>,
    results: Arc<dyn MessageQueue>,
    poll_interval: Duration,
}

impl ResultConsumer {
    pub fn new(
        store: Arc<dyn RequestStore>,
        results: Arc<dyn MessageQueue>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            results,
            poll_interval,
        }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(queue = self.results.name(), "Result consumer started");
        loop {
            let idle = match self.consume_one().await {
                Ok(consumed) => !consumed,
                Err(e) => {
                    tracing::error!(error = %e, "Result consumer cycle failed");
                    true
                }
            };
            if idle {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            } else if cancel.is_cancelled() {
                break;
            }
        }
        tracing::info!("Result consumer stopping");
    }

    /// Pull, apply and acknowledge one report. Returns `false` when the
    /// queue is empty.
    pub async fn consume_one(&self) -> Result<bool, ConsumeError> {
        let Some(delivery) = self.results.pull(false).await? else {
            return Ok(false);
        };

        match ResultReport::decode(&delivery.payload) {
            Ok(report) => {
                ingest(self.store.as_ref(), &report).await?;
            }
            Err(e) => {
                tracing::error!(error = %e, "Dropping malformed result message");
            }
        }

        if let Some(handle) = &delivery.handle {
            self.results.ack(handle).await?;
        }
        Ok(true)
    }
}
