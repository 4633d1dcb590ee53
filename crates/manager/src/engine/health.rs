//! Worker liveness probes.

use futures::future::join_all;

use crackhash_core::protocol::WorkerHealth;
use crackhash_core::retry::RetryPolicy;

use crate::client::{WorkerApi, WorkerClientError};
use crate::pool::WorkerPool;

/// Probe one worker, retrying per `retry`.
pub async fn probe(
    workers: &dyn WorkerApi,
    url: &str,
    retry: RetryPolicy,
) -> Result<WorkerHealth, WorkerClientError> {
    retry.run("health probe", |_| workers.health(url)).await
}

/// Probe every worker concurrently. Returns the URLs that stayed silent
/// after exhausting their retries.
pub async fn unhealthy_workers(
    workers: &dyn WorkerApi,
    pool: &WorkerPool,
    retry: RetryPolicy,
) -> Vec<String> {
    let probes = pool.urls().iter().map(|url| async move {
        match probe(workers, url, retry).await {
            Ok(_) => None,
            Err(e) => {
                tracing::error!(worker = %url, error = %e, "Worker unavailable");
                Some(url.clone())
            }
        }
    });
    join_all(probes).await.into_iter().flatten().collect()
}
