//! Progress polling for the status endpoint.

use futures::future::join_all;

use crackhash_core::retry::RetryPolicy;

use crate::client::WorkerApi;
use crate::pool::WorkerPool;

/// Query every worker's progress fraction concurrently.
///
/// A worker that exhausts its retries contributes `0.0`. The result is in
/// pool order and always has one entry per worker.
pub async fn poll_fractions(
    workers: &dyn WorkerApi,
    pool: &WorkerPool,
    retry: RetryPolicy,
) -> Vec<f64> {
    let queries = pool.urls().iter().map(|url| async move {
        match retry.run("progress query", |_| workers.progress(url)).await {
            Ok(fraction) => fraction,
            Err(e) => {
                tracing::warn!(worker = %url, error = %e, "Progress unavailable, counting as 0");
                0.0
            }
        }
    });
    join_all(queries).await
}
