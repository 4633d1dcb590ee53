//! HTTP client for the worker endpoints.
//!
//! [`WorkerApi`] is the seam the dispatch loop, the health monitor and the
//! progress aggregation talk through; [`HttpWorkerClient`] implements it
//! with [`reqwest`]. Every method performs a single attempt. Retries are
//! applied by the callers through a `RetryPolicy`.

use std::time::Duration;

use async_trait::async_trait;

use crackhash_core::progress::parse_fraction;
use crackhash_core::protocol::{
    TaskAssignment, WorkerHealth, WORKER_HEALTH_PATH, WORKER_PROGRESS_PATH, WORKER_TASK_PATH,
};

/// Timeout for a single call to a worker.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from the worker HTTP API layer.
#[derive(Debug, thiserror::Error)]
pub enum WorkerClientError {
    /// The HTTP request itself failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The worker returned a non-2xx status code.
    #[error("Worker returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

#[async_trait]
pub trait WorkerApi: Send + Sync {
    /// Liveness probe; reports the worker's current assignment.
    async fn health(&self, worker_url: &str) -> Result<WorkerHealth, WorkerClientError>;

    /// Fraction of the worker's current (or last) scan, in `0.0..=1.0`.
    async fn progress(&self, worker_url: &str) -> Result<f64, WorkerClientError>;

    /// Hand an assignment to the worker.
    async fn send_task(
        &self,
        worker_url: &str,
        task: &TaskAssignment,
    ) -> Result<(), WorkerClientError>;
}

pub struct HttpWorkerClient {
    client: reqwest::Client,
}

impl HttpWorkerClient {
    pub fn new(call_timeout: Duration) -> Result<Self, WorkerClientError> {
        let client = reqwest::Client::builder().timeout(call_timeout).build()?;
        Ok(Self { client })
    }

    /// Reuse an existing client (shares its connection pool).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Return the response unchanged on success, or a
    /// [`WorkerClientError::Status`] with the body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, WorkerClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(WorkerClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl WorkerApi for HttpWorkerClient {
    async fn health(&self, worker_url: &str) -> Result<WorkerHealth, WorkerClientError> {
        let response = self
            .client
            .get(format!("{worker_url}{WORKER_HEALTH_PATH}"))
            .send()
            .await?;
        Ok(Self::ensure_success(response).await?.json().await?)
    }

    async fn progress(&self, worker_url: &str) -> Result<f64, WorkerClientError> {
        let response = self
            .client
            .get(format!("{worker_url}{WORKER_PROGRESS_PATH}"))
            .send()
            .await?;
        let text = Self::ensure_success(response).await?.text().await?;
        Ok(parse_fraction(&text))
    }

    async fn send_task(
        &self,
        worker_url: &str,
        task: &TaskAssignment,
    ) -> Result<(), WorkerClientError> {
        let response = self
            .client
            .post(format!("{worker_url}{WORKER_TASK_PATH}"))
            .json(task)
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }
}
