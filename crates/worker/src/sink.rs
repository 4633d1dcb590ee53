//! Result delivery from a worker back to the manager.
//!
//! [`HttpResultSink`] PATCHes each report to the manager's ingestion
//! endpoint; [`QueueResultSink`] pushes it onto the shared results queue.
//! Both carry the same encoded [`ResultReport`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;

use crackhash_core::error::CoreError;
use crackhash_core::protocol::{ResultReport, MANAGER_RESULT_PATH};
use crackhash_core::queue::{MessageQueue, QueueError};
use crackhash_core::retry::RetryPolicy;

/// Timeout of a single result PATCH.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error(transparent)]
    Encode(#[from] CoreError),

    #[error("result request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("manager answered {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error(transparent)]
    Queue(#[from] QueueError),
}

#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn send(&self, report: &ResultReport) -> Result<(), SinkError>;
}

/// Direct mode: PATCH `{manager}/internal/api/manager/hash/crack/request`.
pub struct HttpResultSink {
    client: reqwest::Client,
    url: String,
    retry: RetryPolicy,
}

impl HttpResultSink {
    pub fn new(manager_url: &str, retry: RetryPolicy) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_SEND_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            url: format!("{}{MANAGER_RESULT_PATH}", manager_url.trim_end_matches('/')),
            retry,
        })
    }

    async fn patch_once(&self, body: &str) -> Result<(), SinkError> {
        let response = self
            .client
            .patch(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(SinkError::Status { status, body })
    }
}

#[async_trait]
impl ResultSink for HttpResultSink {
    async fn send(&self, report: &ResultReport) -> Result<(), SinkError> {
        let body = report.encode()?;
        self.retry
            .run("send result", |_| self.patch_once(&body))
            .await
    }
}

/// Queue mode: push onto the results queue.
pub struct QueueResultSink {
    queue: Arc<dyn MessageQueue>,
}

impl QueueResultSink {
    pub fn new(queue: Arc<dyn MessageQueue>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl ResultSink for QueueResultSink {
    async fn send(&self, report: &ResultReport) -> Result<(), SinkError> {
        self.queue.push(report.encode()?).await?;
        Ok(())
    }
}
