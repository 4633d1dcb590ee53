//! Loops feeding the executor.
//!
//! [`run_local`] drains the in-process backlog filled by the task endpoint.
//! [`QueueRunner`] pulls from the shared tasks queue and acknowledges a task
//! only after its final report was delivered, so a worker that dies
//! mid-scan leaves the task to be redelivered. The lease is renewed every
//! `lease_renewal` while the scan runs, which keeps a live worker's task
//! away from the other workers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crackhash_core::protocol::TaskAssignment;
use crackhash_core::queue::{AckHandle, JsonQueue, QueueError};

use crate::executor::{ExecuteError, TaskExecutor};
use crate::sink::ResultSink;

/// Default lease renewal period, well inside the default 60s visibility.
pub const DEFAULT_LEASE_RENEWAL: Duration = Duration::from_secs(20);

/// Run tasks from the local backlog one at a time until cancelled.
pub async fn run_local(
    executor: Arc<TaskExecutor>,
    mut tasks: mpsc::Receiver<TaskAssignment>,
    sink: Arc<dyn ResultSink>,
    cancel: CancellationToken,
) {
    tracing::info!("Local task runner started");
    loop {
        let task = tokio::select! {
            _ = cancel.cancelled() => break,
            task = tasks.recv() => match task {
                Some(task) => task,
                None => break,
            },
        };
        if let Err(e) = executor.execute(&task, sink.as_ref()).await {
            tracing::error!(
                request_id = %task.request_id,
                part = task.part_number,
                error = %e,
                "Task failed",
            );
        }
    }
    tracing::info!("Local task runner stopping");
}

pub struct QueueRunner {
    executor: Arc<TaskExecutor>,
    tasks: JsonQueue<TaskAssignment>,
    sink: Arc<dyn ResultSink>,
    poll_interval: Duration,
    lease_renewal: Duration,
}

impl QueueRunner {
    pub fn new(
        executor: Arc<TaskExecutor>,
        tasks: JsonQueue<TaskAssignment>,
        sink: Arc<dyn ResultSink>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            executor,
            tasks,
            sink,
            poll_interval,
            lease_renewal: DEFAULT_LEASE_RENEWAL,
        }
    }

    /// Renew task leases this often. Must be shorter than the task queue's
    /// visibility timeout.
    pub fn with_lease_renewal(mut self, lease_renewal: Duration) -> Self {
        self.lease_renewal = lease_renewal;
        self
    }

    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(queue = self.tasks.name(), "Queue task runner started");
        loop {
            let idle = match self.run_next().await {
                Ok(ran) => !ran,
                Err(e) => {
                    tracing::error!(error = %e, "Task queue poll failed");
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
        tracing::info!("Queue task runner stopping");
    }

    /// Pull and execute one task. Returns `false` when the queue is empty.
    pub async fn run_next(&self) -> Result<bool, QueueError> {
        let Some((task, handle)) = self.tasks.pull(false).await? else {
            return Ok(false);
        };

        let scan = self.executor.execute(&task, self.sink.as_ref());
        tokio::pin!(scan);
        let mut renew = tokio::time::interval_at(
            tokio::time::Instant::now() + self.lease_renewal,
            self.lease_renewal,
        );
        let result = loop {
            tokio::select! {
                result = &mut scan => break result,
                _ = renew.tick() => {
                    if let Some(handle) = &handle {
                        self.renew(handle, &task).await;
                    }
                }
            }
        };

        let ack = match result {
            Ok(_) => true,
            Err(e @ (ExecuteError::Partition(_) | ExecuteError::InvalidHash { .. })) => {
                tracing::error!(
                    request_id = %task.request_id,
                    error = %e,
                    "Dropping unscannable task",
                );
                true
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %task.request_id,
                    part = task.part_number,
                    error = %e,
                    "Final report not delivered, leaving task for redelivery",
                );
                false
            }
        };

        if ack {
            if let Some(handle) = &handle {
                self.tasks.ack(handle).await?;
            }
        }
        Ok(true)
    }

    async fn renew(&self, handle: &AckHandle, task: &TaskAssignment) {
        match self.tasks.extend(handle).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                request_id = %task.request_id,
                part = task.part_number,
                "Task lease lost, another worker may scan this part too",
            ),
            Err(e) => tracing::warn!(error = %e, "Task lease renewal failed"),
        }
    }
}
