//! Task delivery strategies.
//!
//! Direct mode POSTs part `i` to worker `i`; queue mode pushes every part
//! onto the shared task queue and lets any idle worker take it.

use std::sync::Arc;

use crackhash_core::protocol::TaskAssignment;
use crackhash_core::queue::{JsonQueue, QueueError};
use crackhash_core::retry::RetryPolicy;

use crate::client::{WorkerApi, WorkerClientError};
use crate::pool::WorkerPool;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("no worker configured for part {0}")]
    NoWorker(u32),

    #[error("worker {url} rejected the task: {source}")]
    Worker {
        url: String,
        #[source]
        source: WorkerClientError,
    },

    #[error(transparent)]
    Queue(#[from] QueueError),
}

pub enum TaskDelivery {
    Direct {
        pool: Arc<WorkerPool>,
        workers: Arc<dyn WorkerApi>,
        retry: RetryPolicy,
    },
    Queue {
        tasks: JsonQueue<TaskAssignment>,
    },
}

impl TaskDelivery {
    /// Deliver a freshly planned assignment to its worker.
    pub async fn deliver(&self, task: &TaskAssignment) -> Result<(), DeliveryError> {
        match self {
            TaskDelivery::Direct {
                pool,
                workers,
                retry,
            } => {
                let url = pool
                    .url_for_part(task.part_number)
                    .ok_or(DeliveryError::NoWorker(task.part_number))?;
                send_with_retry(workers.as_ref(), *retry, url, task).await
            }
            TaskDelivery::Queue { tasks } => Ok(tasks.push(task).await?),
        }
    }

    /// Redeliver an assignment whose worker went silent.
    ///
    /// In direct mode the other workers are tried in turn, one attempt
    /// each; a busy worker queues the task behind its current scan. The
    /// worker that took it is returned. In queue mode the assignment is
    /// pushed back onto the task queue and `None` is returned.
    pub async fn resubmit(
        &self,
        task: &TaskAssignment,
        failed_worker: &str,
    ) -> Result<Option<String>, DeliveryError> {
        match self {
            TaskDelivery::Direct { pool, workers, .. } => {
                let mut last = DeliveryError::NoWorker(task.part_number);
                for url in pool.others(failed_worker) {
                    match send_with_retry(workers.as_ref(), RetryPolicy::once(), url, task).await {
                        Ok(()) => {
                            tracing::info!(
                                request_id = %task.request_id,
                                part_number = task.part_number,
                                worker = url,
                                "Task resubmitted to another worker",
                            );
                            return Ok(Some(url.to_string()));
                        }
                        Err(e) => last = e,
                    }
                }
                Err(last)
            }
            TaskDelivery::Queue { tasks } => {
                tasks.push(task).await?;
                Ok(None)
            }
        }
    }
}

async fn send_with_retry(
    workers: &dyn WorkerApi,
    retry: RetryPolicy,
    url: &str,
    task: &TaskAssignment,
) -> Result<(), DeliveryError> {
    retry
        .run("task dispatch", |_| workers.send_task(url, task))
        .await
        .map_err(|source| DeliveryError::Worker {
            url: url.to_string(),
            source,
        })
}
