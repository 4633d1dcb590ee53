//! Periodic worker health monitoring with task resubmission.
//!
//! Every cycle probes each worker and caches what it reports. When a
//! worker that was last seen busy stops answering, its cached assignment
//! is resubmitted verbatim and the worker is marked unavailable. An
//! unavailable worker gets a single probe per cycle and no further
//! resubmission until a probe succeeds again.
//!
//! A part resubmitted to a busy worker waits in that worker's backlog,
//! where its health answer does not show it. The monitor keeps such
//! handoffs per worker and resubmits them too if that worker goes silent.
//! Handoffs are dropped once their part is settled.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crackhash_core::protocol::{TaskAssignment, WorkerHealth};
use crackhash_core::retry::RetryPolicy;
use crackhash_core::store::RequestStore;

use crate::client::WorkerApi;
use crate::delivery::TaskDelivery;
use crate::engine::health::probe;
use crate::pool::WorkerPool;

/// Last known state of one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerRecord {
    Idle,
    Assigned(TaskAssignment),
    Unavailable,
}

/// Result of probing one worker in one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Healthy,
    /// Went silent while holding assignments, which were resubmitted.
    Resubmitted(Vec<TaskAssignment>),
    /// Went silent with nothing (left) to resubmit.
    Lost,
    /// Still silent after an earlier failure.
    StillUnavailable,
}

pub struct HealthMonitor {
    workers: Arc<dyn WorkerApi>,
    pool: Arc<WorkerPool>,
    delivery: Arc<TaskDelivery>,
    store: Arc<dyn RequestStore>,
    retry: RetryPolicy,
    interval: Duration,
    records: Mutex<HashMap<String, WorkerRecord>>,
    /// Parts resubmitted to each worker in direct mode.
    handoffs: Mutex<HashMap<String, Vec<TaskAssignment>>>,
}

impl HealthMonitor {
    pub fn new(
        workers: Arc<dyn WorkerApi>,
        pool: Arc<WorkerPool>,
        delivery: Arc<TaskDelivery>,
        store: Arc<dyn RequestStore>,
        retry: RetryPolicy,
        interval: Duration,
    ) -> Self {
        Self {
            workers,
            pool,
            delivery,
            store,
            retry,
            interval,
            records: Mutex::new(HashMap::new()),
            handoffs: Mutex::new(HashMap::new()),
        }
    }

    /// Cached state of a worker, if it has been probed.
    pub async fn record(&self, url: &str) -> Option<WorkerRecord> {
        self.records.lock().await.get(url).cloned()
    }

    /// Parts resubmitted to `url` and not yet known to be settled.
    pub async fn handoffs(&self, url: &str) -> Vec<TaskAssignment> {
        self.handoffs
            .lock()
            .await
            .get(url)
            .cloned()
            .unwrap_or_default()
    }

    /// Run the monitor loop until `cancel` is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            workers = self.pool.size(),
            interval_secs = self.interval.as_secs(),
            "Worker health monitor started",
        );

        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Worker health monitor stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.check_all().await;
                }
            }
        }
    }

    /// One monitoring cycle over the whole pool.
    pub async fn check_all(&self) -> Vec<(String, ProbeOutcome)> {
        let checks = self.pool.urls().iter().map(|url| async move {
            let outcome = self.check_worker(url).await;
            (url.clone(), outcome)
        });
        join_all(checks).await
    }

    async fn check_worker(&self, url: &str) -> ProbeOutcome {
        let previous = self.record(url).await;
        let retry = if previous == Some(WorkerRecord::Unavailable) {
            RetryPolicy::once()
        } else {
            self.retry
        };

        match probe(self.workers.as_ref(), url, retry).await {
            Ok(health) => {
                if previous == Some(WorkerRecord::Unavailable) {
                    tracing::info!(worker = url, "Worker is reachable again");
                }
                let record = match health {
                    WorkerHealth::Idle => WorkerRecord::Idle,
                    WorkerHealth::Busy { assignment } => WorkerRecord::Assigned(assignment),
                };
                self.records.lock().await.insert(url.to_string(), record);
                self.prune_handoffs(url).await;
                ProbeOutcome::Healthy
            }
            Err(e) => {
                self.records
                    .lock()
                    .await
                    .insert(url.to_string(), WorkerRecord::Unavailable);
                let mut orphaned = self.handoffs.lock().await.remove(url).unwrap_or_default();
                if previous == Some(WorkerRecord::Unavailable) && orphaned.is_empty() {
                    return ProbeOutcome::StillUnavailable;
                }
                if let Some(WorkerRecord::Assigned(task)) = previous {
                    if !orphaned.contains(&task) {
                        orphaned.insert(0, task);
                    }
                }
                if orphaned.is_empty() {
                    tracing::error!(worker = url, error = %e, "Worker unavailable");
                    return ProbeOutcome::Lost;
                }

                tracing::error!(
                    worker = url,
                    error = %e,
                    tasks = orphaned.len(),
                    "Worker unavailable, resubmitting its tasks",
                );
                let mut resubmitted = Vec::new();
                for task in orphaned {
                    if self.resubmit(&task, url).await {
                        resubmitted.push(task);
                    }
                }
                if resubmitted.is_empty() {
                    ProbeOutcome::Lost
                } else {
                    ProbeOutcome::Resubmitted(resubmitted)
                }
            }
        }
    }

    /// Drop handoffs to `url` whose part no longer needs scanning.
    async fn prune_handoffs(&self, url: &str) {
        let pending = self.handoffs.lock().await.remove(url).unwrap_or_default();
        if pending.is_empty() {
            return;
        }
        let mut kept = Vec::new();
        for task in pending {
            if !self.is_settled(&task).await {
                kept.push(task);
            }
        }
        if !kept.is_empty() {
            self.handoffs
                .lock()
                .await
                .entry(url.to_string())
                .or_default()
                .extend(kept);
        }
    }

    /// Whether the request no longer needs `task`'s part.
    async fn is_settled(&self, task: &TaskAssignment) -> bool {
        match self.store.get(&task.request_id).await {
            Ok(Some(request)) => {
                request.status.is_terminal() || request.received_parts.contains(&task.part_number)
            }
            Ok(None) => true,
            Err(e) => {
                // Assume not; a duplicate final report is harmless.
                tracing::warn!(error = %e, "Could not check request before resubmitting");
                false
            }
        }
    }

    /// Resubmit unless the request no longer needs the part. Returns
    /// whether the assignment was handed out again.
    async fn resubmit(&self, task: &TaskAssignment, failed_worker: &str) -> bool {
        if self.is_settled(task).await {
            tracing::debug!(
                request_id = %task.request_id,
                part_number = task.part_number,
                "Part already settled, not resubmitting",
            );
            return false;
        }

        match self.delivery.resubmit(task, failed_worker).await {
            Ok(Some(taken_by)) => {
                self.handoffs
                    .lock()
                    .await
                    .entry(taken_by)
                    .or_default()
                    .push(task.clone());
                true
            }
            Ok(None) => true,
            Err(e) => {
                tracing::error!(
                    request_id = %task.request_id,
                    part_number = task.part_number,
                    error = %e,
                    "Task resubmission failed",
                );
                false
            }
        }
    }
}
