//! The brute-force scan over one assigned partition.
//!
//! [`TaskExecutor::execute`] walks every length `1..=max_length`, decodes
//! each offset of the part's range into a candidate and compares its digest
//! with the target. A match is announced immediately as a partial report;
//! the scan always runs to the end of the range and then sends exactly one
//! final report. Anything a partial send failed to deliver rides along in
//! the final report.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, RwLock};

use crackhash_core::digest::HashAlgorithm;
use crackhash_core::partition::{self, PartitionError};
use crackhash_core::protocol::{ResultReport, TaskAssignment, WorkerHealth};

use crate::sink::{ResultSink, SinkError};

/// Candidates scanned between two cooperative yields.
pub const YIELD_EVERY: u64 = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error(transparent)]
    Partition(#[from] PartitionError),

    #[error("target '{hash}' is not a {algorithm} digest")]
    InvalidHash {
        hash: String,
        algorithm: HashAlgorithm,
    },

    #[error("failed to deliver final report: {0}")]
    Sink(#[from] SinkError),
}

/// `processed / total` counters of the current (or last) scan.
///
/// They are not reset when a scan ends, so a finished worker keeps
/// reporting 1.0 until it starts its next task.
#[derive(Debug, Default)]
pub struct ScanProgress {
    processed: AtomicU64,
    total: AtomicU64,
}

impl ScanProgress {
    pub fn fraction(&self) -> f64 {
        let total = self.total.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        let processed = self.processed.load(Ordering::Relaxed);
        processed as f64 / total as f64
    }

    fn start(&self, total: u64) {
        self.processed.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
    }

    fn set_processed(&self, processed: u64) {
        self.processed.store(processed, Ordering::Relaxed);
    }
}

pub struct TaskExecutor {
    algorithm: HashAlgorithm,
    progress: ScanProgress,
    current: RwLock<Option<TaskAssignment>>,
    scan_lock: Mutex<()>,
}

impl TaskExecutor {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            progress: ScanProgress::default(),
            current: RwLock::new(None),
            scan_lock: Mutex::new(()),
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Fraction of the current scan done, `0.0` before the first task.
    pub fn progress(&self) -> f64 {
        self.progress.fraction()
    }

    /// Liveness answer: the assignment being scanned, if any.
    pub async fn health(&self) -> WorkerHealth {
        match self.current.read().await.as_ref() {
            Some(assignment) => WorkerHealth::Busy {
                assignment: assignment.clone(),
            },
            None => WorkerHealth::Idle,
        }
    }

    /// Raw target digest of `task`, or why it cannot be scanned.
    pub fn check(&self, task: &TaskAssignment) -> Result<Vec<u8>, ExecuteError> {
        task.validate()?;
        self.algorithm
            .decode_target(&task.hash)
            .map_err(|_| ExecuteError::InvalidHash {
                hash: task.hash.clone(),
                algorithm: self.algorithm,
            })
    }

    /// Scan the whole partition of `task`, reporting through `sink`.
    ///
    /// Scans are serialized: a second call waits until the first finishes.
    /// Returns the final report once it has been delivered.
    pub async fn execute(
        &self,
        task: &TaskAssignment,
        sink: &dyn ResultSink,
    ) -> Result<ResultReport, ExecuteError> {
        let target = self.check(task)?;
        let ranges = partition::part_ranges(task.part_number, task.part_count, task.max_length)?;
        let total: u64 = ranges.iter().map(|(_, r)| r.end - r.start).sum();

        let _scan = self.scan_lock.lock().await;
        *self.current.write().await = Some(task.clone());
        self.progress.start(total);
        tracing::info!(
            request_id = %task.request_id,
            part = task.part_number,
            parts = task.part_count,
            total,
            "Scan started",
        );

        let mut unreported = Vec::new();
        let mut processed: u64 = 0;
        let mut candidate = String::with_capacity(task.max_length as usize);

        for (length, range) in ranges {
            for num in range {
                partition::decode_into(num, length, &mut candidate);
                if self.algorithm.matches(candidate.as_bytes(), &target) {
                    tracing::info!(
                        request_id = %task.request_id,
                        part = task.part_number,
                        candidate = %candidate,
                        "Match found",
                    );
                    let partial = ResultReport::partial(task, vec![candidate.clone()]);
                    if let Err(e) = sink.send(&partial).await {
                        tracing::warn!(
                            request_id = %task.request_id,
                            error = %e,
                            "Partial report not delivered, deferring to final report",
                        );
                        unreported.push(candidate.clone());
                    }
                }

                processed += 1;
                if processed % YIELD_EVERY == 0 {
                    self.progress.set_processed(processed);
                    tokio::task::yield_now().await;
                }
            }
        }
        self.progress.set_processed(processed);

        let report = ResultReport::final_report(task, unreported);
        let sent = sink.send(&report).await;
        *self.current.write().await = None;

        match sent {
            Ok(()) => {
                tracing::info!(
                    request_id = %task.request_id,
                    part = task.part_number,
                    "Scan finished",
                );
                Ok(report)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex as StdMutex;

    use assert_matches::assert_matches;
    use async_trait::async_trait;

    use super::*;

    /// md5("ab")
    const AB_MD5: &str = "187ef4436122d1cc2f40dc2b92f0eba0";

    #[derive(Default)]
    struct CollectingSink {
        reports: StdMutex<Vec<ResultReport>>,
        fail_partials: AtomicBool,
    }

    impl CollectingSink {
        fn reports(&self) -> Vec<ResultReport> {
            self.reports.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ResultSink for CollectingSink {
        async fn send(&self, report: &ResultReport) -> Result<(), SinkError> {
            if report.partial && self.fail_partials.load(Ordering::Relaxed) {
                return Err(SinkError::Status {
                    status: reqwest::StatusCode::BAD_GATEWAY,
                    body: String::new(),
                });
            }
            self.reports.lock().unwrap().push(report.clone());
            Ok(())
        }
    }

    fn task(part_number: u32, part_count: u32) -> TaskAssignment {
        TaskAssignment {
            request_id: "req-1".into(),
            hash: AB_MD5.into(),
            max_length: 2,
            part_number,
            part_count,
        }
    }

    #[test]
    fn progress_is_zero_before_any_task() {
        let executor = TaskExecutor::new(HashAlgorithm::Md5);
        assert_eq!(executor.progress(), 0.0);
    }

    #[tokio::test]
    async fn match_is_reported_partially_then_closed_by_empty_final() {
        let executor = TaskExecutor::new(HashAlgorithm::Md5);
        let sink = CollectingSink::default();

        let report = executor.execute(&task(0, 1), &sink).await.unwrap();
        assert!(report.is_final());
        assert!(report.results.is_empty());

        let reports = sink.reports();
        assert_eq!(reports.len(), 2);
        assert!(reports[0].partial);
        assert_eq!(reports[0].results, vec!["ab".to_string()]);
        assert!(reports[1].is_final());
        assert_eq!(executor.progress(), 1.0);
    }

    #[tokio::test]
    async fn only_the_owning_part_finds_the_match() {
        // "ab" is offset 36 at length 2, inside part 0's [0, 432).
        let executor = TaskExecutor::new(HashAlgorithm::Md5);
        for part in 0..3 {
            let sink = CollectingSink::default();
            executor.execute(&task(part, 3), &sink).await.unwrap();
            let found: Vec<_> = sink
                .reports()
                .into_iter()
                .flat_map(|r| r.results)
                .collect();
            if part == 0 {
                assert_eq!(found, vec!["ab".to_string()]);
            } else {
                assert!(found.is_empty(), "part {part} found {found:?}");
            }
        }
    }

    #[tokio::test]
    async fn failed_partial_is_carried_by_final_report() {
        let executor = TaskExecutor::new(HashAlgorithm::Md5);
        let sink = CollectingSink::default();
        sink.fail_partials.store(true, Ordering::Relaxed);

        let report = executor.execute(&task(0, 1), &sink).await.unwrap();
        assert_eq!(report.results, vec!["ab".to_string()]);
        assert_eq!(sink.reports().len(), 1);
    }

    #[tokio::test]
    async fn worker_is_idle_after_scan() {
        let executor = TaskExecutor::new(HashAlgorithm::Md5);
        executor
            .execute(&task(1, 2), &CollectingSink::default())
            .await
            .unwrap();
        assert_eq!(executor.health().await, WorkerHealth::Idle);
    }

    #[tokio::test]
    async fn rejects_invalid_assignments() {
        let executor = TaskExecutor::new(HashAlgorithm::Md5);
        let sink = CollectingSink::default();

        assert_matches!(
            executor.execute(&task(3, 3), &sink).await,
            Err(ExecuteError::Partition(PartitionError::PartOutOfRange { .. }))
        );

        let mut bad = task(0, 1);
        bad.hash = "xyz".into();
        assert_matches!(
            executor.execute(&bad, &sink).await,
            Err(ExecuteError::InvalidHash { .. })
        );

        let sha = TaskExecutor::new(HashAlgorithm::Sha256);
        assert_matches!(
            sha.execute(&task(0, 1), &sink).await,
            Err(ExecuteError::InvalidHash { .. })
        );
        assert!(sink.reports().is_empty());
    }
}
