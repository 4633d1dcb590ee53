//! Transient, process-local Request Store.
//!
//! Records live behind one `Mutex` each; the table lock is only held long
//! enough to look a record up, never while a record is being mutated. Once
//! more than `max_requests` records are tracked, the oldest terminal ones
//! are evicted. In-flight requests are never evicted, so the table may
//! temporarily exceed the ceiling.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use super::{RequestStore, StoreError};
use crate::protocol::ResultReport;
use crate::request::{CrackRequest, NewCrackRequest, Transition, UpdateOutcome};
use crate::status::RequestStatus;
use crate::types::{RequestId, Timestamp};

/// Default retention ceiling.
pub const DEFAULT_MAX_REQUESTS: usize = 1000;

type Record = Arc<Mutex<CrackRequest>>;

#[derive(Default)]
struct Table {
    records: HashMap<RequestId, Record>,
    /// Creation order, oldest first.
    order: VecDeque<RequestId>,
}

pub struct MemoryRequestStore {
    table: RwLock<Table>,
    max_requests: usize,
}

impl Default for MemoryRequestStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS)
    }
}

impl MemoryRequestStore {
    pub fn new(max_requests: usize) -> Self {
        Self {
            table: RwLock::new(Table::default()),
            max_requests: max_requests.max(1),
        }
    }

    /// Number of tracked requests.
    pub async fn len(&self) -> usize {
        self.table.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Timeout sweep against an explicit clock.
    pub async fn sweep_timeouts_at(&self, now: Timestamp) -> u64 {
        let records: Vec<Record> = self.table.read().await.records.values().cloned().collect();
        let mut expired = 0;
        for record in records {
            let mut request = record.lock().await;
            if request.expire(now) {
                tracing::warn!(request_id = %request.request_id, "Crack request timed out");
                expired += 1;
            }
        }
        expired
    }

    async fn record(&self, request_id: &str) -> Option<Record> {
        self.table.read().await.records.get(request_id).cloned()
    }

    /// Drop the oldest terminal records until the table fits the ceiling.
    async fn evict(&self, table: &mut Table) {
        let mut index = 0;
        while table.records.len() > self.max_requests && index < table.order.len() {
            let id = &table.order[index];
            let terminal = match table.records.get(id) {
                Some(record) => record.lock().await.status.is_terminal(),
                None => true,
            };
            if terminal {
                if let Some(id) = table.order.remove(index) {
                    table.records.remove(&id);
                    tracing::debug!(request_id = %id, "Evicted crack request from memory store");
                }
            } else {
                index += 1;
            }
        }
        if table.records.len() > self.max_requests {
            tracing::warn!(
                tracked = table.records.len(),
                max_requests = self.max_requests,
                "Memory store over capacity, all older requests still in flight",
            );
        }
    }
}

#[async_trait]
impl RequestStore for MemoryRequestStore {
    async fn create(&self, input: NewCrackRequest) -> Result<CrackRequest, StoreError> {
        let mut table = self.table.write().await;
        if table.records.contains_key(&input.request_id) {
            return Err(StoreError::Duplicate(input.request_id));
        }
        let request = CrackRequest::new(input, Utc::now());
        let snapshot = request.clone();
        table.order.push_back(request.request_id.clone());
        table
            .records
            .insert(request.request_id.clone(), Arc::new(Mutex::new(request)));
        self.evict(&mut table).await;
        Ok(snapshot)
    }

    async fn get(&self, request_id: &str) -> Result<Option<CrackRequest>, StoreError> {
        match self.record(request_id).await {
            Some(record) => Ok(Some(record.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn set_status(
        &self,
        request_id: &str,
        status: RequestStatus,
    ) -> Result<Transition, StoreError> {
        let record = self
            .record(request_id)
            .await
            .ok_or_else(|| StoreError::NotFound(request_id.to_string()))?;
        let mut request = record.lock().await;
        Ok(request.transition(status)?)
    }

    async fn update(&self, report: &ResultReport) -> Result<UpdateOutcome, StoreError> {
        let Some(record) = self.record(&report.request_id).await else {
            return Ok(UpdateOutcome::UnknownRequest);
        };
        let mut request = record.lock().await;
        Ok(request.apply_report(report))
    }

    async fn check_timeouts(&self) -> Result<u64, StoreError> {
        Ok(self.sweep_timeouts_at(Utc::now()).await)
    }

    async fn mark_failed(&self, request_id: &str) -> Result<Transition, StoreError> {
        let record = self
            .record(request_id)
            .await
            .ok_or_else(|| StoreError::NotFound(request_id.to_string()))?;
        let mut request = record.lock().await;
        Ok(request.fail())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Duration;

    use super::*;
    use crate::status::TransitionError;

    fn new_request(id: &str, part_count: u32) -> NewCrackRequest {
        NewCrackRequest {
            request_id: id.to_string(),
            hash: "187ef4436122d1cc2f40dc2b92f0eba0".to_string(),
            max_length: 2,
            part_count,
            timeout_secs: 30,
        }
    }

    fn final_report(id: &str, part: u32, count: u32, results: &[&str]) -> ResultReport {
        ResultReport {
            request_id: id.to_string(),
            part_number: part,
            part_count: count,
            results: results.iter().map(|s| s.to_string()).collect(),
            partial: false,
        }
    }

    async fn started(store: &MemoryRequestStore, id: &str, part_count: u32) {
        store.create(new_request(id, part_count)).await.unwrap();
        store.set_status(id, RequestStatus::InProgress).await.unwrap();
    }

    #[tokio::test]
    async fn create_then_get_returns_new_request() {
        let store = MemoryRequestStore::default();
        store.create(new_request("a", 3)).await.unwrap();

        let request = store.get("a").await.unwrap().unwrap();
        assert_eq!(request.status, RequestStatus::New);
        assert_eq!(request.part_count, 3);
        assert_eq!(request.parts_received(), 0);
        assert!(request.results.is_empty());
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_create_rejected() {
        let store = MemoryRequestStore::default();
        store.create(new_request("a", 1)).await.unwrap();
        assert_matches!(
            store.create(new_request("a", 1)).await,
            Err(StoreError::Duplicate(id)) if id == "a"
        );
    }

    #[tokio::test]
    async fn set_status_is_compare_and_set() {
        let store = MemoryRequestStore::default();
        store.create(new_request("a", 1)).await.unwrap();
        assert_eq!(
            store.set_status("a", RequestStatus::InProgress).await.unwrap(),
            Transition::Applied
        );
        assert_eq!(
            store.set_status("a", RequestStatus::InProgress).await.unwrap(),
            Transition::Unchanged
        );
        assert_matches!(
            store.set_status("missing", RequestStatus::InProgress).await,
            Err(StoreError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn duplicate_final_report_counts_once() {
        let store = MemoryRequestStore::default();
        started(&store, "a", 3).await;

        store.update(&final_report("a", 1, 3, &[])).await.unwrap();
        let before = store.get("a").await.unwrap().unwrap().parts_received();
        let outcome = store.update(&final_report("a", 1, 3, &[])).await.unwrap();

        assert_eq!(outcome, UpdateOutcome::DuplicatePart);
        let after = store.get("a").await.unwrap().unwrap().parts_received();
        assert_eq!(before, 1);
        assert_eq!(after, 1);
    }

    #[tokio::test]
    async fn ready_after_every_part_reports() {
        let store = MemoryRequestStore::default();
        started(&store, "a", 3).await;

        for part in [0, 2] {
            store.update(&final_report("a", part, 3, &[])).await.unwrap();
            assert_eq!(
                store.get("a").await.unwrap().unwrap().status,
                RequestStatus::InProgress
            );
        }
        let outcome = store.update(&final_report("a", 1, 3, &["ab"])).await.unwrap();
        assert_eq!(outcome, UpdateOutcome::Applied { counted: true, completed: true });

        let request = store.get("a").await.unwrap().unwrap();
        assert_eq!(request.status, RequestStatus::Ready);
        assert_eq!(request.results.iter().collect::<Vec<_>>(), vec!["ab"]);
    }

    #[tokio::test]
    async fn concurrent_final_reports_reach_ready_once() {
        let store = Arc::new(MemoryRequestStore::default());
        started(&store, "a", 8).await;

        let handles: Vec<_> = (0..8u32)
            .flat_map(|part| [part, part])
            .map(|part| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.update(&final_report("a", part, 8, &[])).await })
            })
            .collect();

        let mut completions = 0;
        for handle in handles {
            if let UpdateOutcome::Applied { completed: true, .. } = handle.await.unwrap().unwrap() {
                completions += 1;
            }
        }
        assert_eq!(completions, 1);
        assert_eq!(store.get("a").await.unwrap().unwrap().parts_received(), 8);
    }

    #[tokio::test]
    async fn unknown_request_update_is_reported() {
        let store = MemoryRequestStore::default();
        assert_eq!(
            store.update(&final_report("nope", 0, 1, &[])).await.unwrap(),
            UpdateOutcome::UnknownRequest
        );
    }

    #[tokio::test]
    async fn timeout_sweep_moves_stale_request_to_error_for_good() {
        let store = MemoryRequestStore::default();
        started(&store, "a", 1).await;
        store.create(new_request("b", 1)).await.unwrap();

        let later = Utc::now() + Duration::seconds(31);
        assert_eq!(store.sweep_timeouts_at(later).await, 1);

        let a = store.get("a").await.unwrap().unwrap();
        assert_eq!(a.status, RequestStatus::Error);
        // NEW requests are not swept.
        assert_eq!(store.get("b").await.unwrap().unwrap().status, RequestStatus::New);

        // Late results do not resurrect it.
        let outcome = store.update(&final_report("a", 0, 1, &["ab"])).await.unwrap();
        assert_eq!(outcome, UpdateOutcome::Ignored(RequestStatus::Error));
        assert_matches!(
            store.set_status("a", RequestStatus::InProgress).await,
            Err(StoreError::Transition(TransitionError::Terminal(RequestStatus::Error)))
        );
        assert_eq!(store.sweep_timeouts_at(later).await, 0);
    }

    #[tokio::test]
    async fn mark_failed_only_affects_live_requests() {
        let store = MemoryRequestStore::default();
        started(&store, "a", 1).await;
        assert_eq!(store.mark_failed("a").await.unwrap(), Transition::Applied);
        assert_eq!(store.mark_failed("a").await.unwrap(), Transition::Unchanged);
        assert_eq!(store.get("a").await.unwrap().unwrap().status, RequestStatus::Error);
    }

    #[tokio::test]
    async fn eviction_drops_oldest_terminal_first() {
        let store = MemoryRequestStore::new(2);
        started(&store, "old-live", 1).await;
        started(&store, "old-done", 1).await;
        store.update(&final_report("old-done", 0, 1, &[])).await.unwrap();

        store.create(new_request("new", 1)).await.unwrap();

        assert_eq!(store.len().await, 2);
        assert!(store.get("old-live").await.unwrap().is_some());
        assert!(store.get("old-done").await.unwrap().is_none());
        assert!(store.get("new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn eviction_never_drops_in_flight_requests() {
        let store = MemoryRequestStore::new(1);
        started(&store, "a", 1).await;
        started(&store, "b", 1).await;
        assert_eq!(store.len().await, 2);
    }
}
