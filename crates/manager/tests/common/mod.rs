#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use crackhash_core::digest::HashAlgorithm;
use crackhash_core::protocol::{IntakeMessage, TaskAssignment, WorkerHealth, INTAKE_QUEUE};
use crackhash_core::queue::JsonQueue;
use crackhash_core::retry::RetryPolicy;
use crackhash_core::store::MemoryRequestStore;
use crackhash_manager::client::{WorkerApi, WorkerClientError};
use crackhash_manager::config::{CrackConfig, DeliveryMode, ServerConfig};
use crackhash_manager::pool::WorkerPool;
use crackhash_manager::router::build_app_router;
use crackhash_manager::state::AppState;
use crackhash_queue::MemoryQueue;

/// md5("ab")
pub const AB_MD5: &str = "187ef4436122d1cc2f40dc2b92f0eba0";

pub fn worker_urls(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("http://worker-{i}:8080")).collect()
}

/// Retries fast enough for tests.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(1, Duration::from_millis(1))
}

pub fn test_server_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
    }
}

pub fn test_crack_config(urls: Vec<String>) -> CrackConfig {
    CrackConfig {
        worker_urls: urls,
        delivery_mode: DeliveryMode::Direct,
        retry: fast_retry(),
        poll_interval: Duration::from_millis(10),
        healthcheck_interval: Duration::from_millis(50),
        request_timeout_secs: 30_000,
        store_max_requests: 100,
        hash_algorithm: HashAlgorithm::Md5,
        database_url: None,
        queue_visibility: Duration::from_secs(60),
    }
}

// ---------------------------------------------------------------------------
// Scriptable worker pool
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeState {
    down: HashSet<String>,
    busy: HashMap<String, TaskAssignment>,
    progress: HashMap<String, f64>,
    reject_tasks: bool,
    sent: Vec<(String, TaskAssignment)>,
    health_calls: HashMap<String, u32>,
}

/// In-memory [`WorkerApi`] whose answers are set by the test.
#[derive(Default)]
pub struct FakeWorkers {
    state: Mutex<FakeState>,
}

impl FakeWorkers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_down(&self, url: &str, down: bool) {
        let mut state = self.state.lock().unwrap();
        if down {
            state.down.insert(url.to_string());
        } else {
            state.down.remove(url);
        }
    }

    pub fn set_busy(&self, url: &str, task: Option<TaskAssignment>) {
        let mut state = self.state.lock().unwrap();
        match task {
            Some(task) => state.busy.insert(url.to_string(), task),
            None => state.busy.remove(url),
        };
    }

    pub fn set_progress(&self, url: &str, fraction: f64) {
        self.state
            .lock()
            .unwrap()
            .progress
            .insert(url.to_string(), fraction);
    }

    pub fn reject_tasks(&self, reject: bool) {
        self.state.lock().unwrap().reject_tasks = reject;
    }

    /// Every task accepted so far, with the worker it went to.
    pub fn sent(&self) -> Vec<(String, TaskAssignment)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn health_calls(&self, url: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .health_calls
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    fn unreachable(url: &str) -> WorkerClientError {
        WorkerClientError::Status {
            status: 502,
            body: format!("{url} is down"),
        }
    }
}

#[async_trait]
impl WorkerApi for FakeWorkers {
    async fn health(&self, worker_url: &str) -> Result<WorkerHealth, WorkerClientError> {
        let mut state = self.state.lock().unwrap();
        *state.health_calls.entry(worker_url.to_string()).or_default() += 1;
        if state.down.contains(worker_url) {
            return Err(Self::unreachable(worker_url));
        }
        Ok(match state.busy.get(worker_url) {
            Some(assignment) => WorkerHealth::Busy {
                assignment: assignment.clone(),
            },
            None => WorkerHealth::Idle,
        })
    }

    async fn progress(&self, worker_url: &str) -> Result<f64, WorkerClientError> {
        let state = self.state.lock().unwrap();
        if state.down.contains(worker_url) {
            return Err(Self::unreachable(worker_url));
        }
        Ok(state.progress.get(worker_url).copied().unwrap_or(0.0))
    }

    async fn send_task(
        &self,
        worker_url: &str,
        task: &TaskAssignment,
    ) -> Result<(), WorkerClientError> {
        let mut state = self.state.lock().unwrap();
        if state.down.contains(worker_url) {
            return Err(Self::unreachable(worker_url));
        }
        if state.reject_tasks {
            return Err(WorkerClientError::Status {
                status: 503,
                body: "busy".into(),
            });
        }
        state.sent.push((worker_url.to_string(), task.clone()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// App wiring
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub store: Arc<MemoryRequestStore>,
    pub intake: Arc<MemoryQueue>,
    pub workers: Arc<FakeWorkers>,
}

/// Build the manager router over an in-process store and intake queue,
/// talking to `workers` for a pool of `pool_size`.
pub fn build_test_app(workers: Arc<FakeWorkers>, pool_size: usize) -> TestApp {
    let config = test_crack_config(worker_urls(pool_size));
    let store = Arc::new(MemoryRequestStore::new(config.store_max_requests));
    let intake = Arc::new(MemoryQueue::new(INTAKE_QUEUE));

    let state = AppState {
        store: store.clone(),
        pool: Arc::new(WorkerPool::new(config.worker_urls.clone())),
        workers: workers.clone(),
        intake: JsonQueue::<IntakeMessage>::new(intake.clone()),
        config: Arc::new(config),
    };
    let app = build_app_router(state.clone(), &test_server_config());

    TestApp {
        app,
        state,
        store,
        intake,
        workers,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn patch_text(app: Router, uri: &str, body: String) -> Response<Body> {
    let request = Request::builder()
        .method(Method::PATCH)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Poll `cond` every 10ms until it holds or `timeout` passes.
pub async fn wait_until<F, Fut>(timeout: Duration, mut cond: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond().await
}
