use std::sync::Arc;

use crackhash_core::protocol::IntakeMessage;
use crackhash_core::queue::JsonQueue;
use crackhash_core::store::RequestStore;

use crate::client::WorkerApi;
use crate::config::CrackConfig;
use crate::pool::WorkerPool;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Request lifecycle store (in-process or Postgres).
    pub store: Arc<dyn RequestStore>,
    /// Worker pool; its size is the part count of new requests.
    pub pool: Arc<WorkerPool>,
    /// Client for worker health / progress / task endpoints.
    pub workers: Arc<dyn WorkerApi>,
    /// Channel the dispatch loop consumes.
    pub intake: JsonQueue<IntakeMessage>,
    pub config: Arc<CrackConfig>,
}
