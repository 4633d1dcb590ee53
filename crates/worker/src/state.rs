use std::sync::Arc;

use tokio::sync::mpsc;

use crackhash_core::protocol::TaskAssignment;

use crate::executor::TaskExecutor;

/// Shared state handed to every worker handler.
#[derive(Clone)]
pub struct WorkerState {
    pub executor: Arc<TaskExecutor>,
    /// Backlog feeding the local runner; tasks POSTed by the manager land here.
    pub tasks: mpsc::Sender<TaskAssignment>,
}
