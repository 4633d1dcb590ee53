//! Intake dispatch loop.
//!
//! Pulls submitted requests from the intake queue one at a time, fans the
//! request out to the workers, and holds the intake message until the
//! request is terminal. The message is acknowledged only then, so a
//! manager that dies mid-request leaves it to be redelivered. While it
//! waits the dispatcher renews the message's lease on every poll, so a
//! long request is never handed to another replica as long as this one
//! is alive. The poll interval must stay below the queue's visibility
//! timeout.
//!
//! Redelivery (or a second replica pulling the same message) is made
//! harmless by the status check: only the consumer whose
//! `set_status(IN_PROGRESS)` actually moved the request out of NEW
//! dispatches it. Everyone else just waits for the terminal state and
//! acknowledges.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crackhash_core::partition;
use crackhash_core::protocol::IntakeMessage;
use crackhash_core::queue::{AckHandle, JsonQueue, QueueError};
use crackhash_core::request::{CrackRequest, Transition};
use crackhash_core::status::RequestStatus;
use crackhash_core::store::{RequestStore, StoreError};

use crate::delivery::TaskDelivery;

/// Default polling interval for the dispatcher loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// What happened to one intake message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// This consumer dispatched the request and saw it finish.
    Dispatched(RequestStatus),
    /// Another consumer had already advanced the request.
    Duplicate(RequestStatus),
    /// The request id is not in the store.
    Unknown,
}

pub struct Dispatcher {
    store: Arc<dyn RequestStore>,
    intake: JsonQueue<IntakeMessage>,
    delivery: Arc<TaskDelivery>,
    poll_interval: Duration,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn RequestStore>,
        intake: JsonQueue<IntakeMessage>,
        delivery: Arc<TaskDelivery>,
    ) -> Self {
        Self {
            store,
            intake,
            delivery,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run the dispatcher loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            queue = self.intake.name(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Dispatcher started",
        );

        loop {
            let idle = match self.process_next(&cancel).await {
                Ok(Some(outcome)) => {
                    tracing::debug!(?outcome, "Intake message processed");
                    false
                }
                Ok(None) => true,
                Err(e) => {
                    tracing::error!(error = %e, "Dispatch cycle failed");
                    true
                }
            };
            if cancel.is_cancelled() {
                break;
            }
            if idle {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }
        tracing::info!("Dispatcher shutting down");
    }

    /// Take one intake message, handle it, and acknowledge it.
    ///
    /// Returns `None` when the queue is empty, or when cancellation
    /// interrupted the wait (the message is then left for redelivery).
    pub async fn process_next(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<IntakeOutcome>, DispatchError> {
        let Some((message, handle)) = self.intake.pull(false).await? else {
            return Ok(None);
        };

        let Some(outcome) = self.handle(&message, handle.as_ref(), cancel).await? else {
            return Ok(None);
        };

        if let Some(handle) = handle {
            self.intake.ack(&handle).await?;
        }
        Ok(Some(outcome))
    }

    async fn handle(
        &self,
        message: &IntakeMessage,
        handle: Option<&AckHandle>,
        cancel: &CancellationToken,
    ) -> Result<Option<IntakeOutcome>, DispatchError> {
        let request_id = message.request_id.as_str();
        let Some(request) = self.store.get(request_id).await? else {
            tracing::warn!(request_id, "Intake message for unknown request dropped");
            return Ok(Some(IntakeOutcome::Unknown));
        };

        let claimed = request.status == RequestStatus::New
            && match self.store.set_status(request_id, RequestStatus::InProgress).await {
                Ok(Transition::Applied) => true,
                Ok(Transition::Unchanged) | Err(StoreError::Transition(_)) => false,
                Err(e) => return Err(e.into()),
            };

        if claimed {
            tracing::info!(
                request_id,
                part_count = request.part_count,
                max_length = request.max_length,
                "Dispatching crack request",
            );
            self.dispatch(&request).await?;
        } else {
            tracing::debug!(
                request_id,
                status = %request.status,
                "Request already dispatched elsewhere, waiting for it to finish",
            );
        }

        let Some(status) = self.await_terminal(request_id, handle, cancel).await? else {
            return Ok(None);
        };
        Ok(Some(if claimed {
            IntakeOutcome::Dispatched(status)
        } else {
            IntakeOutcome::Duplicate(status)
        }))
    }

    /// Build every part's assignment and hand them out.
    ///
    /// Any part that cannot be delivered fails the whole request.
    async fn dispatch(&self, request: &CrackRequest) -> Result<(), DispatchError> {
        let assignments = match partition::plan_assignments(
            &request.request_id,
            &request.hash,
            request.max_length,
            request.part_count,
        ) {
            Ok(assignments) => assignments,
            Err(e) => {
                tracing::error!(request_id = %request.request_id, error = %e, "Cannot partition request");
                self.store.mark_failed(&request.request_id).await?;
                return Ok(());
            }
        };

        let deliveries = assignments.iter().map(|task| self.delivery.deliver(task));
        let failures: Vec<_> = join_all(deliveries)
            .await
            .into_iter()
            .filter_map(Result::err)
            .collect();

        if !failures.is_empty() {
            for e in &failures {
                tracing::error!(request_id = %request.request_id, error = %e, "Task delivery failed");
            }
            self.store.mark_failed(&request.request_id).await?;
        }
        Ok(())
    }

    /// Poll the store until the request is READY or ERROR.
    ///
    /// Returns `None` if cancelled first. A request that disappears from
    /// the store (evicted) counts as ERROR. The intake lease is renewed
    /// on every poll.
    async fn await_terminal(
        &self,
        request_id: &str,
        handle: Option<&AckHandle>,
        cancel: &CancellationToken,
    ) -> Result<Option<RequestStatus>, DispatchError> {
        loop {
            match self.store.get(request_id).await? {
                Some(request) if request.status.is_terminal() => {
                    return Ok(Some(request.status));
                }
                Some(_) => {}
                None => {
                    tracing::warn!(request_id, "Request vanished while waiting for completion");
                    return Ok(Some(RequestStatus::Error));
                }
            }
            if let Some(handle) = handle {
                if !self.intake.extend(handle).await? {
                    tracing::warn!(request_id, "Intake lease lost, message may be redelivered");
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
