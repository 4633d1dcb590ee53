//! Lease-based in-memory queue.
//!
//! Pulling without `auto_ack` leases the message for `visibility_timeout`.
//! Expired leases are returned to the head of the queue on the next pull,
//! in their original order, with the delivery counter bumped. `extend`
//! restarts a lease as long as it has not been reclaimed.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crackhash_core::queue::{AckHandle, Delivery, MessageQueue, QueueError};

/// Default lease length for unacknowledged deliveries.
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(60);

struct Message {
    id: i64,
    payload: String,
    deliveries: i32,
}

struct Lease {
    message: Message,
    expires_at: Instant,
}

#[derive(Default)]
struct State {
    next_id: i64,
    ready: VecDeque<Message>,
    leased: HashMap<i64, Lease>,
}

impl State {
    /// Move expired leases back to the head of the ready queue.
    fn reclaim_expired(&mut self, now: Instant) {
        let mut expired: Vec<i64> = self
            .leased
            .iter()
            .filter(|(_, lease)| lease.expires_at <= now)
            .map(|(id, _)| *id)
            .collect();
        expired.sort_unstable();
        for id in expired.into_iter().rev() {
            if let Some(lease) = self.leased.remove(&id) {
                self.ready.push_front(lease.message);
            }
        }
    }
}

pub struct MemoryQueue {
    name: String,
    visibility_timeout: Duration,
    state: Mutex<State>,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_visibility_timeout(name, DEFAULT_VISIBILITY_TIMEOUT)
    }

    pub fn with_visibility_timeout(name: impl Into<String>, visibility_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            visibility_timeout,
            state: Mutex::new(State::default()),
        }
    }

    /// Messages not yet acknowledged (ready plus leased).
    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.ready.len() + state.leased.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn push(&self, payload: String) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = state.next_id;
        state.ready.push_back(Message {
            id,
            payload,
            deliveries: 0,
        });
        tracing::trace!(queue = %self.name, message_id = id, "Message pushed");
        Ok(())
    }

    async fn pull(&self, auto_ack: bool) -> Result<Option<Delivery>, QueueError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.reclaim_expired(now);

        let Some(mut message) = state.ready.pop_front() else {
            return Ok(None);
        };
        message.deliveries += 1;
        let redelivered = message.deliveries > 1;
        if redelivered {
            tracing::debug!(
                queue = %self.name,
                message_id = message.id,
                deliveries = message.deliveries,
                "Redelivering unacknowledged message",
            );
        }

        if auto_ack {
            return Ok(Some(Delivery {
                payload: message.payload,
                handle: None,
                redelivered,
            }));
        }

        let handle = AckHandle {
            message_id: message.id,
            delivery: message.deliveries,
        };
        let payload = message.payload.clone();
        state.leased.insert(
            message.id,
            Lease {
                message,
                expires_at: now + self.visibility_timeout,
            },
        );
        Ok(Some(Delivery {
            payload,
            handle: Some(handle),
            redelivered,
        }))
    }

    async fn ack(&self, handle: &AckHandle) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let current = state
            .leased
            .get(&handle.message_id)
            .map(|lease| lease.message.deliveries);
        match current {
            Some(delivery) if delivery == handle.delivery => {
                state.leased.remove(&handle.message_id);
            }
            _ => {
                tracing::debug!(
                    queue = %self.name,
                    message_id = handle.message_id,
                    "Ignoring stale acknowledgment",
                );
            }
        }
        Ok(())
    }

    async fn extend(&self, handle: &AckHandle) -> Result<bool, QueueError> {
        let expires_at = Instant::now() + self.visibility_timeout;
        let mut state = self.state.lock().await;
        match state.leased.get_mut(&handle.message_id) {
            Some(lease) if lease.message.deliveries == handle.delivery => {
                lease.expires_at = expires_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
