//! At-least-once message queue contract.
//!
//! A pulled message stays owned by the consumer until it is acknowledged.
//! Unacknowledged deliveries become visible again once their lease runs out,
//! so a consumer that dies mid-message causes a redelivery, never a loss.
//! Consumers must therefore tolerate duplicates. A consumer that holds a
//! message longer than one lease renews it with [`MessageQueue::extend`].

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Opaque acknowledgment token for one delivery of one message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AckHandle {
    pub message_id: i64,
    /// Delivery attempt the handle belongs to; stale handles do not ack a
    /// later redelivery.
    pub delivery: i32,
}

/// A message handed to a consumer.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub payload: String,
    /// `None` when pulled with `auto_ack`.
    pub handle: Option<AckHandle>,
    /// Whether an earlier delivery of this message went unacknowledged.
    pub redelivered: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue backend error: {0}")]
    Backend(String),

    #[error("malformed message on queue {queue}: {reason}")]
    Malformed { queue: String, reason: String },

    #[error("failed to encode message: {0}")]
    Encode(String),
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Queue name, for logs.
    fn name(&self) -> &str;

    /// Durably enqueue a message.
    async fn push(&self, payload: String) -> Result<(), QueueError>;

    /// Take the next visible message, if any. With `auto_ack` the message is
    /// removed immediately and no handle is returned.
    async fn pull(&self, auto_ack: bool) -> Result<Option<Delivery>, QueueError>;

    /// Permanently remove a delivered message.
    async fn ack(&self, handle: &AckHandle) -> Result<(), QueueError>;

    /// Restart the lease of a delivery that is still being worked on.
    ///
    /// Returns `false` when `handle` no longer owns the message (acked, or
    /// the lease ran out and the message was handed to someone else).
    async fn extend(&self, handle: &AckHandle) -> Result<bool, QueueError>;
}

/// Typed JSON view over a [`MessageQueue`].
pub struct JsonQueue<T> {
    inner: Arc<dyn MessageQueue>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for JsonQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _marker: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned> JsonQueue<T> {
    pub fn new(inner: Arc<dyn MessageQueue>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn push(&self, message: &T) -> Result<(), QueueError> {
        let payload =
            serde_json::to_string(message).map_err(|e| QueueError::Encode(e.to_string()))?;
        self.inner.push(payload).await
    }

    /// Pull and decode the next message.
    ///
    /// A payload that does not decode is acknowledged (dropped) and reported
    /// as [`QueueError::Malformed`], so a poison message is never redelivered.
    pub async fn pull(&self, auto_ack: bool) -> Result<Option<(T, Option<AckHandle>)>, QueueError> {
        let Some(delivery) = self.inner.pull(auto_ack).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&delivery.payload) {
            Ok(message) => Ok(Some((message, delivery.handle))),
            Err(e) => {
                if let Some(handle) = &delivery.handle {
                    self.inner.ack(handle).await?;
                }
                Err(QueueError::Malformed {
                    queue: self.inner.name().to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    pub async fn ack(&self, handle: &AckHandle) -> Result<(), QueueError> {
        self.inner.ack(handle).await
    }

    pub async fn extend(&self, handle: &AckHandle) -> Result<bool, QueueError> {
        self.inner.extend(handle).await
    }
}
