//! Durable queue over the `queue_messages` table.
//!
//! Consumers claim the oldest visible message with `FOR UPDATE SKIP LOCKED`,
//! so competing consumers never receive the same delivery. A claimed
//! message is hidden for the visibility timeout; if it is neither
//! acknowledged nor extended in time it becomes visible again and is
//! redelivered.

use std::time::Duration;

use async_trait::async_trait;

use crackhash_core::queue::{AckHandle, Delivery, MessageQueue, QueueError};

use crate::{backend_error, DbPool};

/// Default lease length for unacknowledged deliveries.
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(60);

fn db_err(err: sqlx::Error) -> QueueError {
    QueueError::Backend(backend_error(err))
}

/// One named queue in the shared `queue_messages` table.
#[derive(Clone)]
pub struct PgQueue {
    pool: DbPool,
    name: String,
    visibility_timeout: Duration,
}

impl PgQueue {
    pub fn new(pool: DbPool, name: impl Into<String>) -> Self {
        Self::with_visibility_timeout(pool, name, DEFAULT_VISIBILITY_TIMEOUT)
    }

    pub fn with_visibility_timeout(
        pool: DbPool,
        name: impl Into<String>,
        visibility_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            name: name.into(),
            visibility_timeout,
        }
    }

    /// Messages not yet acknowledged, visible or leased.
    pub async fn depth(&self) -> Result<i64, QueueError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM queue_messages WHERE queue = $1")
            .bind(&self.name)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }
}

#[async_trait]
impl MessageQueue for PgQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn push(&self, payload: String) -> Result<(), QueueError> {
        let id: i64 =
            sqlx::query_scalar("INSERT INTO queue_messages (queue, payload) VALUES ($1, $2) RETURNING id")
                .bind(&self.name)
                .bind(&payload)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
        tracing::trace!(queue = %self.name, message_id = id, "Message pushed");
        Ok(())
    }

    async fn pull(&self, auto_ack: bool) -> Result<Option<Delivery>, QueueError> {
        let row: Option<(i64, String, i32)> = if auto_ack {
            sqlx::query_as(
                "DELETE FROM queue_messages \
                 WHERE id = ( \
                     SELECT id FROM queue_messages \
                     WHERE queue = $1 AND visible_at <= NOW() \
                     ORDER BY id \
                     LIMIT 1 \
                     FOR UPDATE SKIP LOCKED \
                 ) \
                 RETURNING id, payload, deliveries + 1",
            )
            .bind(&self.name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
        } else {
            sqlx::query_as(
                "UPDATE queue_messages \
                 SET deliveries = deliveries + 1, \
                     visible_at = NOW() + make_interval(secs => $2) \
                 WHERE id = ( \
                     SELECT id FROM queue_messages \
                     WHERE queue = $1 AND visible_at <= NOW() \
                     ORDER BY id \
                     LIMIT 1 \
                     FOR UPDATE SKIP LOCKED \
                 ) \
                 RETURNING id, payload, deliveries",
            )
            .bind(&self.name)
            .bind(self.visibility_timeout.as_secs_f64())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
        };

        let Some((id, payload, deliveries)) = row else {
            return Ok(None);
        };

        let redelivered = deliveries > 1;
        if redelivered {
            tracing::debug!(
                queue = %self.name,
                message_id = id,
                deliveries,
                "Redelivering unacknowledged message",
            );
        }

        let handle = (!auto_ack).then_some(AckHandle {
            message_id: id,
            delivery: deliveries,
        });
        Ok(Some(Delivery {
            payload,
            handle,
            redelivered,
        }))
    }

    async fn ack(&self, handle: &AckHandle) -> Result<(), QueueError> {
        let result = sqlx::query("DELETE FROM queue_messages WHERE id = $1 AND deliveries = $2")
            .bind(handle.message_id)
            .bind(handle.delivery)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            tracing::debug!(
                queue = %self.name,
                message_id = handle.message_id,
                "Ignoring stale acknowledgment",
            );
        }
        Ok(())
    }

    async fn extend(&self, handle: &AckHandle) -> Result<bool, QueueError> {
        let result = sqlx::query(
            "UPDATE queue_messages \
             SET visible_at = NOW() + make_interval(secs => $3) \
             WHERE id = $1 AND deliveries = $2",
        )
        .bind(handle.message_id)
        .bind(handle.delivery)
        .bind(self.visibility_timeout.as_secs_f64())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }
}
