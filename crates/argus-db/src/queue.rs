use argus_core::bus::{Delivery, QueueBus};
use argus_core::error::AppError;
use argus_core::messages::{Queue, MESSAGE_TTL_MINUTES};
use sqlx::{PgPool, Pool, Postgres};

/// How long a claim holds a message before it becomes visible again.
/// Redelivery after this window is what makes the bus at-least-once.
const VISIBILITY_TIMEOUT_MINUTES: i64 = 10;

/// PostgreSQL-backed durable queue bus using `FOR UPDATE SKIP LOCKED`.
///
/// Contract: publish is durable on return; claim hands a message to exactly
/// one consumer at a time; ack deletes; reject deletes WITHOUT requeue
/// (poison messages are dropped, the stale-pending sweep handles the
/// orphaned record); messages expire after [`MESSAGE_TTL_MINUTES`] and are
/// skipped silently.
#[derive(Clone)]
pub struct PgQueueBus {
    pool: Pool<Postgres>,
}

impl PgQueueBus {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Delete expired messages. Claims already skip them, so this is
    /// housekeeping, not correctness. Returns the number purged.
    pub async fn purge_expired(&self) -> Result<u64, AppError> {
        let purged = sqlx::query(r#"DELETE FROM queue_messages WHERE expires_at <= NOW()"#)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Queue(e.to_string()))?
            .rows_affected();
        if purged > 0 {
            tracing::debug!(purged, "Purged expired queue messages");
        }
        Ok(purged)
    }

    /// Unclaimed, unexpired messages waiting in `queue`.
    pub async fn depth(&self, queue: Queue) -> Result<i64, AppError> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM queue_messages
            WHERE queue = $1 AND claimed_at IS NULL AND expires_at > NOW()
            "#,
        )
        .bind(queue.name())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Queue(e.to_string()))?;
        Ok(count)
    }
}

impl QueueBus for PgQueueBus {
    async fn publish(
        &self,
        queue: Queue,
        payload: serde_json::Value,
        priority: i16,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO queue_messages (queue, payload, priority, expires_at)
            VALUES ($1, $2, $3, NOW() + make_interval(mins => $4::int))
            "#,
        )
        .bind(queue.name())
        .bind(payload)
        .bind(priority)
        .bind(MESSAGE_TTL_MINUTES as i32)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Queue(e.to_string()))?;

        Ok(())
    }

    async fn claim(&self, queue: Queue, consumer: &str) -> Result<Option<Delivery>, AppError> {
        let row: Option<(i64, serde_json::Value)> = sqlx::query_as(
            r#"
            UPDATE queue_messages
            SET claimed_by = $2, claimed_at = NOW()
            WHERE id = (
                SELECT id FROM queue_messages
                WHERE queue = $1
                  AND expires_at > NOW()
                  AND (claimed_at IS NULL
                       OR claimed_at < NOW() - make_interval(mins => $3::int))
                ORDER BY priority DESC, id ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING id, payload
            "#,
        )
        .bind(queue.name())
        .bind(consumer)
        .bind(VISIBILITY_TIMEOUT_MINUTES as i32)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Queue(e.to_string()))?;

        Ok(row.map(|(tag, payload)| Delivery { tag, payload }))
    }

    async fn ack(&self, _queue: Queue, tag: i64) -> Result<(), AppError> {
        sqlx::query(r#"DELETE FROM queue_messages WHERE id = $1"#)
            .bind(tag)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Queue(e.to_string()))?;
        Ok(())
    }

    async fn reject(&self, queue: Queue, tag: i64) -> Result<(), AppError> {
        // No requeue: the message is dropped outright.
        tracing::debug!(queue = %queue, tag, "Dropping rejected message");
        self.ack(queue, tag).await
    }
}
