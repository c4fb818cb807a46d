//! Postgres-backed work queue.
//!
//! Messages live in a `queue_messages` table keyed by queue name. A claim
//! takes the oldest message whose lease is absent or expired, using
//! `FOR UPDATE SKIP LOCKED` so concurrent consumers never block each other
//! or claim the same row. Acknowledgment deletes the row; an un-acked claim
//! is redelivered after its lease expires, which is where the at-least-once
//! guarantee comes from.

use std::time::Duration;

use sqlx::{PgPool, Row};
use tracing::instrument;

use crate::config::QueueSettings;
use crate::error::{PipelineError, Result};
use crate::queue::{Delivery, WorkQueue};

const QUEUE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS queue_messages (
    id BIGSERIAL PRIMARY KEY,
    queue TEXT NOT NULL,
    body TEXT NOT NULL,
    enqueued_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    leased_until TIMESTAMPTZ NULL
)
"#;

const QUEUE_INDEX_DDL: &str = r#"
CREATE INDEX IF NOT EXISTS queue_messages_claim_idx
    ON queue_messages (queue, id)
"#;

/// Durable queue over a shared Postgres pool.
pub struct PgWorkQueue {
    pool: PgPool,
    name: String,
    lease: Duration,
}

impl std::fmt::Debug for PgWorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgWorkQueue")
            .field("name", &self.name)
            .field("lease", &self.lease)
            .finish()
    }
}

impl PgWorkQueue {
    pub fn new(pool: PgPool, settings: &QueueSettings) -> Self {
        Self {
            pool,
            name: settings.name.clone(),
            lease: settings.lease,
        }
    }
}

#[async_trait::async_trait]
impl WorkQueue for PgWorkQueue {
    #[instrument(skip(self), err)]
    async fn declare(&self) -> Result<()> {
        sqlx::query(QUEUE_DDL)
            .execute(&self.pool)
            .await
            .map_err(|err| PipelineError::Queue {
                message: format!("declare queue: {err}"),
            })?;
        sqlx::query(QUEUE_INDEX_DDL)
            .execute(&self.pool)
            .await
            .map_err(|err| PipelineError::Queue {
                message: format!("declare queue index: {err}"),
            })?;
        Ok(())
    }

    #[instrument(skip(self, payload), err)]
    async fn publish(&self, payload: &str) -> Result<()> {
        sqlx::query("INSERT INTO queue_messages (queue, body) VALUES ($1, $2)")
            .bind(&self.name)
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(|err| PipelineError::Queue {
                message: format!("publish: {err}"),
            })?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn receive(&self) -> Result<Option<Delivery>> {
        let row = sqlx::query(
            r#"
            UPDATE queue_messages
            SET leased_until = now() + make_interval(secs => $2)
            WHERE id = (
                SELECT id FROM queue_messages
                WHERE queue = $1
                  AND (leased_until IS NULL OR leased_until < now())
                ORDER BY id
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING id, body
            "#,
        )
        .bind(&self.name)
        .bind(self.lease.as_secs_f64())
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| PipelineError::Queue {
            message: format!("receive: {err}"),
        })?;

        Ok(row.map(|row| Delivery {
            id: row.get("id"),
            body: row.get("body"),
        }))
    }

    #[instrument(skip(self, delivery), fields(id = delivery.id), err)]
    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        sqlx::query("DELETE FROM queue_messages WHERE id = $1")
            .bind(delivery.id)
            .execute(&self.pool)
            .await
            .map_err(|err| PipelineError::Queue {
                message: format!("ack: {err}"),
            })?;
        Ok(())
    }
}
