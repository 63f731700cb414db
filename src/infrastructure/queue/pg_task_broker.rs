use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use crate::application::ports::{BrokerError, QueueInfo, QueueInspector, TaskBroker};
use crate::domain::{TaskDelivery, TaskId, TaskMessage};

const DEFAULT_LEASE_GRACE: Duration = Duration::from_secs(30);

/// Task queue on a Postgres table. Concurrent workers claim rows with
/// `FOR UPDATE SKIP LOCKED`, so each pending task is handed out once.
///
/// A claimed row holds a lease of `timeout + grace`. When a worker dies
/// mid-task the lease runs out and the next `dequeue` hands the row out
/// again, counting the lost run as a failed attempt. `ack`, `retry` and
/// `archive` match on the attempt count, so a worker whose lease was
/// reclaimed can no longer settle the task.
pub struct PgTaskBroker {
    pool: PgPool,
    lease_grace: Duration,
}

impl PgTaskBroker {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lease_grace: DEFAULT_LEASE_GRACE,
        }
    }

    pub fn with_lease_grace(mut self, grace: Duration) -> Self {
        self.lease_grace = grace;
        self
    }

    /// Archives expired leases that have no retries left.
    async fn archive_abandoned(&self, queue: &str) -> Result<(), BrokerError> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET state = 'archived', retried = retried + 1, lease_until = NULL,
                last_error = 'lease expired: worker did not settle the task',
                updated_at = NOW()
            WHERE queue = $1
              AND state = 'active'
              AND lease_until < NOW()
              AND retried >= max_retries
            "#,
        )
        .bind(queue)
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;

        if result.rows_affected() > 0 {
            tracing::warn!(
                queue,
                count = result.rows_affected(),
                "Archived tasks abandoned by their worker"
            );
        }
        Ok(())
    }
}

fn query_failed(e: sqlx::Error) -> BrokerError {
    BrokerError::QueryFailed(e.to_string())
}

fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn attempt(delivery: &TaskDelivery) -> i32 {
    i32::try_from(delivery.retried).unwrap_or(i32::MAX)
}

#[async_trait]
impl QueueInspector for PgTaskBroker {
    #[instrument(skip(self))]
    async fn queue_info(&self, queue: &str) -> Result<QueueInfo, BrokerError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (
                    WHERE state IN ('pending', 'retry') AND process_at <= NOW()
                ) AS pending,
                COUNT(*) FILTER (WHERE state = 'pending' AND process_at > NOW()) AS scheduled,
                COUNT(*) FILTER (WHERE state = 'active') AS active,
                COUNT(*) FILTER (WHERE state = 'retry' AND process_at > NOW()) AS retry,
                COUNT(*) FILTER (WHERE state = 'archived') AS archived
            FROM tasks
            WHERE queue = $1
            "#,
        )
        .bind(queue)
        .fetch_one(&self.pool)
        .await
        .map_err(query_failed)?;

        Ok(QueueInfo {
            pending: count(row.try_get("pending").map_err(query_failed)?),
            active: count(row.try_get("active").map_err(query_failed)?),
            scheduled: count(row.try_get("scheduled").map_err(query_failed)?),
            retry: count(row.try_get("retry").map_err(query_failed)?),
            archived: count(row.try_get("archived").map_err(query_failed)?),
        })
    }
}

#[async_trait]
impl TaskBroker for PgTaskBroker {
    #[instrument(
        skip(self, message),
        fields(task_type = %message.task_type, queue = %message.queue)
    )]
    async fn enqueue(&self, message: TaskMessage) -> Result<TaskId, BrokerError> {
        if message.task_type.trim().is_empty() {
            return Err(BrokerError::InvalidTask("task type is empty".to_string()));
        }
        let id = TaskId::new();

        sqlx::query(
            r#"
            INSERT INTO tasks (id, queue, task_type, payload, max_retries, timeout_secs)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id.as_uuid())
        .bind(&message.queue)
        .bind(&message.task_type)
        .bind(&message.payload)
        .bind(i32::try_from(message.max_retries).unwrap_or(i32::MAX))
        .bind(i64::try_from(message.timeout.as_secs()).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;

        Ok(id)
    }

    #[instrument(skip(self))]
    async fn dequeue(&self, queue: &str) -> Result<Option<TaskDelivery>, BrokerError> {
        self.archive_abandoned(queue).await?;

        let row = sqlx::query(
            r#"
            UPDATE tasks
            SET retried = CASE WHEN state = 'active' THEN retried + 1 ELSE retried END,
                last_error = CASE
                    WHEN state = 'active' THEN 'lease expired: worker did not settle the task'
                    ELSE last_error
                END,
                state = 'active',
                lease_until = NOW()
                    + make_interval(secs => timeout_secs + $2::double precision),
                updated_at = NOW()
            WHERE id = (
                SELECT id FROM tasks
                WHERE queue = $1
                  AND (
                      (state IN ('pending', 'retry') AND process_at <= NOW())
                      OR (state = 'active' AND lease_until < NOW())
                  )
                ORDER BY process_at, created_at
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING id, queue, task_type, payload, retried, max_retries, timeout_secs
            "#,
        )
        .bind(queue)
        .bind(self.lease_grace.as_secs_f64())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: Uuid = row.try_get("id").map_err(query_failed)?;
        let retried: i32 = row.try_get("retried").map_err(query_failed)?;
        let max_retries: i32 = row.try_get("max_retries").map_err(query_failed)?;
        let timeout_secs: i64 = row.try_get("timeout_secs").map_err(query_failed)?;

        let message = TaskMessage::new(
            row.try_get::<String, _>("task_type").map_err(query_failed)?,
            row.try_get::<Vec<u8>, _>("payload").map_err(query_failed)?,
        )
        .with_queue(row.try_get::<String, _>("queue").map_err(query_failed)?)
        .with_max_retries(u32::try_from(max_retries).unwrap_or(0))
        .with_timeout(Duration::from_secs(u64::try_from(timeout_secs).unwrap_or(0)));

        Ok(Some(TaskDelivery::new(
            TaskId::from_uuid(id),
            message,
            u32::try_from(retried).unwrap_or(0),
        )))
    }

    #[instrument(skip(self, delivery), fields(task_id = %delivery.id))]
    async fn ack(&self, delivery: &TaskDelivery) -> Result<(), BrokerError> {
        let result =
            sqlx::query("DELETE FROM tasks WHERE id = $1 AND state = 'active' AND retried = $2")
                .bind(delivery.id.as_uuid())
                .bind(attempt(delivery))
                .execute(&self.pool)
                .await
                .map_err(query_failed)?;

        if result.rows_affected() == 0 {
            return Err(BrokerError::TaskNotFound(delivery.id));
        }
        Ok(())
    }

    #[instrument(
        skip(self, delivery, error),
        fields(task_id = %delivery.id, delay_secs = delay.as_secs())
    )]
    async fn retry(
        &self,
        delivery: &TaskDelivery,
        delay: Duration,
        error: &str,
    ) -> Result<(), BrokerError> {
        let delay = TimeDelta::from_std(delay)
            .map_err(|e| BrokerError::InvalidTask(format!("retry delay: {}", e)))?;
        let process_at = Utc::now()
            .checked_add_signed(delay)
            .ok_or_else(|| BrokerError::InvalidTask("retry delay out of range".to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET state = 'retry', retried = retried + 1, last_error = $2,
                process_at = $3, lease_until = NULL, updated_at = NOW()
            WHERE id = $1 AND state = 'active' AND retried = $4
            "#,
        )
        .bind(delivery.id.as_uuid())
        .bind(error)
        .bind(process_at)
        .bind(attempt(delivery))
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;

        if result.rows_affected() == 0 {
            return Err(BrokerError::TaskNotFound(delivery.id));
        }
        Ok(())
    }

    #[instrument(skip(self, delivery, error), fields(task_id = %delivery.id))]
    async fn archive(&self, delivery: &TaskDelivery, error: &str) -> Result<(), BrokerError> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET state = 'archived', last_error = $2, lease_until = NULL, updated_at = NOW()
            WHERE id = $1 AND state = 'active' AND retried = $3
            "#,
        )
        .bind(delivery.id.as_uuid())
        .bind(error)
        .bind(attempt(delivery))
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;

        if result.rows_affected() == 0 {
            return Err(BrokerError::TaskNotFound(delivery.id));
        }
        Ok(())
    }
}
