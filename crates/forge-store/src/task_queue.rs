//! The queue half of C3 (`spec.md` §4.3, §6.2): an at-least-once,
//! Postgres-backed handle queue. Grounded directly on the CTE atomic
//! pop in `ob-workflow/src/listener.rs`'s `process_one` (`FOR UPDATE
//! SKIP LOCKED`, planner-independent).

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::time::Duration;

use crate::error::JobStoreError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskHandle(pub String);

impl std::fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct ClaimedTask {
    pub task_handle: TaskHandle,
    pub job_id: i64,
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue a handle referencing an already-persisted job row.
    async fn enqueue(&self, job_id: i64) -> Result<TaskHandle, JobStoreError>;

    /// Atomically claim up to `limit` pending handles. A handle
    /// claimed by one worker is invisible to every other claimant.
    async fn claim(&self, limit: u32) -> Result<Vec<ClaimedTask>, JobStoreError>;

    /// Remove a still-pending handle so no worker ever claims it
    /// (used by `cancel_job` when the previous status was `pending`).
    async fn revoke(&self, handle: &TaskHandle) -> Result<(), JobStoreError>;

    /// Record that a worker process is alive. Called periodically by
    /// the worker pool.
    async fn record_worker_heartbeat(&self, worker_id: &str) -> Result<(), JobStoreError>;

    /// Count workers whose heartbeat fell within `within` of now. The
    /// worker-health gate in C5 calls this with a short timeout
    /// wrapped around it.
    async fn worker_heartbeat_count(&self, within: Duration) -> Result<i64, JobStoreError>;
}

pub struct PgTaskQueue {
    pool: PgPool,
}

impl PgTaskQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskQueue for PgTaskQueue {
    async fn enqueue(&self, job_id: i64) -> Result<TaskHandle, JobStoreError> {
        let handle = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO task_queue (task_handle, job_id, status, queued_at)
            VALUES ($1, $2, 'pending', now())
            "#,
        )
        .bind(&handle)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(TaskHandle(handle))
    }

    async fn claim(&self, limit: u32) -> Result<Vec<ClaimedTask>, JobStoreError> {
        let rows = sqlx::query(
            r#"
            WITH next AS (
                SELECT task_handle
                FROM task_queue
                WHERE status = 'pending'
                ORDER BY queued_at
                FOR UPDATE SKIP LOCKED
                LIMIT $1
            )
            UPDATE task_queue q
            SET status = 'claimed', claimed_at = now()
            FROM next
            WHERE q.task_handle = next.task_handle
            RETURNING q.task_handle, q.job_id
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ClaimedTask {
                task_handle: TaskHandle(row.get("task_handle")),
                job_id: row.get("job_id"),
            })
            .collect())
    }

    async fn revoke(&self, handle: &TaskHandle) -> Result<(), JobStoreError> {
        sqlx::query(
            r#"
            UPDATE task_queue SET status = 'revoked'
            WHERE task_handle = $1 AND status = 'pending'
            "#,
        )
        .bind(&handle.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_worker_heartbeat(&self, worker_id: &str) -> Result<(), JobStoreError> {
        sqlx::query(
            r#"
            INSERT INTO workers (worker_id, last_seen_at)
            VALUES ($1, now())
            ON CONFLICT (worker_id) DO UPDATE SET last_seen_at = now()
            "#,
        )
        .bind(worker_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn worker_heartbeat_count(&self, within: Duration) -> Result<i64, JobStoreError> {
        let row = sqlx::query(
            r#"
            SELECT count(*) AS live
            FROM workers
            WHERE last_seen_at > now() - make_interval(secs => $1)
            "#,
        )
        .bind(within.as_secs_f64())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("live"))
    }
}
