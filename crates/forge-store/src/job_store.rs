//! Component C3, job/artifact/notification half (`spec.md` §4.3).
//! Every transition is a compare-and-set `UPDATE ... WHERE id = $1 AND
//! status = $old`, the idiomatic simplification of the teacher's
//! heavier `SELECT ... FOR UPDATE` pattern — valid here because every
//! transition touches exactly one row with exactly one statement, and
//! Postgres evaluates the `WHERE` clause atomically under
//! `READ COMMITTED` (documented as a design decision in `DESIGN.md`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::str::FromStr;

use forge_types::{
    Artifact, ArtifactFormat, CreateJobRequest, Job, JobListFilters, JobStatus, LoraAdapter,
    NewArtifact, NewNotification, Notification, NotificationPreferences, NotificationType, Page,
    SamplerConfig, UserId,
};

use crate::error::JobStoreError;

#[derive(Debug, Clone)]
pub struct NewJob {
    pub user_id: UserId,
    pub request: CreateJobRequest,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, fields: NewJob) -> Result<Job, JobStoreError>;
    async fn set_task_handle(&self, job_id: i64, handle: &str) -> Result<(), JobStoreError>;
    /// Records the render engine's own identifier for this job in its
    /// dedicated column (`spec.md` §4.4 step 4). Never serialized to
    /// clients — see `task_handle`, the id the pipeline hands out.
    async fn set_engine_prompt_id(&self, job_id: i64, engine_prompt_id: &str) -> Result<(), JobStoreError>;
    async fn transition_to_running(&self, job_id: i64) -> Result<Job, JobStoreError>;
    async fn complete_job(
        &self,
        job_id: i64,
        content_id: i64,
        output_paths: Vec<String>,
        thumbnail_paths: Vec<String>,
    ) -> Result<Job, JobStoreError>;
    async fn fail_job(
        &self,
        job_id: i64,
        error_message: &str,
        recovery_hints: Vec<String>,
    ) -> Result<Job, JobStoreError>;
    /// Returns the job's status *before* this call, so the caller can
    /// decide whether a still-enqueued task handle needs revoking.
    async fn cancel_job(&self, job_id: i64, reason: Option<&str>) -> Result<JobStatus, JobStoreError>;
    async fn get_job(&self, job_id: i64) -> Result<Job, JobStoreError>;
    async fn list_jobs(
        &self,
        owner: UserId,
        filters: JobListFilters,
    ) -> Result<Page<Job>, JobStoreError>;
    async fn delete_job(&self, job_id: i64, owner: UserId) -> Result<(), JobStoreError>;

    async fn create_artifact(&self, fields: NewArtifact) -> Result<Artifact, JobStoreError>;

    /// Inserts unless the recipient's preferences disable the event
    /// class, in which case `Ok(None)` is returned (best-effort, never
    /// an error — `spec.md` §4.4).
    async fn create_notification(
        &self,
        fields: NewNotification,
    ) -> Result<Option<Notification>, JobStoreError>;
    async fn mark_notification_read(&self, id: i64, user_id: UserId) -> Result<(), JobStoreError>;
    async fn notification_preferences(
        &self,
        user_id: UserId,
    ) -> Result<NotificationPreferences, JobStoreError>;
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: i64,
    user_id: uuid::Uuid,
    prompt: String,
    negative_prompt: Option<String>,
    checkpoint: String,
    loras: sqlx::types::Json<Vec<LoraAdapter>>,
    width: i32,
    height: i32,
    batch_size: i32,
    seed: i64,
    steps: i32,
    cfg: f32,
    sampler_name: String,
    scheduler_name: String,
    denoise: f32,
    params: serde_json::Value,
    status: String,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    recovery_hints: sqlx::types::Json<Vec<String>>,
    content_id: Option<i64>,
    output_paths: sqlx::types::Json<Vec<String>>,
    thumbnail_paths: sqlx::types::Json<Vec<String>>,
    task_handle: Option<String>,
    engine_prompt_id: Option<String>,
}

impl TryFrom<JobRow> for Job {
    type Error = JobStoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = JobStatus::from_str(&row.status).map_err(|_| JobStoreError::IllegalTransition {
            job_id: row.id,
            reason: format!("unknown status in storage: {}", row.status),
        })?;
        Ok(Job {
            id: row.id,
            user_id: UserId(row.user_id),
            prompt: row.prompt,
            negative_prompt: row.negative_prompt,
            checkpoint: row.checkpoint,
            loras: row.loras.0,
            width: row.width as u32,
            height: row.height as u32,
            batch_size: row.batch_size as u32,
            sampler: SamplerConfig {
                seed: row.seed,
                steps: row.steps as u32,
                cfg: row.cfg,
                sampler_name: row.sampler_name,
                scheduler_name: row.scheduler_name,
                denoise: row.denoise,
            },
            params: row.params,
            status,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            error_message: row.error_message,
            recovery_hints: row.recovery_hints.0,
            content_id: row.content_id,
            output_paths: row.output_paths.0,
            thumbnail_paths: row.thumbnail_paths.0,
            task_handle: row.task_handle,
            engine_prompt_id: row.engine_prompt_id,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ArtifactRow {
    id: i64,
    user_id: uuid::Uuid,
    title: String,
    path: String,
    thumbnail_path: String,
    alt_resolution_thumbnails: serde_json::Value,
    content_type: String,
    item_metadata: serde_json::Value,
    quality_score: Option<f32>,
    tags: sqlx::types::Json<Vec<i64>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ArtifactRow> for Artifact {
    type Error = JobStoreError;

    fn try_from(row: ArtifactRow) -> Result<Self, Self::Error> {
        let content_type = match row.content_type.as_str() {
            "png" => ArtifactFormat::Png,
            "jpeg" => ArtifactFormat::Jpeg,
            other => {
                return Err(JobStoreError::IllegalTransition {
                    job_id: row.id,
                    reason: format!("unknown artifact format in storage: {other}"),
                })
            }
        };
        let alt: std::collections::HashMap<String, String> =
            serde_json::from_value(row.alt_resolution_thumbnails).unwrap_or_default();
        Ok(Artifact {
            id: row.id,
            user_id: UserId(row.user_id),
            title: row.title,
            path: row.path,
            thumbnail_path: row.thumbnail_path,
            alt_resolution_thumbnails: alt,
            content_type,
            item_metadata: row.item_metadata,
            quality_score: row.quality_score,
            tags: row.tags.0.into_iter().collect(),
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: i64,
    user_id: uuid::Uuid,
    title: String,
    message: String,
    notification_type: String,
    read: bool,
    read_at: Option<DateTime<Utc>>,
    related_job_id: Option<i64>,
    related_artifact_id: Option<i64>,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = JobStoreError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let notification_type = match row.notification_type.as_str() {
            "job_completed" => NotificationType::JobCompleted,
            "job_failed" => NotificationType::JobFailed,
            "job_cancelled" => NotificationType::JobCancelled,
            "system" => NotificationType::System,
            "recommendation" => NotificationType::Recommendation,
            other => {
                return Err(JobStoreError::IllegalTransition {
                    job_id: row.id,
                    reason: format!("unknown notification type in storage: {other}"),
                })
            }
        };
        Ok(Notification {
            id: row.id,
            user_id: UserId(row.user_id),
            title: row.title,
            message: row.message,
            notification_type,
            read: row.read,
            read_at: row.read_at,
            related_job_id: row.related_job_id,
            related_artifact_id: row.related_artifact_id,
            created_at: row.created_at,
        })
    }
}

fn notification_type_str(kind: NotificationType) -> &'static str {
    match kind {
        NotificationType::JobCompleted => "job_completed",
        NotificationType::JobFailed => "job_failed",
        NotificationType::JobCancelled => "job_cancelled",
        NotificationType::System => "system",
        NotificationType::Recommendation => "recommendation",
    }
}

pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create_job(&self, fields: NewJob) -> Result<Job, JobStoreError> {
        let req = fields.request;
        let row: JobRow = sqlx::query_as(
            r#"
            INSERT INTO jobs (
                user_id, prompt, negative_prompt, checkpoint, loras,
                width, height, batch_size, seed, steps, cfg, sampler_name,
                scheduler_name, denoise, params, status, created_at,
                recovery_hints, output_paths, thumbnail_paths
            ) VALUES (
                $1, $2, $3, $4, $5,
                $6, $7, $8, $9, $10, $11, $12,
                $13, $14, $15, 'pending', now(),
                '[]', '[]', '[]'
            )
            RETURNING *
            "#,
        )
        .bind(fields.user_id.0)
        .bind(&req.prompt)
        .bind(&req.negative_prompt)
        .bind(&req.checkpoint)
        .bind(sqlx::types::Json(&req.loras))
        .bind(req.width as i32)
        .bind(req.height as i32)
        .bind(req.batch_size as i32)
        .bind(req.sampler.seed)
        .bind(req.sampler.steps as i32)
        .bind(req.sampler.cfg)
        .bind(&req.sampler.sampler_name)
        .bind(&req.sampler.scheduler_name)
        .bind(req.sampler.denoise)
        .bind(&req.params)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn set_task_handle(&self, job_id: i64, handle: &str) -> Result<(), JobStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs SET task_handle = $2
            WHERE id = $1 AND (task_handle IS NULL OR task_handle = $2)
            "#,
        )
        .bind(job_id)
        .bind(handle)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(JobStoreError::TaskHandleConflict { job_id });
        }
        Ok(())
    }

    async fn set_engine_prompt_id(&self, job_id: i64, engine_prompt_id: &str) -> Result<(), JobStoreError> {
        sqlx::query("UPDATE jobs SET engine_prompt_id = $2 WHERE id = $1")
            .bind(job_id)
            .bind(engine_prompt_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn transition_to_running(&self, job_id: i64) -> Result<Job, JobStoreError> {
        let row: Option<JobRow> = sqlx::query_as(
            r#"
            UPDATE jobs SET status = 'running', started_at = now()
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| JobStoreError::IllegalTransition {
            job_id,
            reason: "job is not pending".to_string(),
        })?
        .try_into()
    }

    async fn complete_job(
        &self,
        job_id: i64,
        content_id: i64,
        output_paths: Vec<String>,
        thumbnail_paths: Vec<String>,
    ) -> Result<Job, JobStoreError> {
        let row: Option<JobRow> = sqlx::query_as(
            r#"
            UPDATE jobs
            SET status = 'completed', completed_at = now(), content_id = $2,
                output_paths = $3, thumbnail_paths = $4
            WHERE id = $1 AND status = 'running'
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(content_id)
        .bind(sqlx::types::Json(&output_paths))
        .bind(sqlx::types::Json(&thumbnail_paths))
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| JobStoreError::IllegalTransition {
            job_id,
            reason: "job is not running".to_string(),
        })?
        .try_into()
    }

    async fn fail_job(
        &self,
        job_id: i64,
        error_message: &str,
        recovery_hints: Vec<String>,
    ) -> Result<Job, JobStoreError> {
        let row: Option<JobRow> = sqlx::query_as(
            r#"
            UPDATE jobs
            SET status = 'failed', completed_at = now(), error_message = $2,
                recovery_hints = $3
            WHERE id = $1 AND status NOT IN ('completed', 'cancelled')
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(error_message)
        .bind(sqlx::types::Json(&recovery_hints))
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| JobStoreError::IllegalTransition {
            job_id,
            reason: "job is already completed or cancelled".to_string(),
        })?
        .try_into()
    }

    async fn cancel_job(&self, job_id: i64, reason: Option<&str>) -> Result<JobStatus, JobStoreError> {
        let mut tx = self.pool.begin().await?;

        let current_row = sqlx::query("SELECT status FROM jobs WHERE id = $1 FOR UPDATE")
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(JobStoreError::JobNotFound(job_id))?;
        let current_status = JobStatus::from_str(current_row.get::<String, _>("status").as_str())
            .map_err(|_| JobStoreError::IllegalTransition {
                job_id,
                reason: "unknown status in storage".to_string(),
            })?;

        if current_status.is_terminal() {
            tx.commit().await?;
            return Ok(current_status);
        }

        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'cancelled', completed_at = now(),
                error_message = COALESCE($2, error_message)
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(current_status)
    }

    async fn get_job(&self, job_id: i64) -> Result<Job, JobStoreError> {
        let row: Option<JobRow> = sqlx::query_as("SELECT * FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or(JobStoreError::JobNotFound(job_id))?.try_into()
    }

    async fn list_jobs(
        &self,
        owner: UserId,
        filters: JobListFilters,
    ) -> Result<Page<Job>, JobStoreError> {
        let status_filter = filters.status.map(|s| s.as_str().to_string());

        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT * FROM jobs
            WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)
            ORDER BY id DESC
            OFFSET $3 LIMIT $4
            "#,
        )
        .bind(owner.0)
        .bind(&status_filter)
        .bind(filters.skip as i64)
        .bind(filters.limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query(
            r#"SELECT count(*) AS total FROM jobs WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)"#,
        )
        .bind(owner.0)
        .bind(&status_filter)
        .fetch_one(&self.pool)
        .await?
        .get("total");

        let items = rows
            .into_iter()
            .map(Job::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            items,
            total,
            limit: filters.limit,
            skip: filters.skip,
        })
    }

    async fn delete_job(&self, job_id: i64, owner: UserId) -> Result<(), JobStoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE id = $1 AND user_id = $2
              AND status IN ('completed', 'failed', 'cancelled')
            "#,
        )
        .bind(job_id)
        .bind(owner.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let job = self.get_job(job_id).await?;
            if job.user_id != owner {
                return Err(JobStoreError::NotOwner(job_id));
            }
            return Err(JobStoreError::NotTerminal(job_id));
        }
        Ok(())
    }

    async fn create_artifact(&self, fields: NewArtifact) -> Result<Artifact, JobStoreError> {
        let alt = serde_json::to_value(&fields.alt_resolution_thumbnails).unwrap_or_default();
        let row: ArtifactRow = sqlx::query_as(
            r#"
            INSERT INTO artifacts (
                user_id, title, path, thumbnail_path, alt_resolution_thumbnails,
                content_type, item_metadata, tags, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, '[]', now())
            RETURNING *
            "#,
        )
        .bind(fields.user_id.0)
        .bind(&fields.title)
        .bind(&fields.path)
        .bind(&fields.thumbnail_path)
        .bind(alt)
        .bind(match fields.content_type {
            ArtifactFormat::Png => "png",
            ArtifactFormat::Jpeg => "jpeg",
        })
        .bind(&fields.item_metadata)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn create_notification(
        &self,
        fields: NewNotification,
    ) -> Result<Option<Notification>, JobStoreError> {
        let prefs = self.notification_preferences(fields.user_id).await?;
        if !prefs.allows(fields.notification_type) {
            return Ok(None);
        }

        let row: NotificationRow = sqlx::query_as(
            r#"
            INSERT INTO notifications (
                user_id, title, message, notification_type, read,
                related_job_id, related_artifact_id, created_at
            ) VALUES ($1, $2, $3, $4, false, $5, $6, now())
            RETURNING *
            "#,
        )
        .bind(fields.user_id.0)
        .bind(&fields.title)
        .bind(&fields.message)
        .bind(notification_type_str(fields.notification_type))
        .bind(fields.related_job_id)
        .bind(fields.related_artifact_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(Some(row.try_into()?))
    }

    async fn mark_notification_read(&self, id: i64, user_id: UserId) -> Result<(), JobStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications SET read = true, read_at = now()
            WHERE id = $1 AND user_id = $2 AND read = false
            "#,
        )
        .bind(id)
        .bind(user_id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists: Option<i64> =
                sqlx::query("SELECT id FROM notifications WHERE id = $1 AND user_id = $2")
                    .bind(id)
                    .bind(user_id.0)
                    .fetch_optional(&self.pool)
                    .await?
                    .map(|row| row.get("id"));
            if exists.is_none() {
                return Err(JobStoreError::NotificationNotFound(id));
            }
        }
        Ok(())
    }

    async fn notification_preferences(
        &self,
        user_id: UserId,
    ) -> Result<NotificationPreferences, JobStoreError> {
        let row = sqlx::query("SELECT notifications_enabled FROM notification_preferences WHERE user_id = $1")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => NotificationPreferences {
                user_id,
                notifications_enabled: row.get("notifications_enabled"),
            },
            None => NotificationPreferences::disabled(user_id),
        })
    }
}

#[cfg(test)]
mod format_tests {
    use super::*;

    #[test]
    fn notification_type_round_trips_through_its_storage_string() {
        for kind in [
            NotificationType::JobCompleted,
            NotificationType::JobFailed,
            NotificationType::JobCancelled,
            NotificationType::System,
            NotificationType::Recommendation,
        ] {
            let s = notification_type_str(kind);
            let row = NotificationRow {
                id: 1,
                user_id: uuid::Uuid::nil(),
                title: "t".to_string(),
                message: "m".to_string(),
                notification_type: s.to_string(),
                read: false,
                read_at: None,
                related_job_id: None,
                related_artifact_id: None,
                created_at: Utc::now(),
            };
            let parsed: Notification = row.try_into().unwrap();
            assert_eq!(parsed.notification_type, kind);
        }
    }
}
