//! In-memory fakes for `JobStore` and `TaskQueue`, used by
//! `forge-worker` and `forge-api` test suites that need the full
//! store/queue contract without a live Postgres (`spec.md` §8's
//! end-to-end scenarios; no `sqlx` dependency on this module's hot
//! path).

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use forge_types::{
    Artifact, CreateJobRequest, Job, JobListFilters, JobStatus, NewArtifact, NewNotification,
    Notification, NotificationPreferences, Page, SamplerConfig, UserId,
};

use crate::error::JobStoreError;
use crate::job_store::{JobStore, NewJob};
use crate::task_queue::{ClaimedTask, TaskHandle, TaskQueue};

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<i64, Job>>,
    artifacts: Mutex<HashMap<i64, Artifact>>,
    notifications: Mutex<HashMap<i64, Notification>>,
    preferences: Mutex<HashMap<UserId, bool>>,
    next_job_id: AtomicI64,
    next_artifact_id: AtomicI64,
    next_notification_id: AtomicI64,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: opt a user into notifications (absence defaults
    /// to disabled, per `spec.md` §9).
    pub fn set_notifications_enabled(&self, user_id: UserId, enabled: bool) {
        self.preferences.lock().unwrap().insert(user_id, enabled);
    }
}

fn from_request(id: i64, fields: NewJob) -> Job {
    let req: CreateJobRequest = fields.request;
    Job {
        id,
        user_id: fields.user_id,
        prompt: req.prompt,
        negative_prompt: req.negative_prompt,
        checkpoint: req.checkpoint,
        loras: req.loras,
        width: req.width,
        height: req.height,
        batch_size: req.batch_size,
        sampler: req.sampler,
        params: req.params,
        status: JobStatus::Pending,
        created_at: Utc::now(),
        started_at: None,
        completed_at: None,
        error_message: None,
        recovery_hints: Vec::new(),
        content_id: None,
        output_paths: Vec::new(),
        thumbnail_paths: Vec::new(),
        task_handle: None,
        engine_prompt_id: None,
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create_job(&self, fields: NewJob) -> Result<Job, JobStoreError> {
        let id = self.next_job_id.fetch_add(1, Ordering::SeqCst) + 1;
        let job = from_request(id, fields);
        self.jobs.lock().unwrap().insert(id, job.clone());
        Ok(job)
    }

    async fn set_task_handle(&self, job_id: i64, handle: &str) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&job_id).ok_or(JobStoreError::JobNotFound(job_id))?;
        match &job.task_handle {
            Some(existing) if existing != handle => {
                Err(JobStoreError::TaskHandleConflict { job_id })
            }
            _ => {
                job.task_handle = Some(handle.to_string());
                Ok(())
            }
        }
    }

    async fn set_engine_prompt_id(&self, job_id: i64, engine_prompt_id: &str) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&job_id).ok_or(JobStoreError::JobNotFound(job_id))?;
        job.engine_prompt_id = Some(engine_prompt_id.to_string());
        Ok(())
    }

    async fn transition_to_running(&self, job_id: i64) -> Result<Job, JobStoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&job_id).ok_or(JobStoreError::JobNotFound(job_id))?;
        if job.status != JobStatus::Pending {
            return Err(JobStoreError::IllegalTransition {
                job_id,
                reason: "job is not pending".to_string(),
            });
        }
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        Ok(job.clone())
    }

    async fn complete_job(
        &self,
        job_id: i64,
        content_id: i64,
        output_paths: Vec<String>,
        thumbnail_paths: Vec<String>,
    ) -> Result<Job, JobStoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&job_id).ok_or(JobStoreError::JobNotFound(job_id))?;
        if job.status != JobStatus::Running {
            return Err(JobStoreError::IllegalTransition {
                job_id,
                reason: "job is not running".to_string(),
            });
        }
        job.status = JobStatus::Completed;
        job.completed_at = Some(Utc::now());
        job.content_id = Some(content_id);
        job.output_paths = output_paths;
        job.thumbnail_paths = thumbnail_paths;
        Ok(job.clone())
    }

    async fn fail_job(
        &self,
        job_id: i64,
        error_message: &str,
        recovery_hints: Vec<String>,
    ) -> Result<Job, JobStoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&job_id).ok_or(JobStoreError::JobNotFound(job_id))?;
        if matches!(job.status, JobStatus::Completed | JobStatus::Cancelled) {
            return Err(JobStoreError::IllegalTransition {
                job_id,
                reason: "job is already completed or cancelled".to_string(),
            });
        }
        job.status = JobStatus::Failed;
        job.completed_at = Some(Utc::now());
        job.error_message = Some(error_message.to_string());
        job.recovery_hints = recovery_hints;
        Ok(job.clone())
    }

    async fn cancel_job(&self, job_id: i64, reason: Option<&str>) -> Result<JobStatus, JobStoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&job_id).ok_or(JobStoreError::JobNotFound(job_id))?;
        let previous = job.status;
        if previous.is_terminal() {
            return Ok(previous);
        }
        job.status = JobStatus::Cancelled;
        job.completed_at = Some(Utc::now());
        if let Some(reason) = reason {
            job.error_message = Some(reason.to_string());
        }
        Ok(previous)
    }

    async fn get_job(&self, job_id: i64) -> Result<Job, JobStoreError> {
        self.jobs
            .lock()
            .unwrap()
            .get(&job_id)
            .cloned()
            .ok_or(JobStoreError::JobNotFound(job_id))
    }

    async fn list_jobs(
        &self,
        owner: UserId,
        filters: JobListFilters,
    ) -> Result<Page<Job>, JobStoreError> {
        let jobs = self.jobs.lock().unwrap();
        let mut matching: Vec<Job> = jobs
            .values()
            .filter(|j| j.user_id == owner)
            .filter(|j| filters.status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.id.cmp(&a.id));
        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(filters.skip as usize)
            .take(filters.limit as usize)
            .collect();
        Ok(Page {
            items,
            total,
            limit: filters.limit,
            skip: filters.skip,
        })
    }

    async fn delete_job(&self, job_id: i64, owner: UserId) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get(&job_id).ok_or(JobStoreError::JobNotFound(job_id))?;
        if job.user_id != owner {
            return Err(JobStoreError::NotOwner(job_id));
        }
        if !job.status.is_terminal() {
            return Err(JobStoreError::NotTerminal(job_id));
        }
        jobs.remove(&job_id);
        Ok(())
    }

    async fn create_artifact(&self, fields: NewArtifact) -> Result<Artifact, JobStoreError> {
        let id = self.next_artifact_id.fetch_add(1, Ordering::SeqCst) + 1;
        let artifact = Artifact {
            id,
            user_id: fields.user_id,
            title: fields.title,
            path: fields.path,
            thumbnail_path: fields.thumbnail_path,
            alt_resolution_thumbnails: fields.alt_resolution_thumbnails,
            content_type: fields.content_type,
            item_metadata: fields.item_metadata,
            quality_score: None,
            tags: Default::default(),
            created_at: Utc::now(),
        };
        self.artifacts.lock().unwrap().insert(id, artifact.clone());
        Ok(artifact)
    }

    async fn create_notification(
        &self,
        fields: NewNotification,
    ) -> Result<Option<Notification>, JobStoreError> {
        let prefs = self.notification_preferences(fields.user_id).await?;
        if !prefs.allows(fields.notification_type) {
            return Ok(None);
        }
        let id = self.next_notification_id.fetch_add(1, Ordering::SeqCst) + 1;
        let notification = Notification {
            id,
            user_id: fields.user_id,
            title: fields.title,
            message: fields.message,
            notification_type: fields.notification_type,
            read: false,
            read_at: None,
            related_job_id: fields.related_job_id,
            related_artifact_id: fields.related_artifact_id,
            created_at: Utc::now(),
        };
        self.notifications
            .lock()
            .unwrap()
            .insert(id, notification.clone());
        Ok(Some(notification))
    }

    async fn mark_notification_read(&self, id: i64, user_id: UserId) -> Result<(), JobStoreError> {
        let mut notifications = self.notifications.lock().unwrap();
        let notification = notifications
            .get_mut(&id)
            .ok_or(JobStoreError::NotificationNotFound(id))?;
        if notification.user_id != user_id {
            return Err(JobStoreError::NotificationNotFound(id));
        }
        if !notification.read {
            notification.read = true;
            notification.read_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn notification_preferences(
        &self,
        user_id: UserId,
    ) -> Result<NotificationPreferences, JobStoreError> {
        let enabled = self
            .preferences
            .lock()
            .unwrap()
            .get(&user_id)
            .copied()
            .unwrap_or(false);
        Ok(NotificationPreferences {
            user_id,
            notifications_enabled: enabled,
        })
    }
}

struct PendingEntry {
    handle: TaskHandle,
    job_id: i64,
}

#[derive(Default)]
pub struct InMemoryTaskQueue {
    pending: Mutex<VecDeque<PendingEntry>>,
    heartbeats: Mutex<HashMap<String, Instant>>,
    next_seq: AtomicI64,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, job_id: i64) -> Result<TaskHandle, JobStoreError> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = TaskHandle(format!("task-{seq}"));
        self.pending.lock().unwrap().push_back(PendingEntry {
            handle: handle.clone(),
            job_id,
        });
        Ok(handle)
    }

    async fn claim(&self, limit: u32) -> Result<Vec<ClaimedTask>, JobStoreError> {
        let mut pending = self.pending.lock().unwrap();
        let mut claimed = Vec::new();
        for _ in 0..limit {
            match pending.pop_front() {
                Some(entry) => claimed.push(ClaimedTask {
                    task_handle: entry.handle,
                    job_id: entry.job_id,
                }),
                None => break,
            }
        }
        Ok(claimed)
    }

    async fn revoke(&self, handle: &TaskHandle) -> Result<(), JobStoreError> {
        self.pending.lock().unwrap().retain(|e| &e.handle != handle);
        Ok(())
    }

    async fn record_worker_heartbeat(&self, worker_id: &str) -> Result<(), JobStoreError> {
        self.heartbeats
            .lock()
            .unwrap()
            .insert(worker_id.to_string(), Instant::now());
        Ok(())
    }

    async fn worker_heartbeat_count(&self, within: Duration) -> Result<i64, JobStoreError> {
        let now = Instant::now();
        let count = self
            .heartbeats
            .lock()
            .unwrap()
            .values()
            .filter(|seen| now.duration_since(**seen) <= within)
            .count();
        Ok(count as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> CreateJobRequest {
        CreateJobRequest {
            prompt: "a cat".to_string(),
            negative_prompt: None,
            checkpoint: "sd_xl.safetensors".to_string(),
            loras: vec![],
            width: 512,
            height: 512,
            batch_size: 1,
            sampler: SamplerConfig {
                seed: -1,
                steps: 20,
                cfg: 7.0,
                sampler_name: "euler".to_string(),
                scheduler_name: "normal".to_string(),
                denoise: 1.0,
            },
            params: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn create_then_transition_then_complete_round_trips() {
        let store = InMemoryJobStore::new();
        let user = UserId(uuid::Uuid::new_v4());
        let job = store
            .create_job(NewJob {
                user_id: user,
                request: sample_request(),
            })
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Pending);

        let running = store.transition_to_running(job.id).await.unwrap();
        assert_eq!(running.status, JobStatus::Running);

        let completed = store
            .complete_job(job.id, 7, vec!["a.png".to_string()], vec!["thumb_a.png".to_string()])
            .await
            .unwrap();
        assert_eq!(completed.status, JobStatus::Completed);
        assert_eq!(completed.content_id, Some(7));
    }

    #[tokio::test]
    async fn second_transition_to_running_is_rejected() {
        let store = InMemoryJobStore::new();
        let user = UserId(uuid::Uuid::new_v4());
        let job = store
            .create_job(NewJob {
                user_id: user,
                request: sample_request(),
            })
            .await
            .unwrap();
        store.transition_to_running(job.id).await.unwrap();
        let second = store.transition_to_running(job.id).await;
        assert!(matches!(second, Err(JobStoreError::IllegalTransition { .. })));
    }

    #[tokio::test]
    async fn cancel_on_terminal_job_is_a_no_op() {
        let store = InMemoryJobStore::new();
        let user = UserId(uuid::Uuid::new_v4());
        let job = store
            .create_job(NewJob {
                user_id: user,
                request: sample_request(),
            })
            .await
            .unwrap();
        store.transition_to_running(job.id).await.unwrap();
        store
            .complete_job(job.id, 1, vec![], vec![])
            .await
            .unwrap();
        let previous = store.cancel_job(job.id, None).await.unwrap();
        assert_eq!(previous, JobStatus::Completed);
        let job_after = store.get_job(job.id).await.unwrap();
        assert_eq!(job_after.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn notification_is_suppressed_when_preferences_disabled() {
        let store = InMemoryJobStore::new();
        let user = UserId(uuid::Uuid::new_v4());
        let notification = store
            .create_notification(NewNotification {
                user_id: user,
                title: "Job done".to_string(),
                message: "your render is ready".to_string(),
                notification_type: forge_types::NotificationType::JobCompleted,
                related_job_id: Some(1),
                related_artifact_id: Some(1),
            })
            .await
            .unwrap();
        assert!(notification.is_none());

        store.set_notifications_enabled(user, true);
        let notification = store
            .create_notification(NewNotification {
                user_id: user,
                title: "Job done".to_string(),
                message: "your render is ready".to_string(),
                notification_type: forge_types::NotificationType::JobCompleted,
                related_job_id: Some(1),
                related_artifact_id: Some(1),
            })
            .await
            .unwrap();
        assert!(notification.is_some());
    }

    #[tokio::test]
    async fn claim_hands_each_task_to_exactly_one_caller() {
        let queue = InMemoryTaskQueue::new();
        queue.enqueue(1).await.unwrap();
        queue.enqueue(2).await.unwrap();

        let first = queue.claim(5).await.unwrap();
        assert_eq!(first.len(), 2);
        let second = queue.claim(5).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn revoke_removes_a_still_pending_handle() {
        let queue = InMemoryTaskQueue::new();
        let handle = queue.enqueue(1).await.unwrap();
        queue.revoke(&handle).await.unwrap();
        let claimed = queue.claim(5).await.unwrap();
        assert!(claimed.is_empty());
    }
}
