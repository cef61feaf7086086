//! `WorkerPool::run`: a pool of worker tasks consuming claimed task
//! handles and running them to completion (`spec.md` §4.4, §5).
//! Polling/backoff cadence grounded on `ob-workflow/src/listener.rs`'s
//! `run`/`process_one` (100ms idle poll, 1000ms error backoff).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Utc};
use tokio_util::sync::CancellationToken;

use forge_progress::ProgressBus;
use forge_render_client::{CancelToken, RenderClient, RenderClientError, RetryPolicy};
use forge_store::{JobStore, JobStoreError, TaskQueue};
use forge_types::{Job, JobStatus, NewArtifact, NewNotification, NotificationType, ProgressEvent};

use crate::error::ForgeWorkerError;
use crate::thumbnail::{generate_thumbnail, guess_artifact_format};
use crate::workflow_builder::build_workflow;

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);
const ERROR_BACKOFF: Duration = Duration::from_millis(1000);

/// Engine-reported error messages are attacker/model controlled and can
/// be arbitrarily long; cap what lands in `jobs.error_message` (`spec.md`
/// §7: "message truncated to 500 chars").
const MAX_ERROR_MESSAGE_LEN: usize = 500;

fn truncate_message(message: &str) -> String {
    if message.chars().count() <= MAX_ERROR_MESSAGE_LEN {
        message.to_string()
    } else {
        message.chars().take(MAX_ERROR_MESSAGE_LEN).collect()
    }
}

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub pool_size: usize,
    pub artifact_root: PathBuf,
    pub job_max_duration: Duration,
    pub cancel_poll_interval: Duration,
    pub thumbnail_max_dim: u32,
}

pub struct WorkerPool {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn TaskQueue>,
    progress: Arc<ProgressBus>,
    render_client: Arc<dyn RenderClient>,
    config: WorkerPoolConfig,
}

impl WorkerPool {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn TaskQueue>,
        progress: Arc<ProgressBus>,
        render_client: Arc<dyn RenderClient>,
        config: WorkerPoolConfig,
    ) -> Self {
        Self {
            store,
            queue,
            progress,
            render_client,
            config,
        }
    }

    /// Spawns `pool_size` worker loops and waits for all of them to
    /// exit. Exits once `shutdown` is cancelled and every in-flight
    /// job has been allowed to finish its current step.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut handles = Vec::with_capacity(self.config.pool_size);
        for index in 0..self.config.pool_size {
            let pool = Arc::clone(&self);
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                pool.worker_loop(index, shutdown).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn worker_loop(&self, index: usize, shutdown: CancellationToken) {
        let worker_id = format!("worker-{index}");
        loop {
            if shutdown.is_cancelled() {
                return;
            }
            if let Err(e) = self.queue.record_worker_heartbeat(&worker_id).await {
                tracing::warn!(worker_id, error = %e, "failed to record heartbeat");
            }

            match self.queue.claim(1).await {
                Ok(tasks) if !tasks.is_empty() => {
                    for task in tasks {
                        if let Err(e) = self.process_job(task.job_id).await {
                            tracing::error!(job_id = task.job_id, error = %e, "job processing ended in error");
                        }
                    }
                }
                Ok(_) => {
                    tokio::select! {
                        _ = shutdown.cancelled() => return,
                        _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => {}
                    }
                }
                Err(e) => {
                    tracing::error!(worker_id, error = %e, "error claiming tasks");
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            }
        }
    }

    /// The eleven-step per-task processing function (`spec.md` §4.4).
    async fn process_job(&self, job_id: i64) -> Result<(), ForgeWorkerError> {
        // 1. claim
        let job = match self.store.transition_to_running(job_id).await {
            Ok(job) => job,
            Err(JobStoreError::IllegalTransition { .. }) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        // 2. publish started
        self.progress.publish(ProgressEvent::started(job_id, Utc::now()));

        // 3. build workflow (pure)
        let workflow = build_workflow(&job);

        // 4. submit, retried on EngineUnavailable
        let retry = RetryPolicy::default();
        let prompt_id = match retry
            .run(RenderClientError::is_retryable, || self.render_client.submit(&workflow))
            .await
        {
            Ok(id) => id,
            Err(e) => return self.terminate_with_failure(job_id, &job, e).await,
        };

        if let Err(e) = self.store.set_engine_prompt_id(job_id, &prompt_id.0).await {
            tracing::warn!(job_id, error = %e, "failed to persist engine prompt id");
        }

        // 5. publish processing
        self.progress.publish(ProgressEvent::processing(job_id, Utc::now()));

        // 6. await completion, cancel token driven by periodic row re-reads
        let cancel = CancelToken::new();
        let watcher = self.spawn_cancel_watcher(job_id, cancel.clone());
        let deadline = tokio::time::Instant::now() + self.config.job_max_duration;
        let history_result = self
            .render_client
            .await_completion(&prompt_id, cancel.clone(), deadline)
            .await;
        watcher.abort();

        let history = match history_result {
            Ok(history) => history,
            Err(RenderClientError::Cancelled) => {
                let _ = self.store.cancel_job(job_id, None).await;
                self.progress.publish(ProgressEvent::cancelled(job_id, Utc::now()));
                return Ok(());
            }
            Err(RenderClientError::Timeout) => {
                return self.terminate_with_timeout(job_id, &job).await;
            }
            Err(e) => return self.terminate_with_failure(job_id, &job, e).await,
        };

        // 7. fetch each output, retried
        let mut output_paths = Vec::with_capacity(history.outputs.len());
        let mut thumbnail_paths = Vec::with_capacity(history.outputs.len());
        let mut canonical_format = None;

        for (index, output) in history.outputs.iter().enumerate() {
            let bytes = match retry
                .run(RenderClientError::is_retryable, || self.render_client.fetch_artifact(output))
                .await
            {
                Ok(bytes) => bytes,
                Err(e) => return self.terminate_with_failure(job_id, &job, e).await,
            };

            match self.write_output(&job, index, &bytes).await {
                Ok((path, thumb_path, format)) => {
                    if canonical_format.is_none() {
                        canonical_format = Some(format);
                    }
                    output_paths.push(path);
                    thumbnail_paths.push(thumb_path);
                }
                Err(e) => return Err(e),
            }
        }

        if output_paths.is_empty() {
            return self
                .terminate_with_store_failure(job_id, &job, ForgeWorkerError::NoOutputs)
                .await;
        }

        // 8/9. materialize artifact + complete job
        let artifact = self
            .store
            .create_artifact(NewArtifact {
                user_id: job.user_id,
                title: job.prompt.clone(),
                path: output_paths[0].clone(),
                thumbnail_path: thumbnail_paths[0].clone(),
                alt_resolution_thumbnails: Default::default(),
                content_type: canonical_format.expect("checked non-empty above"),
                item_metadata: serde_json::json!({
                    "prompt": job.prompt,
                    "outputs": output_paths,
                }),
            })
            .await?;

        self.store
            .complete_job(job_id, artifact.id, output_paths.clone(), thumbnail_paths)
            .await?;

        // 10. notify, best-effort
        if let Err(e) = self
            .store
            .create_notification(NewNotification {
                user_id: job.user_id,
                title: "Your render is ready".to_string(),
                message: format!("Job #{job_id} finished rendering."),
                notification_type: NotificationType::JobCompleted,
                related_job_id: Some(job_id),
                related_artifact_id: Some(artifact.id),
            })
            .await
        {
            tracing::warn!(job_id, error = %e, "failed to create completion notification");
        }

        // 11. publish completed
        self.progress
            .publish(ProgressEvent::completed(job_id, Utc::now(), artifact.id, output_paths));

        Ok(())
    }

    fn spawn_cancel_watcher(&self, job_id: i64, cancel: CancelToken) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let interval = self.config.cancel_poll_interval;
        tokio::spawn(async move {
            loop {
                if cancel.is_cancelled() {
                    return;
                }
                tokio::time::sleep(interval).await;
                match store.get_job(job_id).await {
                    Ok(job) if job.status == JobStatus::Cancelled => {
                        cancel.cancel();
                        return;
                    }
                    Ok(_) => {}
                    Err(_) => return,
                }
            }
        })
    }

    async fn write_output(
        &self,
        job: &Job,
        index: usize,
        bytes: &[u8],
    ) -> Result<(String, String, forge_types::ArtifactFormat), ForgeWorkerError> {
        let format = guess_artifact_format(bytes)?;
        let now = Utc::now();
        let dir = format!("{}/{:04}/{:02}/{:02}", job.user_id, now.year(), now.month(), now.day());
        let abs_dir = self.config.artifact_root.join(&dir);
        tokio::fs::create_dir_all(&abs_dir).await?;

        let filename = format!("{}_{}.{}", job.id, index, format.extension());
        let rel_path = format!("{dir}/{filename}");
        tokio::fs::write(self.config.artifact_root.join(&rel_path), bytes).await?;

        let thumbnail_bytes = generate_thumbnail(bytes, self.config.thumbnail_max_dim)?;
        let thumb_filename = format!("thumb_{}_{}.png", job.id, index);
        let thumb_rel_path = format!("{dir}/{thumb_filename}");
        tokio::fs::write(
            self.config.artifact_root.join(&thumb_rel_path),
            &thumbnail_bytes,
        )
        .await?;

        Ok((rel_path, thumb_rel_path, format))
    }

    async fn terminate_with_failure(
        &self,
        job_id: i64,
        job: &Job,
        error: RenderClientError,
    ) -> Result<(), ForgeWorkerError> {
        self.terminate_with_store_failure(job_id, job, error.into()).await
    }

    async fn terminate_with_timeout(&self, job_id: i64, job: &Job) -> Result<(), ForgeWorkerError> {
        let hints = vec![
            "reduce batch size".to_string(),
            "reduce image width".to_string(),
            "reduce image height".to_string(),
            "try a different model".to_string(),
        ];
        self.store
            .fail_job(job_id, "generation exceeded time budget", hints)
            .await?;
        self.notify_failure(job_id, job).await;
        self.progress
            .publish(ProgressEvent::failed(job_id, Utc::now(), "generation exceeded time budget"));
        Ok(())
    }

    async fn terminate_with_store_failure(
        &self,
        job_id: i64,
        job: &Job,
        error: ForgeWorkerError,
    ) -> Result<(), ForgeWorkerError> {
        let message = truncate_message(&error.to_string());
        self.store.fail_job(job_id, &message, Vec::new()).await?;
        self.notify_failure(job_id, job).await;
        self.progress.publish(ProgressEvent::failed(job_id, Utc::now(), message));
        Ok(())
    }

    async fn notify_failure(&self, job_id: i64, job: &Job) {
        let result = self
            .store
            .create_notification(NewNotification {
                user_id: job.user_id,
                title: "Your render failed".to_string(),
                message: format!("Job #{job_id} failed to render."),
                notification_type: NotificationType::JobFailed,
                related_job_id: Some(job_id),
                related_artifact_id: None,
            })
            .await;
        if let Err(e) = result {
            tracing::warn!(job_id, error = %e, "failed to create failure notification");
        }
    }
}
