//! The five HTTP job operations of `spec.md` §6.1, handler style
//! grounded on `ob-poc-web/src/routes/api.rs` (`State`/`Path`/`Json`
//! extractors, `tracing::error!` on unexpected store failures).

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use forge_store::{NewJob, TaskHandle};
use forge_types::{validate_create_job, CreateJobRequest, Job, JobListFilters, JobStatus, Page};

use crate::auth::Caller;
use crate::error::ApiError;
use crate::state::AppState;

/// How fresh a worker's last heartbeat must be to count as "reachable"
/// for the create-time health gate. Not specified verbatim by `spec.md`
/// §4.5 beyond "short timeout (≤ 1s) on the inspection call itself";
/// this window is a separate, generous bound on heartbeat age so a
/// worker between poll iterations still counts as alive.
const HEARTBEAT_FRESHNESS: Duration = Duration::from_secs(15);

pub async fn create_job(
    State(state): State<AppState>,
    Caller(user_id): Caller,
    Json(request): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<Job>), ApiError> {
    let errors = validate_create_job(&request);
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let healthy_workers = tokio::time::timeout(
        state.settings.worker_health_timeout,
        state.queue.worker_heartbeat_count(HEARTBEAT_FRESHNESS),
    )
    .await;

    match healthy_workers {
        Ok(Ok(count)) if count > 0 => {}
        Ok(Ok(_)) => return Err(ApiError::WorkerUnavailable),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "worker heartbeat inspection failed");
            return Err(ApiError::WorkerUnavailable);
        }
        Err(_) => return Err(ApiError::WorkerUnavailable),
    }

    let mut job = state
        .store
        .create_job(NewJob { user_id, request })
        .await?;

    let handle = state.queue.enqueue(job.id).await?;
    state.store.set_task_handle(job.id, &handle.0).await?;
    job.task_handle = Some(handle.0);

    Ok((StatusCode::CREATED, Json(job)))
}

pub async fn get_job(
    State(state): State<AppState>,
    Caller(user_id): Caller,
    Path(job_id): Path<i64>,
) -> Result<Json<Job>, ApiError> {
    let job = state.store.get_job(job_id).await?;
    if job.user_id != user_id {
        return Err(ApiError::Store(forge_store::JobStoreError::NotOwner(job_id)));
    }
    Ok(Json(job))
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Caller(user_id): Caller,
    Query(filters): Query<JobListFilters>,
) -> Result<Json<Page<Job>>, ApiError> {
    let page = state.store.list_jobs(user_id, filters).await?;
    Ok(Json(page))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Caller(user_id): Caller,
    Path(job_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let job = state.store.get_job(job_id).await?;
    if job.user_id != user_id {
        return Err(ApiError::Store(forge_store::JobStoreError::NotOwner(job_id)));
    }

    let previous_status = state.store.cancel_job(job_id, None).await?;

    if previous_status == JobStatus::Pending {
        if let Some(handle) = job.task_handle {
            if let Err(e) = state.queue.revoke(&TaskHandle(handle)).await {
                tracing::warn!(job_id, error = %e, "failed to revoke task handle on cancel");
            }
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_job(
    State(state): State<AppState>,
    Caller(user_id): Caller,
    Path(job_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_job(job_id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
