//! HTTP-level integration tests for the five job endpoints
//! (`spec.md` §6.1, §8), built against the in-memory store/queue fakes
//! so no live Postgres is required. Style grounded on
//! `sem_os_server/tests/authoring_http_integration.rs`: `build_router`
//! + `tower::ServiceExt::oneshot` + `http_body_util::BodyExt`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use http_body_util::BodyExt;
use hyper::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use forge_api::auth::CALLER_HEADER;
use forge_api::router::build_router;
use forge_api::settings::Settings;
use forge_api::state::AppState;
use forge_progress::ProgressBus;
use forge_store::{InMemoryJobStore, InMemoryTaskQueue, JobStore, TaskQueue};

fn test_settings() -> Settings {
    Settings {
        database_url: String::new(),
        artifact_root: "./artifacts".to_string(),
        render_engine_base_url: "http://127.0.0.1:1".to_string(),
        render_poll_interval: Duration::from_millis(10),
        job_max_duration: Duration::from_secs(5),
        worker_pool_size: 1,
        server_port: 0,
        thumbnail_max_dim: 64,
        cancel_poll_interval: Duration::from_millis(10),
        worker_health_timeout: Duration::from_millis(200),
    }
}

struct Harness {
    app: axum::Router,
    store: Arc<dyn JobStore>,
    queue: Arc<dyn TaskQueue>,
}

fn harness() -> Harness {
    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let queue: Arc<dyn TaskQueue> = Arc::new(InMemoryTaskQueue::new());
    let progress = Arc::new(ProgressBus::new());
    let state = AppState::new(
        Arc::clone(&store),
        Arc::clone(&queue),
        progress,
        Arc::new(test_settings()),
    );
    Harness {
        app: build_router(state),
        store,
        queue,
    }
}

fn valid_job_body() -> Value {
    json!({
        "prompt": "a cat wearing a hat",
        "checkpoint": "sd_xl_base.safetensors",
        "width": 512,
        "height": 512,
        "batch_size": 1,
        "sampler": {
            "seed": -1,
            "steps": 20,
            "cfg": 7.0,
            "sampler_name": "euler_ancestral",
            "scheduler_name": "normal",
            "denoise": 1.0
        }
    })
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn create_job_without_workers_returns_503_and_creates_no_job() {
    let h = harness();
    let user = uuid::Uuid::new_v4();

    let request = Request::builder()
        .method("POST")
        .uri("/jobs")
        .header("content-type", "application/json")
        .header(CALLER_HEADER, user.to_string())
        .body(Body::from(valid_job_body().to_string()))
        .unwrap();

    let response = h.app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["error"]["service"], "celery_worker");
    assert_eq!(body["error"]["status"], "unavailable");

    let page = h
        .store
        .list_jobs(forge_types::UserId(user), Default::default())
        .await
        .unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn create_job_with_a_healthy_worker_returns_201_and_enqueues() {
    let h = harness();
    h.queue.record_worker_heartbeat("worker-0").await.unwrap();
    let user = uuid::Uuid::new_v4();

    let request = Request::builder()
        .method("POST")
        .uri("/jobs")
        .header("content-type", "application/json")
        .header(CALLER_HEADER, user.to_string())
        .body(Body::from(valid_job_body().to_string()))
        .unwrap();

    let response = h.app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "pending");

    let claimed = h.queue.claim(1).await.unwrap();
    assert_eq!(claimed.len(), 1);
}

#[tokio::test]
async fn create_job_with_invalid_body_returns_422_with_field_errors() {
    let h = harness();
    h.queue.record_worker_heartbeat("worker-0").await.unwrap();
    let user = uuid::Uuid::new_v4();

    let mut body = valid_job_body();
    body["width"] = json!(500);

    let request = Request::builder()
        .method("POST")
        .uri("/jobs")
        .header("content-type", "application/json")
        .header(CALLER_HEADER, user.to_string())
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = h.app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert!(body["detail"]
        .as_array()
        .unwrap()
        .iter()
        .any(|e| e["loc"].as_array().unwrap().contains(&json!("width"))));
}

#[tokio::test]
async fn missing_caller_header_is_rejected() {
    let h = harness();
    let request = Request::builder()
        .method("POST")
        .uri("/jobs")
        .header("content-type", "application/json")
        .body(Body::from(valid_job_body().to_string()))
        .unwrap();

    let response = h.app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn get_job_rejects_a_non_owning_caller() {
    let h = harness();
    let owner = forge_types::UserId(uuid::Uuid::new_v4());
    let job = h
        .store
        .create_job(forge_store::NewJob {
            user_id: owner,
            request: serde_json::from_value(valid_job_body()).unwrap(),
        })
        .await
        .unwrap();

    let other = uuid::Uuid::new_v4();
    let request = Request::builder()
        .method("GET")
        .uri(format!("/jobs/{}", job.id))
        .header(CALLER_HEADER, other.to_string())
        .body(Body::empty())
        .unwrap();

    let response = h.app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn get_job_not_found_returns_404() {
    let h = harness();
    let user = uuid::Uuid::new_v4();
    let request = Request::builder()
        .method("GET")
        .uri("/jobs/999")
        .header(CALLER_HEADER, user.to_string())
        .body(Body::empty())
        .unwrap();

    let response = h.app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_job_is_idempotent_and_revokes_a_pending_handle() {
    let h = harness();
    h.queue.record_worker_heartbeat("worker-0").await.unwrap();
    let owner = uuid::Uuid::new_v4();

    let create_request = Request::builder()
        .method("POST")
        .uri("/jobs")
        .header("content-type", "application/json")
        .header(CALLER_HEADER, owner.to_string())
        .body(Body::from(valid_job_body().to_string()))
        .unwrap();
    let created = h.app.clone().oneshot(create_request).await.unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let created_body = body_json(created).await;
    let job_id = created_body["id"].as_i64().unwrap();
    assert!(created_body["task_handle"].is_string());

    let cancel_once = |owner: uuid::Uuid, job_id: i64, app: axum::Router| async move {
        let request = Request::builder()
            .method("PUT")
            .uri(format!("/jobs/{job_id}/cancel"))
            .header(CALLER_HEADER, owner.to_string())
            .body(Body::empty())
            .unwrap();
        app.oneshot(request).await.unwrap()
    };

    let response = cancel_once(owner, job_id, h.app.clone()).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = cancel_once(owner, job_id, h.app.clone()).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let stored = h.store.get_job(job_id).await.unwrap();
    assert_eq!(stored.status, forge_types::JobStatus::Cancelled);

    let claimed = h.queue.claim(10).await.unwrap();
    assert!(
        claimed.iter().all(|t| t.job_id != job_id),
        "cancelled job's task handle should have been revoked from the queue"
    );
}

#[tokio::test]
async fn delete_job_before_terminal_status_returns_409() {
    let h = harness();
    let owner = forge_types::UserId(uuid::Uuid::new_v4());
    let job = h
        .store
        .create_job(forge_store::NewJob {
            user_id: owner,
            request: serde_json::from_value(valid_job_body()).unwrap(),
        })
        .await
        .unwrap();

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/jobs/{}", job.id))
        .header(CALLER_HEADER, owner.0.to_string())
        .body(Body::empty())
        .unwrap();

    let response = h.app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}
