//! Process wiring for component C5: starts C2 (`ProgressBus`), C3
//! (`PgJobStore`/`PgTaskQueue`) and C4 (`WorkerPool`), then serves the
//! `forge_api::router` HTTP/WS surface. Startup shape grounded on
//! `ob-poc-web/src/main.rs`: `tracing_subscriber` init, `DATABASE_URL`
//! connect, `SERVER_PORT` bind. **[ADDED]** graceful shutdown on
//! SIGINT/SIGTERM that also tears down the worker pool.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use forge_api::router::build_router;
use forge_api::settings::Settings;
use forge_api::state::AppState;
use forge_progress::ProgressBus;
use forge_render_client::HttpRenderClient;
use forge_store::{run_migrations, PgJobStore, PgTaskQueue};
use forge_worker::{WorkerPool, WorkerPoolConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "forge_api=debug,forge_worker=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting forge job orchestrator");

    let settings = Arc::new(Settings::from_env());

    let pool = sqlx::PgPool::connect(&settings.database_url)
        .await
        .expect("failed to connect to database");
    tracing::info!("database connection established");

    run_migrations(&pool)
        .await
        .expect("failed to run migrations");

    let store: Arc<dyn forge_store::JobStore> = Arc::new(PgJobStore::new(pool.clone()));
    let queue: Arc<dyn forge_store::TaskQueue> = Arc::new(PgTaskQueue::new(pool.clone()));
    let progress = Arc::new(ProgressBus::new());
    let render_client: Arc<dyn forge_render_client::RenderClient> = Arc::new(HttpRenderClient::new(
        settings.render_engine_base_url.clone(),
        settings.render_poll_interval,
    ));

    let shutdown = tokio_util::sync::CancellationToken::new();

    let worker_pool = Arc::new(WorkerPool::new(
        Arc::clone(&store),
        Arc::clone(&queue),
        Arc::clone(&progress),
        render_client,
        WorkerPoolConfig {
            pool_size: settings.worker_pool_size,
            artifact_root: settings.artifact_root.clone().into(),
            job_max_duration: settings.job_max_duration,
            cancel_poll_interval: settings.cancel_poll_interval,
            thumbnail_max_dim: settings.thumbnail_max_dim,
        },
    ));
    let worker_pool_shutdown = shutdown.clone();
    let worker_pool_handle = tokio::spawn(async move {
        worker_pool.run(worker_pool_shutdown).await;
    });

    let app_state = AppState::new(store, queue, progress, Arc::clone(&settings));
    let app = build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.server_port));
    tracing::info!("forge api listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind listener");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .expect("server error");

    let _ = worker_pool_handle.await;
}

async fn shutdown_signal(shutdown: tokio_util::sync::CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received, draining workers");
    shutdown.cancel();
}
