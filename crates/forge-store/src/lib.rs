//! Component C3: transactional persistence of jobs, artifacts and
//! notifications, plus the Postgres-backed task queue.

pub mod error;
pub mod fake;
pub mod job_store;
pub mod task_queue;

pub use error::JobStoreError;
pub use fake::{InMemoryJobStore, InMemoryTaskQueue};
pub use job_store::{JobStore, NewJob, PgJobStore};
pub use task_queue::{ClaimedTask, PgTaskQueue, TaskHandle, TaskQueue};

/// Run the workspace's embedded migrations against `pool`. Called once
/// at process start in `forge-api`'s `main`.
pub async fn run_migrations(pool: &sqlx::PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await
}
