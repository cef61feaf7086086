//! Error kinds for component C3 (`spec.md` §7).

#[derive(Debug, thiserror::Error)]
pub enum JobStoreError {
    #[error("job {0} not found")]
    JobNotFound(i64),

    #[error("artifact {0} not found")]
    ArtifactNotFound(i64),

    #[error("notification {0} not found")]
    NotificationNotFound(i64),

    #[error("illegal status transition on job {job_id}: {reason}")]
    IllegalTransition { job_id: i64, reason: String },

    #[error("job {job_id} already has a different task handle set")]
    TaskHandleConflict { job_id: i64 },

    #[error("caller does not own job {0}")]
    NotOwner(i64),

    #[error("job {0} is not terminal, cannot be deleted")]
    NotTerminal(i64),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}
