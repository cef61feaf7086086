//! Shared types crossing the store/worker/API boundaries.
//!
//! `forge-types` has no database or HTTP dependency of its own — it is
//! the vocabulary the other crates in the workspace speak, so a change
//! to a wire shape only has to happen in one place.

pub mod api_error;
pub mod artifact;
pub mod job;
pub mod notification;
pub mod progress;

pub use api_error::{MessageBody, ValidationErrorBody, WorkerUnavailableBody};
pub use artifact::{Artifact, ArtifactFormat, NewArtifact};
pub use job::{
    validate_create_job, CreateJobRequest, FieldError, Job, JobListFilters, JobStatus,
    LoraAdapter, Page, ParamMap, SamplerConfig,
};
pub use notification::{NewNotification, Notification, NotificationPreferences, NotificationType};
pub use progress::{ProgressEvent, ProgressEventKind};

pub use job::uuid_shim::UserId;
