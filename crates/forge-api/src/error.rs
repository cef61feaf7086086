//! `ApiError`: maps every internal error path to the HTTP envelope in
//! `spec.md` §6.1, the idiomatic axum `IntoResponse` error shape.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use forge_store::JobStoreError;
use forge_types::{FieldError, MessageBody, ValidationErrorBody, WorkerUnavailableBody};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("validation failed")]
    Validation(Vec<FieldError>),

    #[error("no worker is currently available")]
    WorkerUnavailable,

    #[error(transparent)]
    Store(#[from] JobStoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(errors) => {
                (StatusCode::UNPROCESSABLE_ENTITY, Json(ValidationErrorBody::new(errors)))
                    .into_response()
            }
            ApiError::WorkerUnavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, Json(WorkerUnavailableBody::new())).into_response()
            }
            ApiError::Store(JobStoreError::JobNotFound(id)) => (
                StatusCode::NOT_FOUND,
                Json(MessageBody::new(format!("job {id} not found"))),
            )
                .into_response(),
            ApiError::Store(JobStoreError::ArtifactNotFound(id)) => (
                StatusCode::NOT_FOUND,
                Json(MessageBody::new(format!("artifact {id} not found"))),
            )
                .into_response(),
            ApiError::Store(JobStoreError::NotificationNotFound(id)) => (
                StatusCode::NOT_FOUND,
                Json(MessageBody::new(format!("notification {id} not found"))),
            )
                .into_response(),
            ApiError::Store(JobStoreError::NotOwner(id)) => (
                StatusCode::FORBIDDEN,
                Json(MessageBody::new(format!("job {id} is not owned by the caller"))),
            )
                .into_response(),
            ApiError::Store(JobStoreError::NotTerminal(id)) => (
                StatusCode::CONFLICT,
                Json(MessageBody::new(format!("job {id} has not reached a terminal status"))),
            )
                .into_response(),
            ApiError::Store(err) => {
                tracing::error!(error = %err, "unhandled store error");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(MessageBody::new("internal error")))
                    .into_response()
            }
        }
    }
}
