//! Response envelopes shared by every HTTP error path (`spec.md` §6.1).
//!
//! These are pure data shapes; `forge-api` owns turning internal errors
//! into one of these and picking the status code.

use serde::Serialize;

use crate::job::FieldError;

/// `422 Unprocessable Entity` body, one entry per violated field.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationErrorBody {
    pub detail: Vec<FieldError>,
}

impl ValidationErrorBody {
    pub fn new(errors: Vec<FieldError>) -> Self {
        Self { detail: errors }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerUnavailableSupportInfo {
    pub details: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerUnavailableError {
    pub message: String,
    pub service: String,
    pub status: String,
    pub support_info: WorkerUnavailableSupportInfo,
}

/// `503 Service Unavailable` body returned when no worker has reported
/// healthy within the worker-health gate's timeout. Shape is the
/// verbatim envelope from `spec.md` §6.1.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerUnavailableBody {
    pub error: WorkerUnavailableError,
}

impl WorkerUnavailableBody {
    pub fn new() -> Self {
        Self {
            error: WorkerUnavailableError {
                message:
                    "The image queuing service is not currently running. Please try again shortly."
                        .to_string(),
                service: "celery_worker".to_string(),
                status: "unavailable".to_string(),
                support_info: WorkerUnavailableSupportInfo {
                    details: "No worker has sent a heartbeat within the configured window."
                        .to_string(),
                },
            },
        }
    }
}

impl Default for WorkerUnavailableBody {
    fn default() -> Self {
        Self::new()
    }
}

/// Generic single-message body used for `404`/`403`/`409` paths.
#[derive(Debug, Clone, Serialize)]
pub struct MessageBody {
    pub detail: String,
}

impl MessageBody {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_body_serializes_detail_array() {
        let body = ValidationErrorBody::new(vec![FieldError::new("prompt", "must not be empty")]);
        let json = serde_json::to_value(&body).unwrap();
        assert!(json["detail"].is_array());
        assert_eq!(json["detail"][0]["msg"], "must not be empty");
    }

    #[test]
    fn worker_unavailable_body_matches_the_documented_envelope_shape() {
        let body = WorkerUnavailableBody::new();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"]["service"], "celery_worker");
        assert_eq!(json["error"]["status"], "unavailable");
        assert!(json["error"]["support_info"]["details"].is_string());
    }
}
