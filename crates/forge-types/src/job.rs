//! Job record and request/validation types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Lifecycle status of a job. Transitions form a DAG:
/// `pending -> running -> {completed, failed}`, `pending -> cancelled`,
/// `running -> cancelled`. No other transition is permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A single LoRA adapter applied on top of the checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoraAdapter {
    pub name: String,
    pub model_strength: f32,
    pub clip_strength: f32,
}

/// Sampler configuration for a render request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// -1 means "pick a random seed".
    pub seed: i64,
    pub steps: u32,
    pub cfg: f32,
    pub sampler_name: String,
    pub scheduler_name: String,
    pub denoise: f32,
}

/// A single render job. Mirrors the `jobs` table in `spec.md` §6.5.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub user_id: uuid_shim::UserId,

    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub checkpoint: String,
    pub loras: Vec<LoraAdapter>,
    pub width: u32,
    pub height: u32,
    pub batch_size: u32,
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub params: serde_json::Value,

    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    #[serde(default)]
    pub recovery_hints: Vec<String>,

    pub content_id: Option<i64>,
    #[serde(default)]
    pub output_paths: Vec<String>,
    #[serde(default)]
    pub thumbnail_paths: Vec<String>,

    /// Task-queue handle. Distinct from `engine_prompt_id`; this is the
    /// identifier exposed to clients as the canonical "task id" (§9 Open
    /// Question #3).
    pub task_handle: Option<String>,
    /// Render-engine-assigned prompt id. Never serialized to clients.
    #[serde(skip_serializing)]
    pub engine_prompt_id: Option<String>,
}

impl Job {
    /// Invariant check used by property tests (P3): a completed job must
    /// reference an artifact, a failed job must carry an error message, a
    /// cancelled job's `started_at` reflects whether it was ever running.
    pub fn terminal_consistency_holds(&self) -> bool {
        match self.status {
            JobStatus::Completed => self.content_id.is_some(),
            JobStatus::Failed => self.error_message.is_some(),
            JobStatus::Cancelled | JobStatus::Pending | JobStatus::Running => true,
        }
    }
}

/// Inbound request to create a job. Not all fields of [`Job`] are
/// client-supplied (status, timestamps, results are server-assigned).
#[derive(Debug, Clone, Deserialize)]
pub struct CreateJobRequest {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    pub checkpoint: String,
    #[serde(default)]
    pub loras: Vec<LoraAdapter>,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub params: serde_json::Value,
}

fn default_batch_size() -> u32 {
    1
}

/// A single field-level validation failure, shaped like the `422` envelope
/// in `spec.md` §6.1: `{"detail":[{"loc":[...], "msg":"..."}]}`.
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub loc: Vec<String>,
    pub msg: String,
}

impl FieldError {
    pub fn new(field: &str, msg: impl Into<String>) -> Self {
        Self {
            loc: vec!["body".to_string(), field.to_string()],
            msg: msg.into(),
        }
    }
}

/// Validate a [`CreateJobRequest`] against the constraints in `spec.md`
/// §4.5. Returns every violation found (not just the first) so the
/// client's 422 body is maximally useful.
pub fn validate_create_job(req: &CreateJobRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if req.prompt.trim().is_empty() {
        errors.push(FieldError::new("prompt", "prompt must not be empty"));
    }

    if req.checkpoint.trim().is_empty() {
        errors.push(FieldError::new("checkpoint", "checkpoint must not be empty"));
    }

    if !(64..=2048).contains(&req.width) || req.width % 64 != 0 {
        errors.push(FieldError::new(
            "width",
            "width must be a multiple of 64 in [64, 2048]",
        ));
    }

    if !(64..=2048).contains(&req.height) || req.height % 64 != 0 {
        errors.push(FieldError::new(
            "height",
            "height must be a multiple of 64 in [64, 2048]",
        ));
    }

    if !(1..=8).contains(&req.batch_size) {
        errors.push(FieldError::new("batch_size", "batch_size must be in [1, 8]"));
    }

    if !(1..=150).contains(&req.sampler.steps) {
        errors.push(FieldError::new(
            "sampler.steps",
            "steps must be in [1, 150]",
        ));
    }

    if req.sampler.seed < -1 {
        errors.push(FieldError::new(
            "sampler.seed",
            "seed must be -1 or a non-negative integer",
        ));
    }

    errors
}

/// Free-form pagination filters for `list_jobs`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobListFilters {
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub skip: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: u32,
    pub skip: u32,
}

/// Arbitrary metadata map, used for `params` free-form fields. Kept as a
/// type alias so call sites read intentfully.
pub type ParamMap = HashMap<String, serde_json::Value>;

/// Small shim so this crate doesn't need to pull in the `uuid` crate just
/// to describe "the caller's identity is an opaque id" — the pipeline
/// consumes an already-authenticated user id (`spec.md` §1) and never
/// constructs one itself in non-test code.
pub mod uuid_shim {
    use serde::{Deserialize, Serialize};
    use std::fmt;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct UserId(pub uuid::Uuid);

    impl fmt::Display for UserId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl From<uuid::Uuid> for UserId {
        fn from(id: uuid::Uuid) -> Self {
            Self(id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> CreateJobRequest {
        CreateJobRequest {
            prompt: "a cat".to_string(),
            negative_prompt: None,
            checkpoint: "sd_xl_base.safetensors".to_string(),
            loras: vec![],
            width: 512,
            height: 768,
            batch_size: 1,
            sampler: SamplerConfig {
                seed: -1,
                steps: 20,
                cfg: 7.0,
                sampler_name: "euler_ancestral".to_string(),
                scheduler_name: "normal".to_string(),
                denoise: 1.0,
            },
            params: serde_json::json!({}),
        }
    }

    #[test]
    fn valid_request_has_no_errors() {
        assert!(validate_create_job(&valid_request()).is_empty());
    }

    #[test]
    fn empty_prompt_is_rejected() {
        let mut req = valid_request();
        req.prompt = "   ".to_string();
        let errors = validate_create_job(&req);
        assert!(errors.iter().any(|e| e.loc.contains(&"prompt".to_string())));
    }

    #[test]
    fn non_multiple_of_64_width_is_rejected() {
        let mut req = valid_request();
        req.width = 500;
        let errors = validate_create_job(&req);
        assert!(errors.iter().any(|e| e.loc.contains(&"width".to_string())));
    }

    #[test]
    fn batch_size_out_of_range_is_rejected() {
        let mut req = valid_request();
        req.batch_size = 9;
        let errors = validate_create_job(&req);
        assert!(errors
            .iter()
            .any(|e| e.loc.contains(&"batch_size".to_string())));
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            let parsed: JobStatus = s.as_str().parse().unwrap();
            assert_eq!(parsed, s);
        }
    }

    #[test]
    fn terminal_statuses_are_flagged() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }
}
