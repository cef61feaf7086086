//! Progress events published by the worker and relayed to subscribers
//! over the streaming transport (`spec.md` §3, §4.2, component C2).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `kind ∈ {started, processing, completed, failed}` per `spec.md` §3,
/// plus `cancelled` per the Open Question #1 decision in §9
/// (published, not suppressed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEventKind {
    Started,
    Processing,
    Completed {
        content_id: i64,
        output_paths: Vec<String>,
    },
    Failed {
        error: String,
    },
    Cancelled,
}

/// A single point in a job's progress timeline. Never persisted (§3);
/// events for one job are delivered to a subscriber in publication
/// order (P7), with no ordering guarantee across jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: i64,
    #[serde(flatten)]
    pub kind: ProgressEventKind,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn started(job_id: i64, timestamp: DateTime<Utc>) -> Self {
        Self {
            job_id,
            kind: ProgressEventKind::Started,
            timestamp,
        }
    }

    pub fn processing(job_id: i64, timestamp: DateTime<Utc>) -> Self {
        Self {
            job_id,
            kind: ProgressEventKind::Processing,
            timestamp,
        }
    }

    pub fn completed(
        job_id: i64,
        timestamp: DateTime<Utc>,
        content_id: i64,
        output_paths: Vec<String>,
    ) -> Self {
        Self {
            job_id,
            kind: ProgressEventKind::Completed {
                content_id,
                output_paths,
            },
            timestamp,
        }
    }

    pub fn failed(job_id: i64, timestamp: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            job_id,
            kind: ProgressEventKind::Failed {
                error: error.into(),
            },
            timestamp,
        }
    }

    pub fn cancelled(job_id: i64, timestamp: DateTime<Utc>) -> Self {
        Self {
            job_id,
            kind: ProgressEventKind::Cancelled,
            timestamp,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            ProgressEventKind::Completed { .. }
                | ProgressEventKind::Failed { .. }
                | ProgressEventKind::Cancelled
        )
    }
}
