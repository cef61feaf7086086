//! Wire shapes exchanged with the render engine. `WorkflowDocument` is
//! opaque to C1 — `forge-worker` is the only crate that knows how to
//! build one from a job row (`spec.md` §4.4 step 3).

use serde::{Deserialize, Serialize};

/// A JSON-shaped workflow document, already fully built. C1 never
/// inspects its contents beyond serializing it into the submit body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDocument(pub serde_json::Value);

impl WorkflowDocument {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn into_inner(self) -> serde_json::Value {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PromptId(pub String);

impl std::fmt::Display for PromptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single engine output reference, enough to issue a `fetch_artifact`
/// call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputRef {
    pub filename: String,
    pub subfolder: String,
    pub file_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineRunStatus {
    Running,
    Finished,
    Error,
}

/// Result of polling the engine's history/status endpoint to
/// completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineHistory {
    pub prompt_id: PromptId,
    pub status: EngineRunStatus,
    pub outputs: Vec<OutputRef>,
    pub error_message: Option<String>,
}
