//! Error kinds for component C1 (`spec.md` §7).

#[derive(Debug, thiserror::Error)]
pub enum RenderClientError {
    #[error("render engine unreachable: {0}")]
    EngineUnavailable(String),

    #[error("render engine rejected the request: {0}")]
    EngineRejected(String),

    #[error("artifact not found: {0}")]
    ArtifactMissing(String),

    #[error("render request exceeded its deadline")]
    Timeout,

    #[error("render request was cancelled")]
    Cancelled,
}

impl RenderClientError {
    /// Whether a retry at the call site (`forge-worker`) is worth
    /// attempting. Only transport-level unavailability is transient;
    /// everything else is permanent per `spec.md` §4.4's failure table.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::EngineUnavailable(_))
    }
}
