//! Component C1: a stateless adapter to the external render engine.

pub mod cancel;
pub mod client;
pub mod error;
pub mod retry;
pub mod workflow;

pub use cancel::CancelToken;
pub use client::{HttpRenderClient, RenderClient};
pub use error::RenderClientError;
pub use retry::RetryPolicy;
pub use workflow::{EngineHistory, EngineRunStatus, OutputRef, PromptId, WorkflowDocument};
