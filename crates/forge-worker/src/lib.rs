//! Component C4: the worker runtime that claims queued jobs, drives
//! them through the render engine, and materializes their artifacts.

pub mod error;
pub mod pool;
pub mod thumbnail;
pub mod workflow_builder;

pub use error::ForgeWorkerError;
pub use pool::{WorkerPool, WorkerPoolConfig};
pub use thumbnail::{generate_thumbnail, guess_artifact_format};
pub use workflow_builder::build_workflow;
