//! Error kinds for component C4 (`spec.md` §7).

use forge_render_client::RenderClientError;
use forge_store::JobStoreError;

#[derive(Debug, thiserror::Error)]
pub enum ForgeWorkerError {
    #[error(transparent)]
    RenderClient(#[from] RenderClientError),

    #[error(transparent)]
    Store(#[from] JobStoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("render engine produced no outputs")]
    NoOutputs,

    #[error("unsupported image format: {0}")]
    UnsupportedImageFormat(String),
}
