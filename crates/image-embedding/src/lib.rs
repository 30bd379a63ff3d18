pub mod nv_dinov2;

pub use asset_uploader::ImageSource;
pub use nv_dinov2::{NvDinoV2, NvDinoV2Config};

/// Embedding vector produced by the remote model.
pub type EmbeddingOutput = Vec<f32>;
