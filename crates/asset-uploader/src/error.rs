use thiserror::Error;

pub type UploadResult<T> = std::result::Result<T, UploadError>;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Asset request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Malformed asset id {raw:?}: {source}")]
    MalformedAssetId { raw: String, source: uuid::Error },
}
