mod error;

pub use error::{UploadError, UploadResult};

use image::RgbImage;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

pub const NVCF_ASSETS_URL: &str = "https://api.nvcf.nvidia.com/v2/nvcf/assets";

const JPEG_CONTENT_TYPE: &str = "image/jpeg";
const ASSET_DESCRIPTION_HEADER: &str = "x-amz-meta-nvcf-asset-description";
// byte transfers can be large, so they get a higher timeout floor than
// ordinary requests
const TRANSFER_TIMEOUT_FLOOR: Duration = Duration::from_secs(300);

/// Image to upload, either already decoded or read from disk.
#[derive(Clone)]
pub enum ImageSource {
    Image(RgbImage),
    ImageFilePath(PathBuf),
}

impl From<RgbImage> for ImageSource {
    fn from(image: RgbImage) -> Self {
        Self::Image(image)
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        Self::ImageFilePath(path)
    }
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        Self::ImageFilePath(path.to_path_buf())
    }
}

impl From<&str> for ImageSource {
    fn from(path: &str) -> Self {
        Self::ImageFilePath(PathBuf::from(path))
    }
}

impl From<String> for ImageSource {
    fn from(path: String) -> Self {
        Self::ImageFilePath(PathBuf::from(path))
    }
}

pub struct AssetUploaderConfig {
    pub assets_url: String,
    pub api_key: String,
    pub request_timeout: Duration,
}

impl AssetUploaderConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            assets_url: NVCF_ASSETS_URL.to_string(),
            api_key: api_key.into(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Clone)]
pub struct AssetUploader {
    client: reqwest::Client,
    assets_url: String,
    header_auth: String,
    request_timeout: Duration,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateAssetResponse {
    upload_url: String,
    asset_id: String,
}

impl AssetUploader {
    pub fn new(config: AssetUploaderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            assets_url: config.assets_url,
            header_auth: format!("Bearer {}", config.api_key),
            request_timeout: config.request_timeout,
        }
    }

    /// Register an asset slot, transfer the image as an RGB JPEG and return
    /// the asset id it was stored under. The returned upload url is valid
    /// for a single transfer and is consumed here.
    ///
    /// Failures are not retried at this layer.
    pub async fn upload_image(
        &self,
        source: &ImageSource,
        description: &str,
    ) -> UploadResult<Uuid> {
        let slot = self.create_asset(description).await?;
        let bytes = encode_jpeg(source)?;
        self.transfer_bytes(&slot.upload_url, bytes, description)
            .await?;

        debug!("asset {} uploaded", &slot.asset_id);

        Uuid::parse_str(&slot.asset_id).map_err(|source| UploadError::MalformedAssetId {
            raw: slot.asset_id,
            source,
        })
    }

    async fn create_asset(&self, description: &str) -> UploadResult<CreateAssetResponse> {
        let payload = serde_json::json!({
            "contentType": JPEG_CONTENT_TYPE,
            "description": description,
        });

        let response = self
            .client
            .post(&self.assets_url)
            .header(AUTHORIZATION, &self.header_auth)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .json(&payload)
            .timeout(self.request_timeout)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<CreateAssetResponse>().await?)
    }

    async fn transfer_bytes(
        &self,
        upload_url: &str,
        bytes: Vec<u8>,
        description: &str,
    ) -> UploadResult<()> {
        self.client
            .put(upload_url)
            .header(CONTENT_TYPE, JPEG_CONTENT_TYPE)
            .header(ASSET_DESCRIPTION_HEADER, description)
            .body(bytes)
            .timeout(self.request_timeout.max(TRANSFER_TIMEOUT_FLOOR))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

fn encode_jpeg(source: &ImageSource) -> UploadResult<Vec<u8>> {
    let image = match source {
        ImageSource::Image(image) => image.clone(),
        ImageSource::ImageFilePath(path) => image::open(path)?.to_rgb8(),
    };

    let mut buffer = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(image).write_to(&mut buffer, image::ImageFormat::Jpeg)?;

    Ok(buffer.into_inner())
}
