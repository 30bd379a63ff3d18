//! Client for the hosted NV-DINOv2 image embedding function.
//!
//! Every image is first uploaded to the cloud asset store, then a single
//! inference call referencing the asset returns a JSON document carrying the
//! embedding.

pub mod response;

use asset_uploader::{AssetUploader, AssetUploaderConfig, ImageSource, NVCF_ASSETS_URL};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::EmbeddingOutput;
use response::extract_embedding;

pub const NV_DINOV2_URL: &str = "https://ai.api.nvidia.com/v1/cv/nvidia/nv-dinov2";

const DEFAULT_CONCURRENCY: usize = 8;
const ASSET_DESCRIPTION: &str = "input image";

pub struct NvDinoV2Config {
    pub base_url: String,
    pub assets_url: String,
    pub api_key: String,
    pub request_timeout: Duration,
    /// Extra inference attempts after the first one.
    pub max_retries: u32,
    /// Base delay between inference attempts, doubled on every retry.
    pub retry_backoff: Duration,
}

impl NvDinoV2Config {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: NV_DINOV2_URL.to_string(),
            assets_url: NVCF_ASSETS_URL.to_string(),
            api_key: api_key.into(),
            request_timeout: Duration::from_secs(60),
            max_retries: 2,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

#[derive(Clone)]
pub struct NvDinoV2 {
    client: reqwest::Client,
    uploader: AssetUploader,
    base_url: String,
    header_auth: String,
    request_timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
}

impl NvDinoV2 {
    pub fn new(config: NvDinoV2Config) -> Self {
        let uploader = AssetUploader::new(AssetUploaderConfig {
            assets_url: config.assets_url,
            api_key: config.api_key.clone(),
            request_timeout: config.request_timeout,
        });

        Self {
            client: reqwest::Client::new(),
            uploader,
            base_url: config.base_url,
            header_auth: format!("Bearer {}", config.api_key),
            request_timeout: config.request_timeout,
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
        }
    }

    async fn try_infer(&self, asset_ref: &str) -> Result<Value, reqwest::Error> {
        let response = self
            .client
            .post(&self.base_url)
            .header(AUTHORIZATION, &self.header_auth)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .header("NVCF-INPUT-ASSET-REFERENCES", asset_ref)
            .header("NVCF-FUNCTION-ASSET-IDS", asset_ref)
            .json(&json!({ "messages": [] }))
            .timeout(self.request_timeout)
            .send()
            .await?
            .error_for_status()?;

        response.json::<Value>().await
    }

    /// Run inference against an uploaded asset.
    ///
    /// The endpoint is known to fail transiently (rate limits, cold
    /// starts), so failed attempts are repeated with exponential backoff.
    /// Only the inference call retries; repeating an upload would register
    /// duplicate assets.
    async fn post_infer(&self, asset_id: Uuid) -> anyhow::Result<Value> {
        let asset_ref = asset_id.to_string();

        let mut attempt = 0;
        loop {
            match self.try_infer(&asset_ref).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries => {
                    let delay = self.retry_backoff * 2_u32.pow(attempt);
                    tracing::warn!(
                        "inference attempt {}/{} failed: {}, retrying in {:?}",
                        attempt + 1,
                        self.max_retries + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn embed_once(&self, source: ImageSource) -> anyhow::Result<Value> {
        let asset_id = self
            .uploader
            .upload_image(&source, ASSET_DESCRIPTION)
            .await?;
        self.post_infer(asset_id).await
    }

    /// Upload and infer every image concurrently, returning the raw JSON
    /// documents aligned with input order. An item that failed is recorded
    /// as an `{"error": …}` document at its position instead of aborting
    /// the batch.
    ///
    /// `concurrency` bounds the number of in-flight items (default 8).
    pub async fn process_raw(
        &self,
        sources: Vec<ImageSource>,
        concurrency: Option<usize>,
    ) -> Vec<Value> {
        let total = sources.len();
        let semaphore = Arc::new(Semaphore::new(
            concurrency.unwrap_or(DEFAULT_CONCURRENCY).max(1),
        ));

        tracing::info!("submitting {} embedding request(s)", total);

        let mut handles = Vec::with_capacity(total);
        for (index, source) in sources.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let client = self.clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await?;
                client.embed_once(source).await
            });
            handles.push((index, handle));
        }

        let mut responses = vec![Value::Null; total];
        for (index, handle) in handles {
            responses[index] = match handle.await {
                Ok(Ok(value)) => value,
                Ok(Err(e)) => {
                    tracing::warn!("embedding request {} failed: {}", index, e);
                    json!({ "error": e.to_string() })
                }
                Err(e) => json!({ "error": format!("task failed: {e}") }),
            };
        }

        tracing::info!("collected {} response(s)", total);

        responses
    }

    /// Like [`Self::process_raw`] but with the embedding vector extracted
    /// from every response. Failed items stay in the output as `None`
    /// placeholders, so the output length always matches the input.
    pub async fn process(
        &self,
        sources: Vec<ImageSource>,
        concurrency: Option<usize>,
    ) -> Vec<Option<EmbeddingOutput>> {
        let responses = self.process_raw(sources, concurrency).await;

        let mut failed = 0;
        let embeddings = responses
            .iter()
            .map(|response| {
                let embedding = extract_embedding(response);
                if embedding.is_none() {
                    failed += 1;
                }
                embedding
            })
            .collect();

        if failed > 0 {
            tracing::warn!("{} item(s) failed to produce embeddings", failed);
        }

        embeddings
    }

    /// Embed one image, equivalent to a one-element batch.
    pub async fn embed_single(&self, source: impl Into<ImageSource>) -> Option<EmbeddingOutput> {
        self.process(vec![source.into()], Some(1))
            .await
            .into_iter()
            .next()
            .flatten()
    }

    /// Raw response for one image, equivalent to a one-element batch.
    pub async fn embed_single_raw(&self, source: impl Into<ImageSource>) -> Value {
        self.process_raw(vec![source.into()], Some(1))
            .await
            .into_iter()
            .next()
            .unwrap_or(Value::Null)
    }
}
