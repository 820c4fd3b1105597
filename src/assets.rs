//! Remote image ingestion: fetch bytes from the legacy host and re-upload
//! them to the asset store.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::store::AssetStore;
use crate::util::env::env_parse;

/// Bounded linear-backoff retry for the two outbound calls per image.
/// The legacy script had no retry at all; this makes the policy explicit
/// and env-tunable instead of leaning on transport defaults.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 300,
        }
    }
}

impl RetryPolicy {
    pub fn from_env() -> Self {
        Self {
            max_attempts: env_parse("MIGRATE_MAX_RETRIES", 3u32),
            backoff_base_ms: env_parse("MIGRATE_BACKOFF_MS", 300u64),
        }
    }
}

/// Asset-ingestion seam for the migration controller; production uses
/// [`HttpAssetIngester`], tests substitute a stub.
#[async_trait]
pub trait AssetIngest: Send + Sync {
    /// Fetch `image_url` and re-host its bytes, returning the asset id.
    async fn ingest(&self, image_url: &str, alt_text: &str) -> Result<String>;
}

/// Fetches images over HTTP and uploads them through an [`AssetStore`].
pub struct HttpAssetIngester<'a> {
    http: Client,
    store: &'a dyn AssetStore,
    retry: RetryPolicy,
}

impl<'a> HttpAssetIngester<'a> {
    pub fn new(http: Client, store: &'a dyn AssetStore, retry: RetryPolicy) -> Self {
        Self { http, store, retry }
    }

    async fn try_ingest(&self, image_url: &str) -> Result<String> {
        let resp = self.http.get(image_url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("image fetch returned {status} for {image_url}"));
        }
        let bytes = resp.bytes().await?;
        // Uniqueness is cosmetic; the store assigns the canonical id.
        let filename = format!("motor-{}.jpg", Uuid::new_v4());
        self.store.upload_image(bytes, &filename).await
    }
}

#[async_trait]
impl AssetIngest for HttpAssetIngester<'_> {
    async fn ingest(&self, image_url: &str, alt_text: &str) -> Result<String> {
        debug!(url = %image_url, alt = %alt_text, "uploading image");
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.try_ingest(image_url).await {
                Ok(asset_id) => return Ok(asset_id),
                Err(err) if attempt < self.retry.max_attempts => {
                    warn!(url = %image_url, attempt, error = %err, "image ingest retrying");
                    let sleep_ms = self.retry.backoff_base_ms.saturating_mul(attempt as u64);
                    sleep(Duration::from_millis(sleep_ms)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
