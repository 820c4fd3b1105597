//! Sanity-flavoured content/asset store client.
//!
//! The pipeline only consumes three store operations: a single-document GROQ
//! query, a document create, and a binary image upload. They are modeled as
//! two narrow traits so the migration controller takes explicitly constructed
//! handles and tests can substitute in-memory doubles.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client};
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

use crate::util::env::{env_opt, env_parse, env_req};

/// Document-store collaborator: existence checks, brand lookup, creates.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Run a GROQ query expected to yield at most one document.
    /// `params` are bound as `$key` query parameters.
    async fn query_first(&self, query: &str, params: &[(&str, &str)]) -> Result<Option<Value>>;

    /// Create a document and return the store-assigned id.
    async fn create(&self, doc: Value) -> Result<String>;
}

/// Asset-store collaborator: re-host raw image bytes.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Upload image bytes and return the opaque asset id.
    async fn upload_image(&self, bytes: Bytes, filename: &str) -> Result<String>;
}

/// Connection settings for the Sanity HTTP API, read from the same env keys
/// the studio tooling writes into `.env.local`.
#[derive(Debug, Clone)]
pub struct SanityConfig {
    pub project_id: String,
    pub dataset: String,
    pub token: String,
    pub api_version: String,
    pub timeout_secs: u64,
}

impl SanityConfig {
    pub fn from_env() -> Result<Self> {
        let project_id = env_opt("NEXT_PUBLIC_SANITY_PROJECT_ID")
            .map(Ok)
            .unwrap_or_else(|| env_req("SANITY_PROJECT_ID"))?;
        let token = env_opt("SANITY_API_WRITE_TOKEN")
            .or_else(|| env_opt("SANITY_API_READ_TOKEN"))
            .ok_or_else(|| anyhow!("missing env var SANITY_API_WRITE_TOKEN"))?;
        Ok(Self {
            project_id,
            dataset: env_opt("NEXT_PUBLIC_SANITY_DATASET").unwrap_or_else(|| "production".into()),
            token,
            api_version: env_opt("NEXT_PUBLIC_SANITY_API_VERSION")
                .unwrap_or_else(|| "2025-09-25".into()),
            timeout_secs: env_parse("MIGRATE_HTTP_TIMEOUT_SECS", 30u64),
        })
    }
}

/// HTTP client for one Sanity project/dataset.
#[derive(Debug, Clone)]
pub struct SanityClient {
    cfg: SanityConfig,
    http: Client,
}

impl SanityClient {
    pub fn new(cfg: SanityConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent("motor-migrate/0.1")
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self { cfg, http })
    }

    /// Shared HTTP client, reused by the asset ingester for image fetches so
    /// the whole pipeline carries one timeout policy.
    pub fn http(&self) -> &Client {
        &self.http
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let base = format!(
            "https://{}.api.sanity.io/v{}/{}",
            self.cfg.project_id, self.cfg.api_version, path
        );
        Url::parse(&base).with_context(|| format!("invalid store endpoint {base}"))
    }
}

#[async_trait]
impl ContentStore for SanityClient {
    async fn query_first(&self, query: &str, params: &[(&str, &str)]) -> Result<Option<Value>> {
        let mut url = self.endpoint(&format!("data/query/{}", self.cfg.dataset))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("query", query);
            for (key, value) in params {
                // GROQ params are JSON literals; strings must arrive quoted.
                pairs.append_pair(&format!("${key}"), &Value::from(*value).to_string());
            }
        }
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.cfg.token)
            .send()
            .await
            .context("store query request failed")?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("store query returned {status}"));
        }
        let payload: Value = resp.json().await.context("store query payload")?;
        match payload.get("result") {
            None | Some(Value::Null) => Ok(None),
            Some(result) => Ok(Some(result.clone())),
        }
    }

    async fn create(&self, doc: Value) -> Result<String> {
        let mut url = self.endpoint(&format!("data/mutate/{}", self.cfg.dataset))?;
        url.query_pairs_mut().append_pair("returnIds", "true");
        let body = json!({ "mutations": [ { "create": doc } ] });
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.cfg.token)
            .json(&body)
            .send()
            .await
            .context("store create request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(anyhow!("store create returned {status}: {detail}"));
        }
        let payload: Value = resp.json().await.context("store create payload")?;
        payload
            .pointer("/results/0/id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("store create response missing document id"))
    }
}

#[async_trait]
impl AssetStore for SanityClient {
    async fn upload_image(&self, bytes: Bytes, filename: &str) -> Result<String> {
        let mut url = self.endpoint(&format!("assets/images/{}", self.cfg.dataset))?;
        url.query_pairs_mut().append_pair("filename", filename);
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.cfg.token)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .context("asset upload request failed")?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("asset upload returned {status}"));
        }
        let payload: Value = resp.json().await.context("asset upload payload")?;
        payload
            .pointer("/document/_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("asset upload response missing asset id"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> SanityConfig {
        SanityConfig {
            project_id: "abc123".into(),
            dataset: "production".into(),
            token: "secret".into(),
            api_version: "2025-09-25".into(),
            timeout_secs: 30,
        }
    }

    #[test]
    fn endpoint_includes_project_and_version() {
        let client = SanityClient::new(test_config()).unwrap();
        let url = client.endpoint("data/query/production").unwrap();
        assert_eq!(
            url.as_str(),
            "https://abc123.api.sanity.io/v2025-09-25/data/query/production"
        );
    }
}
