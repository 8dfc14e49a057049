//! Pluggable URL fetch boundary (§4.3): async and trait-object-based so
//! `ManifestSource` and `BlueprintSource` can run against a fake in tests.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

#[async_trait]
pub trait UrlDownloader: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

/// The real downloader, backed by `reqwest`.
pub struct ReqwestDownloader {
    client: reqwest::Client,
}

impl ReqwestDownloader {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("fleetd/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("building the manifest HTTP client");
        ReqwestDownloader { client }
    }
}

impl Default for ReqwestDownloader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UrlDownloader for ReqwestDownloader {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("request failed: {}", url))?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("HTTP {} for {}", status, url);
        }

        resp.text()
            .await
            .with_context(|| format!("failed to read response body from {}", url))
    }
}
