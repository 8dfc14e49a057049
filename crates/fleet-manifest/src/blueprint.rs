//! Blueprint catalog (§2.2 supplemented feature): named, pre-configured
//! launch templates, resolved before falling through to ordinary alias
//! resolution.

use std::sync::Arc;

use fleet_core::ByteSize;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::downloader::UrlDownloader;

/// Environment variable that, when set, overrides the bundled default
/// blueprint catalog URL.
pub const MULTIPASS_BLUEPRINTS_URL_ENV: &str = "MULTIPASS_BLUEPRINTS_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    pub name: String,
    pub image_alias: String,
    pub default_cpus: u32,
    pub default_mem: ByteSize,
    pub default_disk: ByteSize,
    #[serde(default)]
    pub cloud_init_fragment: Option<String>,
    #[serde(default)]
    pub workspaces: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct BlueprintDocument {
    blueprints: Vec<Blueprint>,
}

pub struct BlueprintSource {
    catalog: Vec<Blueprint>,
    downloader: Arc<dyn UrlDownloader>,
}

impl BlueprintSource {
    /// Starts with the bundled default catalog; call `refresh()` to pull
    /// from `MULTIPASS_BLUEPRINTS_URL` if set.
    pub fn new(downloader: Arc<dyn UrlDownloader>) -> Self {
        BlueprintSource {
            catalog: bundled_default_catalog(),
            downloader,
        }
    }

    pub fn resolve(&self, name: &str) -> Option<&Blueprint> {
        self.catalog.iter().find(|b| b.name == name)
    }

    pub fn catalog(&self) -> &[Blueprint] {
        &self.catalog
    }

    /// Re-fetch the catalog from `MULTIPASS_BLUEPRINTS_URL` if set; falls
    /// back to (and on failure, keeps) the bundled default catalog.
    pub async fn refresh(&mut self) -> anyhow::Result<()> {
        let Ok(url) = std::env::var(MULTIPASS_BLUEPRINTS_URL_ENV) else {
            return Ok(());
        };

        match self.downloader.fetch_text(&url).await {
            Ok(raw) => match serde_json::from_str::<BlueprintDocument>(&raw) {
                Ok(document) => {
                    self.catalog = document.blueprints;
                }
                Err(e) => warn!(error = %e, "failed to parse blueprint catalog, keeping prior copy"),
            },
            Err(e) => warn!(error = %e, url = %url, "failed to fetch blueprint catalog, keeping prior copy"),
        }
        Ok(())
    }
}

fn bundled_default_catalog() -> Vec<Blueprint> {
    vec![Blueprint {
        name: "docker".to_string(),
        image_alias: "jammy".to_string(),
        default_cpus: 2,
        default_mem: ByteSize::from_gib(2),
        default_disk: ByteSize::from_gib(10),
        cloud_init_fragment: Some("packages:\n  - docker.io\n".to_string()),
        workspaces: vec![],
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::test_support::FakeDownloader;

    #[test]
    fn bundled_catalog_resolves_known_name() {
        let source = BlueprintSource::new(Arc::new(FakeDownloader::default()));
        assert!(source.resolve("docker").is_some());
        assert!(source.resolve("does-not-exist").is_none());
    }

    #[tokio::test]
    async fn refresh_without_env_var_keeps_bundled_catalog() {
        // SAFETY: test runs single-threaded w.r.t. this env var; no other
        // test in this crate reads or writes it.
        unsafe {
            std::env::remove_var(MULTIPASS_BLUEPRINTS_URL_ENV);
        }
        let mut source = BlueprintSource::new(Arc::new(FakeDownloader::default()));
        source.refresh().await.unwrap();
        assert!(source.resolve("docker").is_some());
    }

    #[tokio::test]
    async fn refresh_replaces_catalog_from_configured_url() {
        let downloader = Arc::new(FakeDownloader::with(
            "http://blueprints.example/catalog.json",
            r#"{"blueprints":[{"name":"custom","image_alias":"jammy","default_cpus":1,
                "default_mem":1073741824,"default_disk":5368709120}]}"#,
        ));
        let mut source = BlueprintSource::new(downloader);
        unsafe {
            std::env::set_var(MULTIPASS_BLUEPRINTS_URL_ENV, "http://blueprints.example/catalog.json");
        }
        source.refresh().await.unwrap();
        unsafe {
            std::env::remove_var(MULTIPASS_BLUEPRINTS_URL_ENV);
        }
        assert!(source.resolve("custom").is_some());
        assert!(source.resolve("docker").is_none());
    }
}
