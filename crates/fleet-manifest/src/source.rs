//! `ManifestSource` (§4.3): owns `{remote_name -> Manifest}` and drives
//! fetch/parse/query against a pluggable `UrlDownloader`.

use std::collections::HashMap;
use std::sync::Arc;

use fleet_core::FleetError;
use tracing::warn;

use crate::downloader::UrlDownloader;
use crate::query::{ImageQuery, QueryType};
use crate::record::ImageRecord;
use crate::remote::{Manifest, Remote};

struct RemoteEntry {
    remote: Remote,
    manifest: Manifest,
}

pub struct ManifestSource {
    remotes: HashMap<String, RemoteEntry>,
    downloader: Arc<dyn UrlDownloader>,
}

impl ManifestSource {
    pub fn new(downloader: Arc<dyn UrlDownloader>) -> Self {
        ManifestSource {
            remotes: HashMap::new(),
            downloader,
        }
    }

    pub fn add_remote(&mut self, remote: Remote) {
        self.remotes.insert(
            remote.name.clone(),
            RemoteEntry {
                remote,
                manifest: Manifest::default(),
            },
        );
    }

    pub fn remote_names(&self) -> Vec<String> {
        self.remotes.keys().cloned().collect()
    }

    /// Fetch every configured remote concurrently. Per-remote failures are
    /// logged and leave the prior cached manifest in place; `force_network`
    /// is accepted for parity with the RPC-facing signature — this crate has
    /// no local cache bypass to skip, so it always re-fetches (§4.3).
    pub async fn update_manifests(&mut self, _force_network: bool) -> Result<(), FleetError> {
        let fetches: Vec<_> = self
            .remotes
            .iter()
            .map(|(name, entry)| {
                let name = name.clone();
                let url = entry.remote.effective_url().to_string();
                let downloader = Arc::clone(&self.downloader);
                async move {
                    let result = downloader.fetch_text(&url).await;
                    (name, result)
                }
            })
            .collect();

        let results = futures::future::join_all(fetches).await;

        for (name, result) in results {
            match result {
                Ok(raw) => match Manifest::parse(&raw) {
                    Ok(manifest) => {
                        if let Some(entry) = self.remotes.get_mut(&name) {
                            entry.manifest = manifest;
                        }
                    }
                    Err(e) => warn!(remote = %name, error = %e, "failed to parse manifest, keeping prior copy"),
                },
                Err(e) => warn!(remote = %name, error = %e, "failed to fetch manifest, keeping prior copy"),
            }
        }
        Ok(())
    }

    /// Resolve a query to its image record, searching remotes in the order
    /// named by `query.remote` (if set) else all remotes (§4.3).
    pub fn info_for(&self, query: &ImageQuery) -> Result<ImageRecord, FleetError> {
        if !matches!(query.query_type, QueryType::Alias) {
            return Err(FleetError::Manifest {
                message: "info_for only resolves alias queries; local file and HTTP download queries bypass the manifest".to_string(),
            });
        }

        let search_order: Vec<&RemoteEntry> = match &query.remote {
            Some(name) => self.remotes.get(name).into_iter().collect(),
            None => self.remotes.values().collect(),
        };

        for entry in &search_order {
            if let Some(record) = entry.manifest.find_alias(&query.name) {
                if record.supported || query.allow_unsupported {
                    return Ok(record.clone());
                }
            }
        }

        for entry in &search_order {
            if let Some(record) = entry
                .manifest
                .find_by_hash_prefix(&query.name, query.allow_unsupported)?
            {
                return Ok(record.clone());
            }
        }

        Err(FleetError::Manifest {
            message: format!("no image found matching '{}'", query.name),
        })
    }

    /// Enumerate entries across all remotes, skipping unsupported ones
    /// unless `allow_unsupported` (§4.3).
    pub fn for_each_entry_do(&self, allow_unsupported: bool, mut action: impl FnMut(&str, &ImageRecord)) {
        for entry in self.remotes.values() {
            for record in &entry.manifest.entries {
                if record.supported || allow_unsupported {
                    action(&entry.remote.name, record);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::test_support::FakeDownloader;

    fn image_json(alias: &str, hash_prefix: &str, supported: bool) -> String {
        format!(
            r#"{{"hash":"{hash}0000000000","aliases":["{alias}"],"os":"Ubuntu",
               "release":"{alias}","release_title":"{alias}","version":"1",
               "image_url":"http://x/{alias}.img","supported":{supported}}}"#,
            hash = hash_prefix,
            alias = alias,
            supported = supported,
        )
    }

    #[tokio::test]
    async fn update_manifests_fetches_all_remotes_concurrently() {
        let downloader = Arc::new(FakeDownloader::default());
        downloader
            .responses
            .lock()
            .unwrap()
            .insert("http://release".to_string(), Ok(format!("{{\"images\":[{}]}}", image_json("jammy", "aaaa", true))));
        downloader
            .responses
            .lock()
            .unwrap()
            .insert("http://daily".to_string(), Ok(format!("{{\"images\":[{}]}}", image_json("noble", "bbbb", true))));

        let mut source = ManifestSource::new(downloader);
        source.add_remote(Remote::new("release", "http://release"));
        source.add_remote(Remote::new("daily", "http://daily"));
        source.update_manifests(false).await.unwrap();

        let found = source.info_for(&ImageQuery::alias("jammy")).unwrap();
        assert_eq!(found.release, "jammy");
        let found = source.info_for(&ImageQuery::alias("noble")).unwrap();
        assert_eq!(found.release, "noble");
    }

    #[tokio::test]
    async fn update_manifests_tolerates_per_remote_failure() {
        let downloader = Arc::new(FakeDownloader::fail("http://release", "connection refused"));
        let mut source = ManifestSource::new(downloader);
        source.add_remote(Remote::new("release", "http://release"));
        source.update_manifests(false).await.unwrap();
        assert!(source.info_for(&ImageQuery::alias("jammy")).is_err());
    }

    #[tokio::test]
    async fn info_for_rejects_unsupported_unless_allowed() {
        let downloader = Arc::new(FakeDownloader::with(
            "http://release",
            format!("{{\"images\":[{}]}}", image_json("noble", "bbbb", false)),
        ));
        let mut source = ManifestSource::new(downloader);
        source.add_remote(Remote::new("release", "http://release"));
        source.update_manifests(false).await.unwrap();

        assert!(source.info_for(&ImageQuery::alias("noble")).is_err());
        assert!(source.info_for(&ImageQuery::alias("noble").allowing_unsupported()).is_ok());
    }

    #[tokio::test]
    async fn for_each_entry_do_skips_unsupported_by_default() {
        let downloader = Arc::new(FakeDownloader::with(
            "http://release",
            format!(
                "{{\"images\":[{},{}]}}",
                image_json("jammy", "aaaa", true),
                image_json("noble", "bbbb", false)
            ),
        ));
        let mut source = ManifestSource::new(downloader);
        source.add_remote(Remote::new("release", "http://release"));
        source.update_manifests(false).await.unwrap();

        let mut seen = Vec::new();
        source.for_each_entry_do(false, |_remote, record| seen.push(record.release.clone()));
        assert_eq!(seen, vec!["jammy".to_string()]);
    }
}
