//! The image vault itself (C5, §4.2): fetches, prepares, clones, and
//! expires content-addressed disk images.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use fleet_core::hash::{ContentHash, HashAlgorithm};
use fleet_core::progress::ProgressSink;
use fleet_core::size::ByteSize;
use fleet_manifest::ImageRecord;
use tokio::sync::{Mutex, Notify};
use tracing::{info, warn};

use crate::decoder::ImageDecoder;
use crate::image::VMImage;
use crate::prepare::PrepareAction;

/// Fetches the raw bytes of an image archive from a URL. Split out from
/// `ImageDecoder`/`PrepareAction` so tests can substitute deterministic
/// bytes without touching the network, matching the `UrlDownloader` seam
/// in `fleet-manifest`.
#[async_trait]
pub trait BytesDownloader: Send + Sync {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>>;
}

pub struct ReqwestBytesDownloader {
    client: reqwest_client::Client,
}

/// Narrow re-export so this module doesn't need a direct `reqwest`
/// dependency declaration beyond what `fleet-manifest` already pulls in
/// transitively; kept as its own module to mirror `fleet_manifest::downloader`.
mod reqwest_client {
    pub use reqwest::Client;
}

impl ReqwestBytesDownloader {
    pub fn new() -> Self {
        ReqwestBytesDownloader {
            client: reqwest_client::Client::builder()
                .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
                .timeout(Duration::from_secs(600))
                .build()
                .expect("failed to build HTTP client"),
        }
    }
}

impl Default for ReqwestBytesDownloader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BytesDownloader for ReqwestBytesDownloader {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("requesting {url}"))?
            .error_for_status()
            .with_context(|| format!("non-success status fetching {url}"))?;
        Ok(response.bytes().await?.to_vec())
    }
}


/// A single in-flight-or-complete preparation slot, keyed by vault key
/// (the bare hex digest, regardless of which algorithm the manifest
/// checksum used). The first caller for a given hash installs the
/// `Notify` and performs the work; later callers await it and then read
/// the cached result — at most one preparation runs per content address.
struct InFlight {
    notify: Arc<Notify>,
}

pub struct Vault {
    images_dir: PathBuf,
    downloader: Arc<dyn BytesDownloader>,
    decoder: Arc<dyn ImageDecoder>,
    images: Mutex<HashMap<String, VMImage>>,
    /// Tracks the vault key last fetched for each known alias, so
    /// `update_images` can tell a manifest hash bump apart from an
    /// alias it has simply never seen before (§4.2).
    installed_aliases: Mutex<HashMap<String, String>>,
    in_flight: Mutex<HashMap<String, InFlight>>,
    expiry: Duration,
}

impl Vault {
    pub fn new(
        images_dir: impl Into<PathBuf>,
        downloader: Arc<dyn BytesDownloader>,
        decoder: Arc<dyn ImageDecoder>,
        expiry: Duration,
    ) -> Self {
        Vault {
            images_dir: images_dir.into(),
            downloader,
            decoder,
            images: Mutex::new(HashMap::new()),
            installed_aliases: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            expiry,
        }
    }

    /// Returns the already-prepared image for `record.hash` if one is
    /// cached, downloading and preparing it otherwise. Concurrent calls
    /// for the same content hash coalesce onto a single download: the
    /// first caller does the work, later callers await its completion and
    /// share the result (§4.2 "at-most-one concurrent preparation").
    pub async fn fetch_image(
        &self,
        record: &ImageRecord,
        prepare: &dyn PrepareAction,
        progress: &dyn ProgressSink,
    ) -> Result<VMImage> {
        let key = record.hash.vault_key().to_string();

        if let Some(image) = self.images.lock().await.get(&key).cloned() {
            return Ok(self.touch(image).await);
        }

        let notify = {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(slot) = in_flight.get(&key) {
                Some(slot.notify.clone())
            } else {
                in_flight.insert(
                    key.clone(),
                    InFlight {
                        notify: Arc::new(Notify::new()),
                    },
                );
                None
            }
        };

        if let Some(notify) = notify {
            notify.notified().await;
            let image = self
                .images
                .lock()
                .await
                .get(&key)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("image preparation for {key} did not produce a result"))?;
            return Ok(self.touch(image).await);
        }

        let result = self.prepare_image(record, prepare, progress, &key).await;

        let slot = self.in_flight.lock().await.remove(&key);
        if let Some(slot) = slot {
            slot.notify.notify_waiters();
        }

        result
    }

    async fn prepare_image(
        &self,
        record: &ImageRecord,
        prepare: &dyn PrepareAction,
        progress: &dyn ProgressSink,
        key: &str,
    ) -> Result<VMImage> {
        progress.on_progress(&format!("Retrieving image: {}", record.release_title));
        let bytes = self
            .downloader
            .fetch_bytes(&record.image_url)
            .await
            .context("downloading image archive")?;

        let computed = ContentHash::of_bytes(HashAlgorithm::Sha256, &bytes);
        if computed.vault_key() != key {
            anyhow::bail!(
                "downloaded image hash mismatch: expected {key}, got {}",
                computed.vault_key()
            );
        }

        let slot_dir = self.images_dir.join(key);
        std::fs::create_dir_all(&slot_dir).context("creating vault image directory")?;
        let archive_path = slot_dir.join("archive.img");
        std::fs::write(&archive_path, &bytes).context("writing downloaded archive")?;

        progress.on_progress("Extracting image");
        let decoded_path = self.decoder.decode(&archive_path, &slot_dir)?;
        if decoded_path != archive_path {
            let _ = std::fs::remove_file(&archive_path);
        }

        progress.on_progress("Preparing image");
        let final_path = prepare.prepare(&decoded_path, &slot_dir)?;
        let size = std::fs::metadata(&final_path)
            .map(|m| ByteSize::from_bytes(m.len()))
            .unwrap_or_else(|_| ByteSize::from_bytes(0));

        let image = VMImage {
            hash: record.hash.clone(),
            path: final_path,
            size,
            last_used: Utc::now(),
        };
        self.images.lock().await.insert(key.to_string(), image.clone());
        let mut aliases = self.installed_aliases.lock().await;
        for alias in &record.aliases {
            aliases.insert(alias.clone(), key.to_string());
        }
        Ok(image)
    }

    async fn touch(&self, mut image: VMImage) -> VMImage {
        image.last_used = Utc::now();
        let key = image.hash.vault_key().to_string();
        self.images.lock().await.insert(key, image.clone());
        image
    }

    /// Re-fetches any alias already known to this vault whose manifest
    /// hash has advanced since it was last prepared; leaves unchanged
    /// and never-before-seen aliases alone (§4.2).
    pub async fn update_images(
        &self,
        current_records: &[ImageRecord],
        prepare: &dyn PrepareAction,
        progress: &dyn ProgressSink,
    ) -> Result<()> {
        for record in current_records {
            let new_key = record.hash.vault_key();
            let previously_installed_under_different_key = {
                let aliases = self.installed_aliases.lock().await;
                record
                    .aliases
                    .iter()
                    .filter_map(|alias| aliases.get(alias))
                    .any(|installed_key| installed_key != new_key)
            };
            if previously_installed_under_different_key {
                info!(aliases = ?record.aliases, "image manifest hash advanced, refetching");
                if let Err(e) = self.fetch_image(record, prepare, progress).await {
                    warn!(error = %e, "failed to refresh image, keeping stale copy");
                }
            }
        }
        Ok(())
    }

    /// Removes cached images whose `last_used` is older than the
    /// configured expiry and that `is_referenced` reports as unused by
    /// any registered instance (§4.2).
    pub async fn prune_expired_images(
        &self,
        is_referenced: impl Fn(&str) -> bool,
    ) -> Result<Vec<String>> {
        let now = Utc::now();
        let mut removed = Vec::new();
        let mut images = self.images.lock().await;
        let expired: Vec<String> = images
            .iter()
            .filter(|(key, image)| {
                let age = now.signed_duration_since(image.last_used);
                age.to_std().unwrap_or(Duration::ZERO) > self.expiry && !is_referenced(key)
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in expired {
            if let Some(image) = images.remove(&key) {
                if let Some(parent) = image.path.parent() {
                    let _ = std::fs::remove_dir_all(parent);
                }
                removed.push(key);
            }
        }
        Ok(removed)
    }

    /// Duplicates the prepared image for `src_hash` under a new identity
    /// for a cloned instance, hard-linking into the destination directory
    /// when possible and falling back to a copy across filesystems.
    pub async fn clone_image(&self, src_hash: &str, dest_dir: &Path) -> Result<PathBuf> {
        let image = self
            .images
            .lock()
            .await
            .get(src_hash)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no prepared image cached for {src_hash}"))?;

        std::fs::create_dir_all(dest_dir).context("creating clone destination directory")?;
        let file_name = image
            .path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("cached image path has no file name"))?;
        let dest = dest_dir.join(file_name);

        match std::fs::hard_link(&image.path, &dest) {
            Ok(()) => {}
            Err(_) => {
                std::fs::copy(&image.path, &dest).context("copying image for clone")?;
            }
        }
        Ok(dest)
    }

    /// The smallest disk size a VM backed by this image may request,
    /// i.e. the prepared image's own size — instances can't be sized
    /// smaller than the disk they boot from (§4.2).
    pub async fn minimum_image_size_for(&self, hash: &str) -> Result<ByteSize> {
        self.images
            .lock()
            .await
            .get(hash)
            .map(|image| image.size)
            .ok_or_else(|| anyhow::anyhow!("no prepared image cached for {hash}"))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::FakeBytesDownloader;
    use super::*;
    use fleet_core::progress::NullProgressSink;

    fn sample_record(url: &str, bytes: &[u8]) -> ImageRecord {
        ImageRecord {
            hash: ContentHash::of_bytes(HashAlgorithm::Sha256, bytes),
            aliases: vec!["jammy".to_string()],
            os: "Ubuntu".to_string(),
            release: "jammy".to_string(),
            release_title: "22.04 LTS".to_string(),
            version: "20240101".to_string(),
            image_url: url.to_string(),
            stream_url: String::new(),
            supported: true,
        }
    }

    fn test_vault(dir: &tempfile::TempDir, downloader: Arc<dyn BytesDownloader>) -> Vault {
        Vault::new(
            dir.path().to_path_buf(),
            downloader,
            Arc::new(crate::decoder::PassthroughDecoder),
            Duration::from_secs(3600),
        )
    }

    #[tokio::test]
    async fn fetch_image_downloads_decodes_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = b"jammy disk bytes".to_vec();
        let record = sample_record("http://images.example/jammy.img", &bytes);
        let downloader = Arc::new(FakeBytesDownloader::with("http://images.example/jammy.img", bytes.clone()));
        let vault = test_vault(&dir, downloader);

        let image = vault
            .fetch_image(&record, &crate::prepare::NullPrepareAction, &NullProgressSink)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&image.path).unwrap(), bytes);
        assert_eq!(image.hash, record.hash);
    }

    #[tokio::test]
    async fn fetch_image_rejects_hash_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut record = sample_record("http://images.example/jammy.img", b"actual bytes");
        record.hash = ContentHash::of_bytes(HashAlgorithm::Sha256, b"different bytes");
        let downloader = Arc::new(FakeBytesDownloader::with(
            "http://images.example/jammy.img",
            b"actual bytes".to_vec(),
        ));
        let vault = test_vault(&dir, downloader);

        let result = vault
            .fetch_image(&record, &crate::prepare::NullPrepareAction, &NullProgressSink)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn fetch_image_is_idempotent_for_cached_hash() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = b"jammy disk bytes".to_vec();
        let record = sample_record("http://images.example/jammy.img", &bytes);
        let downloader = Arc::new(FakeBytesDownloader::with("http://images.example/jammy.img", bytes.clone()));
        let vault = test_vault(&dir, downloader);

        let first = vault
            .fetch_image(&record, &crate::prepare::NullPrepareAction, &NullProgressSink)
            .await
            .unwrap();
        let second = vault
            .fetch_image(&record, &crate::prepare::NullPrepareAction, &NullProgressSink)
            .await
            .unwrap();
        assert_eq!(first.path, second.path);
    }

    #[tokio::test]
    async fn concurrent_fetches_for_same_hash_coalesce() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = b"jammy disk bytes".to_vec();
        let record = sample_record("http://images.example/jammy.img", &bytes);
        let downloader = Arc::new(FakeBytesDownloader::with("http://images.example/jammy.img", bytes.clone()));
        let vault = Arc::new(test_vault(&dir, downloader));

        let v1 = vault.clone();
        let r1 = record.clone();
        let v2 = vault.clone();
        let r2 = record.clone();
        let (a, b) = tokio::join!(
            tokio::spawn(async move { v1.fetch_image(&r1, &crate::prepare::NullPrepareAction, &NullProgressSink).await }),
            tokio::spawn(async move { v2.fetch_image(&r2, &crate::prepare::NullPrepareAction, &NullProgressSink).await }),
        );
        assert_eq!(a.unwrap().unwrap().path, b.unwrap().unwrap().path);
    }

    #[tokio::test]
    async fn prune_expired_images_removes_only_unreferenced_stale_entries() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = b"jammy disk bytes".to_vec();
        let record = sample_record("http://images.example/jammy.img", &bytes);
        let downloader = Arc::new(FakeBytesDownloader::with("http://images.example/jammy.img", bytes.clone()));
        let vault = Vault::new(
            dir.path().to_path_buf(),
            downloader,
            Arc::new(crate::decoder::PassthroughDecoder),
            Duration::from_secs(0),
        );

        let image = vault
            .fetch_image(&record, &crate::prepare::NullPrepareAction, &NullProgressSink)
            .await
            .unwrap();
        let key = image.hash.vault_key().to_string();

        let removed = vault.prune_expired_images(|k| k != key).await.unwrap();
        assert!(removed.is_empty(), "referenced image must not be pruned");

        let removed = vault.prune_expired_images(|_| false).await.unwrap();
        assert_eq!(removed, vec![key]);
    }

    #[tokio::test]
    async fn clone_image_duplicates_into_destination_directory() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = b"jammy disk bytes".to_vec();
        let record = sample_record("http://images.example/jammy.img", &bytes);
        let downloader = Arc::new(FakeBytesDownloader::with("http://images.example/jammy.img", bytes.clone()));
        let vault = test_vault(&dir, downloader);

        let image = vault
            .fetch_image(&record, &crate::prepare::NullPrepareAction, &NullProgressSink)
            .await
            .unwrap();
        let key = image.hash.vault_key().to_string();

        let clone_dest_dir = tempfile::tempdir().unwrap();
        let cloned_path = vault.clone_image(&key, clone_dest_dir.path()).await.unwrap();
        assert_eq!(std::fs::read(&cloned_path).unwrap(), bytes);
    }

    #[tokio::test]
    async fn update_images_refetches_only_aliases_whose_hash_advanced() {
        let dir = tempfile::tempdir().unwrap();
        let old_bytes = b"jammy v1".to_vec();
        let old_record = sample_record("http://images.example/jammy-v1.img", &old_bytes);
        let downloader = Arc::new(FakeBytesDownloader::with("http://images.example/jammy-v1.img", old_bytes.clone()));
        let vault = test_vault(&dir, downloader);
        vault
            .fetch_image(&old_record, &crate::prepare::NullPrepareAction, &NullProgressSink)
            .await
            .unwrap();

        let new_bytes = b"jammy v2".to_vec();
        let mut new_record = sample_record("http://images.example/jammy-v2.img", &new_bytes);
        new_record.hash = ContentHash::of_bytes(HashAlgorithm::Sha256, &new_bytes);
        // Swap in a downloader that also knows the v2 URL.
        let downloader = Arc::new(FakeBytesDownloader::with("http://images.example/jammy-v2.img", new_bytes.clone()));
        let vault = Vault::new(vault.images_dir.clone(), downloader, Arc::new(crate::decoder::PassthroughDecoder), Duration::from_secs(3600));
        vault.installed_aliases.lock().await.insert("jammy".to_string(), old_record.hash.vault_key().to_string());

        vault
            .update_images(std::slice::from_ref(&new_record), &crate::prepare::NullPrepareAction, &NullProgressSink)
            .await
            .unwrap();

        let image = vault
            .images
            .lock()
            .await
            .get(new_record.hash.vault_key())
            .cloned()
            .expect("advanced hash should have been fetched");
        assert_eq!(std::fs::read(&image.path).unwrap(), new_bytes);
    }

    #[tokio::test]
    async fn update_images_skips_alias_with_unchanged_hash() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = b"jammy v1".to_vec();
        let record = sample_record("http://images.example/jammy.img", &bytes);
        let downloader = Arc::new(FakeBytesDownloader::fail("http://images.example/jammy.img", "should not be called again"));
        let vault = test_vault(&dir, downloader);
        vault.installed_aliases.lock().await.insert("jammy".to_string(), record.hash.vault_key().to_string());

        vault
            .update_images(std::slice::from_ref(&record), &crate::prepare::NullPrepareAction, &NullProgressSink)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn minimum_image_size_for_reports_prepared_size() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = b"jammy disk bytes".to_vec();
        let record = sample_record("http://images.example/jammy.img", &bytes);
        let downloader = Arc::new(FakeBytesDownloader::with("http://images.example/jammy.img", bytes.clone()));
        let vault = test_vault(&dir, downloader);

        let image = vault
            .fetch_image(&record, &crate::prepare::NullPrepareAction, &NullProgressSink)
            .await
            .unwrap();
        let key = image.hash.vault_key().to_string();

        let size = vault.minimum_image_size_for(&key).await.unwrap();
        assert_eq!(size.bytes(), bytes.len() as u64);
    }
}
