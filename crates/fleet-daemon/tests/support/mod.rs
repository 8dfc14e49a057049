//! Shared scaffolding for the end-to-end scenario tests (§8): builds a
//! fully wired `AppState` against deterministic, offline fakes instead of
//! the network-backed downloaders `AppState::new` reaches for, mirroring
//! the fake-downloader seam each domain crate already tests against in
//! isolation (`fleet_manifest::downloader`, `fleet_vault::vault`).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use fleet_core::hash::{ContentHash, HashAlgorithm};
use fleet_core::mac::MacAllocator;
use fleet_daemon::AppState;
use fleet_manifest::{ImageRecord, ManifestSource, Remote, UrlDownloader};
use fleet_mount::MountRegistry;
use fleet_registry::InstanceStore;
use fleet_rpc::trust::{default_certificates_dir, TrustStore};
use fleet_rpc::AuthGate;
use fleet_settings::{PassphraseHandler, PassphraseStore, SettingsRegistry};
use fleet_vault::{BytesDownloader, PassthroughDecoder, Vault};
use fleet_vm::{DelayedShutdownRegistry, NullBackend};
use tokio::sync::Mutex as AsyncMutex;

pub const JAMMY_ALIAS: &str = "jammy";
pub const JAMMY_URL: &str = "http://images.example/jammy.img";
pub const JAMMY_BYTES: &[u8] = b"jammy disk bytes";

struct FixedTextDownloader(String);

#[async_trait]
impl UrlDownloader for FixedTextDownloader {
    async fn fetch_text(&self, _url: &str) -> Result<String> {
        Ok(self.0.clone())
    }
}

struct FixedBytesDownloader;

#[async_trait]
impl BytesDownloader for FixedBytesDownloader {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        if url == JAMMY_URL {
            Ok(JAMMY_BYTES.to_vec())
        } else {
            Err(anyhow::anyhow!("no fixture configured for {url}"))
        }
    }
}

fn jammy_record() -> ImageRecord {
    ImageRecord {
        hash: ContentHash::of_bytes(HashAlgorithm::Sha256, JAMMY_BYTES),
        aliases: vec![JAMMY_ALIAS.to_string()],
        os: "Ubuntu".to_string(),
        release: JAMMY_ALIAS.to_string(),
        release_title: "22.04 LTS".to_string(),
        version: "1".to_string(),
        image_url: JAMMY_URL.to_string(),
        stream_url: String::new(),
        supported: true,
    }
}

/// Builds an `AppState` wired the way `AppState::new` wires one, except
/// every network-facing seam (manifest fetch, image download) is backed by
/// a fixed, in-memory fake and storage lives under `data_dir`. One "jammy"
/// image is preloaded into the manifest so `launch`/`find` have something
/// to resolve.
pub async fn test_state(data_dir: &Path) -> Arc<AppState> {
    std::fs::create_dir_all(data_dir).unwrap();
    std::fs::create_dir_all(data_dir.join("images")).unwrap();

    let (store, _report) = InstanceStore::load(data_dir.join("multipassd-vm-instances.json")).unwrap();
    let instances = Arc::new(std::sync::Mutex::new(store));
    let mac_allocator = Arc::new(std::sync::Mutex::new(MacAllocator::new()));
    let snapshots = Arc::new(std::sync::Mutex::new(std::collections::HashMap::new()));

    let manifest_json = serde_json::json!({ "images": [jammy_record()] }).to_string();
    let mut manifest = ManifestSource::new(Arc::new(FixedTextDownloader(manifest_json)));
    manifest.add_remote(Remote::new("release", "http://release.example"));
    manifest.update_manifests(false).await.unwrap();

    let vault = Arc::new(Vault::new(
        data_dir.join("images"),
        Arc::new(FixedBytesDownloader) as Arc<dyn BytesDownloader>,
        Arc::new(PassthroughDecoder),
        Duration::from_secs(60 * 60 * 24 * 30),
    ));

    let mut settings = SettingsRegistry::new();
    let passphrase = Arc::new(PassphraseStore::new());
    settings.register(Box::new(PassphraseHandler::new(passphrase.as_ref().clone())));

    let trust_store = Arc::new(TrustStore::load(default_certificates_dir(data_dir)).unwrap());
    let auth_gate = Arc::new(AuthGate::new(trust_store));

    Arc::new(AppState {
        data_dir: data_dir.to_path_buf(),
        instances,
        mac_allocator,
        manifest: AsyncMutex::new(manifest),
        vault,
        snapshots,
        mounts: std::sync::Mutex::new(std::collections::HashMap::new()),
        settings,
        passphrase,
        auth_gate,
        backend: Arc::new(NullBackend::new()),
        vms: AsyncMutex::new(std::collections::HashMap::new()),
        delayed_shutdown: DelayedShutdownRegistry::new(),
        start_coalescer: fleet_dispatch::StartCoalescer::new(),
    })
}

#[allow(dead_code)]
pub fn unused_mount_registry() -> MountRegistry {
    MountRegistry::default()
}

/// Drives one RPC call against `state` through the real dispatch table,
/// discarding streamed replies (none of these scenarios assert on
/// progress messages, only the terminal status).
pub async fn call(state: &Arc<AppState>, method: fleet_rpc::message::RpcMethod, payload: serde_json::Value) -> fleet_rpc::message::RpcStatus {
    let (tx, mut rx) = tokio::sync::mpsc::channel(32);
    let req = fleet_rpc::message::RequestEnvelope::new("test-correlation", method, payload);
    let state = Arc::clone(state);
    let handle = tokio::spawn(async move { fleet_daemon::dispatch::dispatch(state, req, tx).await });
    while rx.recv().await.is_some() {}
    handle.await.unwrap()
}
