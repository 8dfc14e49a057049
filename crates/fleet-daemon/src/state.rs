//! The daemon's shared state (§5): a single shared `Arc<AppState>`, cloned
//! into every connection handler.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fleet_core::mac::MacAllocator;
use fleet_manifest::ManifestSource;
use fleet_mount::MountRegistry;
use fleet_registry::InstanceStore;
use fleet_rpc::trust::{default_certificates_dir, TrustStore};
use fleet_rpc::AuthGate;
use fleet_settings::{PassphraseHandler, PassphraseStore, SettingsRegistry};
use fleet_snapshot::SnapshotTree;
use fleet_vault::{PassthroughDecoder, ReqwestBytesDownloader, Vault};
use fleet_vm::backend::{VMFactory, VirtualMachine};
use fleet_vm::delayed_shutdown::DelayedShutdownRegistry;
use fleet_vm::NullBackend;
use tokio::sync::Mutex as AsyncMutex;

use fleet_dispatch::StartCoalescer;

use crate::config::StaticConfig;
use crate::settings_handlers::{InstanceSettingsHandler, SnapshotSettingsHandler};

/// Images older than this are eligible for `prune_expired_images` (§4.2).
/// No SPEC_FULL section ties this to a settings key, so it's a fixed
/// constant rather than user-configurable.
const IMAGE_EXPIRY: Duration = Duration::from_secs(60 * 60 * 24 * 30);

/// Everything the RPC dispatch table needs, composed once at startup and
/// shared behind an `Arc` with every connection task.
pub struct AppState {
    pub data_dir: PathBuf,
    pub instances: Arc<std::sync::Mutex<InstanceStore>>,
    pub mac_allocator: Arc<std::sync::Mutex<MacAllocator>>,
    pub manifest: AsyncMutex<ManifestSource>,
    pub vault: Arc<Vault>,
    pub snapshots: Arc<std::sync::Mutex<HashMap<String, SnapshotTree>>>,
    pub mounts: std::sync::Mutex<HashMap<String, MountRegistry>>,
    pub settings: SettingsRegistry,
    pub passphrase: Arc<PassphraseStore>,
    pub auth_gate: Arc<AuthGate>,
    pub backend: Arc<dyn VMFactory>,
    pub vms: AsyncMutex<HashMap<String, Box<dyn VirtualMachine>>>,
    pub delayed_shutdown: DelayedShutdownRegistry,
    pub start_coalescer: StartCoalescer,
}

impl AppState {
    pub fn persist_instances(&self) -> anyhow::Result<()> {
        self.instances.lock().unwrap().persist()
    }

    /// Wires every domain crate together the way `fleetd`'s `Serve`
    /// subcommand needs them: loads persisted state, seeds the MAC
    /// allocator from it, and registers the settings handlers this crate
    /// owns (§4.7's instance- and snapshot-scoped keys) alongside the
    /// passphrase handler `fleet-settings` ships on its own.
    pub fn new(config: &StaticConfig) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        std::fs::create_dir_all(&config.cache_dir)?;
        std::fs::create_dir_all(config.images_dir())?;
        std::fs::create_dir_all(config.manifests_dir())?;

        let (store, load_report) = InstanceStore::load(config.instances_path())?;
        if !load_report.is_clean() {
            tracing::warn!(
                skipped_ghosts = load_report.skipped_ghosts,
                rejected_missing_mac = load_report.rejected_missing_mac,
                repaired_state_contradictions = load_report.repaired_state_contradictions,
                "instance store load required repairs"
            );
        }

        let mut existing_macs = Vec::new();
        for name in store.operative_names() {
            if let Some(record) = store.get_operative(&name) {
                existing_macs.extend(record.all_macs().into_iter().cloned());
            }
        }
        for name in store.deleted_names() {
            if let Some(record) = store.get_deleted(&name) {
                existing_macs.extend(record.all_macs().into_iter().cloned());
            }
        }
        let mac_allocator = Arc::new(std::sync::Mutex::new(MacAllocator::from_existing(existing_macs)));
        let instances = Arc::new(std::sync::Mutex::new(store));
        let snapshots = Arc::new(std::sync::Mutex::new(HashMap::new()));

        let mut settings = SettingsRegistry::new();
        settings.register(Box::new(InstanceSettingsHandler::new(
            "local",
            Arc::clone(&instances),
            Arc::clone(&mac_allocator),
        )));
        settings.register(Box::new(SnapshotSettingsHandler::new("local", Arc::clone(&snapshots))));
        let passphrase = Arc::new(PassphraseStore::new());
        settings.register(Box::new(PassphraseHandler::new(passphrase.as_ref().clone())));

        let trust_store = Arc::new(TrustStore::load(default_certificates_dir(&config.data_dir))?);
        let auth_gate = Arc::new(AuthGate::new(trust_store));

        let manifest = ManifestSource::new(Arc::new(fleet_manifest::ReqwestDownloader::new()));

        let vault = Arc::new(Vault::new(
            config.images_dir(),
            Arc::new(ReqwestBytesDownloader::new()),
            Arc::new(PassthroughDecoder),
            IMAGE_EXPIRY,
        ));

        Ok(AppState {
            data_dir: config.data_dir.clone(),
            instances,
            mac_allocator,
            manifest: AsyncMutex::new(manifest),
            vault,
            snapshots,
            mounts: std::sync::Mutex::new(HashMap::new()),
            settings,
            passphrase,
            auth_gate,
            backend: Arc::new(NullBackend::new()),
            vms: AsyncMutex::new(HashMap::new()),
            delayed_shutdown: DelayedShutdownRegistry::new(),
            start_coalescer: StartCoalescer::new(),
        })
    }
}
