//! Persisted instance store: the operative/deleted/preparing containers
//! plus atomic load/save of `multipassd-vm-instances.json` (§4.1).

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::record::InstanceRecord;

/// What `InstanceStore::load` had to repair or skip, surfaced to the caller
/// for logging/telemetry rather than swallowed silently (§4.1 load-tolerance
/// rules).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub skipped_ghosts: Vec<String>,
    pub rejected_missing_mac: Vec<String>,
    pub repaired_state_contradictions: Vec<String>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.skipped_ghosts.is_empty()
            && self.rejected_missing_mac.is_empty()
            && self.repaired_state_contradictions.is_empty()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedFile {
    #[serde(flatten)]
    operative: HashMap<String, InstanceRecord>,
}

/// Owns the three disjoint name-keyed containers and (optionally) the path
/// they persist to. `preparing` never reaches disk: it only reserves names
/// for in-flight `launch`/`create` calls.
pub struct InstanceStore {
    pub(crate) operative: HashMap<String, InstanceRecord>,
    pub(crate) deleted: HashMap<String, InstanceRecord>,
    preparing: HashMap<String, ()>,
    path: Option<PathBuf>,
}

impl InstanceStore {
    /// A store with no backing file, for tests and the `preparing`-only
    /// reservation phase of `create`.
    pub fn new_in_memory() -> Self {
        InstanceStore {
            operative: HashMap::new(),
            deleted: HashMap::new(),
            preparing: HashMap::new(),
            path: None,
        }
    }

    /// Load from `path`, tolerating and repairing the conditions §4.1
    /// names. A missing file is treated as an empty store (first daemon
    /// start).
    pub fn load(path: impl Into<PathBuf>) -> Result<(Self, LoadReport)> {
        let path = path.into();
        let mut report = LoadReport::default();

        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok((
                    InstanceStore {
                        operative: HashMap::new(),
                        deleted: HashMap::new(),
                        preparing: HashMap::new(),
                        path: Some(path),
                    },
                    report,
                ));
            }
            Err(e) => return Err(e).context("reading instance store file"),
        };

        let persisted: PersistedFile =
            serde_json::from_str(&raw).context("parsing instance store file")?;

        let mut operative = HashMap::new();
        let mut deleted = HashMap::new();

        for (name, mut record) in persisted.operative {
            if record.is_ghost() {
                warn!(instance = %name, "skipping ghost instance record on load");
                report.skipped_ghosts.push(name);
                continue;
            }
            if record.default_mac_address.as_str().is_empty() {
                warn!(instance = %name, "rejecting instance record with missing MAC address");
                report.rejected_missing_mac.push(name);
                continue;
            }
            if record.repair_deleted_state_contradiction() {
                warn!(instance = %name, "repaired deleted/state contradiction on load");
                report.repaired_state_contradictions.push(name.clone());
            }
            if record.deleted {
                deleted.insert(name, record);
            } else {
                operative.insert(name, record);
            }
        }

        Ok((
            InstanceStore {
                operative,
                deleted,
                preparing: HashMap::new(),
                path: Some(path),
            },
            report,
        ))
    }

    /// Atomic full-map rewrite: write to a sibling temp file, `fsync`,
    /// `rename` over the target (§4.1).
    pub fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        persist_to(path, &self.operative, &self.deleted)
    }

    pub fn reserve_preparing(&mut self, name: impl Into<String>) -> bool {
        self.preparing.insert(name.into(), ()).is_none()
    }

    pub fn release_preparing(&mut self, name: &str) {
        self.preparing.remove(name);
    }

    pub fn is_name_taken(&self, name: &str) -> bool {
        self.operative.contains_key(name) || self.deleted.contains_key(name) || self.preparing.contains_key(name)
    }

    pub fn insert_operative(&mut self, record: InstanceRecord) {
        self.operative.insert(record.name.clone(), record);
    }

    pub fn insert_deleted(&mut self, record: InstanceRecord) {
        self.deleted.insert(record.name.clone(), record);
    }

    /// Soft-delete: move `name` from operative to deleted, forcing its
    /// state to stopped (§3 invariant).
    pub fn soft_delete(&mut self, name: &str) -> Option<&InstanceRecord> {
        if let Some(mut record) = self.operative.remove(name) {
            record.deleted = true;
            record.repair_deleted_state_contradiction();
            self.deleted.insert(name.to_string(), record);
            self.deleted.get(name)
        } else {
            None
        }
    }

    /// Recover: move `name` back from deleted to operative.
    pub fn recover(&mut self, name: &str) -> Option<&InstanceRecord> {
        if let Some(mut record) = self.deleted.remove(name) {
            record.deleted = false;
            self.operative.insert(name.to_string(), record);
            self.operative.get(name)
        } else {
            None
        }
    }

    /// Purge: permanently remove from the deleted bucket. Returns the
    /// removed record so the caller can release its MACs and vault image.
    pub fn purge(&mut self, name: &str) -> Option<InstanceRecord> {
        self.deleted.remove(name)
    }

    pub fn get_operative(&self, name: &str) -> Option<&InstanceRecord> {
        self.operative.get(name)
    }

    pub fn get_operative_mut(&mut self, name: &str) -> Option<&mut InstanceRecord> {
        self.operative.get_mut(name)
    }

    pub fn get_deleted(&self, name: &str) -> Option<&InstanceRecord> {
        self.deleted.get(name)
    }

    pub fn operative_names(&self) -> Vec<String> {
        self.operative.keys().cloned().collect()
    }

    pub fn deleted_names(&self) -> Vec<String> {
        self.deleted.keys().cloned().collect()
    }
}

fn persist_to(
    path: &Path,
    operative: &HashMap<String, InstanceRecord>,
    deleted: &HashMap<String, InstanceRecord>,
) -> Result<()> {
    let mut combined = HashMap::with_capacity(operative.len() + deleted.len());
    combined.extend(operative.iter().map(|(k, v)| (k.clone(), v.clone())));
    combined.extend(deleted.iter().map(|(k, v)| (k.clone(), v.clone())));

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).context("creating instance store directory")?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).context("creating temp instance store file")?;
    let json = serde_json::to_string_pretty(&PersistedFile { operative: combined })
        .context("serializing instance store")?;
    tmp.write_all(json.as_bytes()).context("writing temp instance store file")?;
    tmp.as_file().sync_all().context("fsyncing temp instance store file")?;
    tmp.persist(path).context("renaming temp instance store file into place")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{ByteSize, MacAddress};
    use fleet_vm::VmState;
    use std::collections::BTreeMap;

    fn record(name: &str) -> InstanceRecord {
        InstanceRecord {
            name: name.to_string(),
            num_cores: 1,
            mem_size: ByteSize::from_gib(1),
            disk_space: ByteSize::from_gib(5),
            default_mac_address: MacAddress::parse("52:54:00:00:00:01").unwrap(),
            extra_interfaces: vec![],
            ssh_username: "ubuntu".to_string(),
            state: VmState::Stopped,
            mounts: BTreeMap::new(),
            deleted: false,
            metadata: serde_json::Value::Null,
            clone_count: 0,
        }
    }

    #[test]
    fn load_missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let (store, report) = InstanceStore::load(dir.path().join("does-not-exist.json")).unwrap();
        assert!(store.operative.is_empty());
        assert!(report.is_clean());
    }

    #[test]
    fn persist_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multipassd-vm-instances.json");
        let mut store = InstanceStore::load(&path).unwrap().0;
        store.insert_operative(record("web-1"));
        store.persist().unwrap();

        let (reloaded, report) = InstanceStore::load(&path).unwrap();
        assert!(report.is_clean());
        assert_eq!(reloaded.operative.len(), 1);
        assert!(reloaded.operative.contains_key("web-1"));
    }

    #[test]
    fn load_skips_ghost_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(
            &path,
            r#"{"ghost": {"name":"ghost","num_cores":0,"mem_size":0,"disk_space":0,
               "default_mac_address":"52:54:00:00:00:02","ssh_username":"","state":"stopped"}}"#,
        )
        .unwrap();
        let (store, report) = InstanceStore::load(&path).unwrap();
        assert!(store.operative.is_empty());
        assert_eq!(report.skipped_ghosts, vec!["ghost".to_string()]);
    }

    #[test]
    fn load_rejects_missing_mac() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(
            &path,
            r#"{"no-mac": {"name":"no-mac","num_cores":1,"mem_size":1073741824,
               "disk_space":5368709120,"default_mac_address":"","ssh_username":"ubuntu","state":"stopped"}}"#,
        )
        .unwrap();
        let (store, report) = InstanceStore::load(&path).unwrap();
        assert!(store.operative.is_empty());
        assert_eq!(report.rejected_missing_mac, vec!["no-mac".to_string()]);
    }

    #[test]
    fn load_repairs_deleted_state_contradiction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(
            &path,
            r#"{"zombie": {"name":"zombie","num_cores":1,"mem_size":1073741824,
               "disk_space":5368709120,"default_mac_address":"52:54:00:00:00:03",
               "ssh_username":"ubuntu","state":"running","deleted":true}}"#,
        )
        .unwrap();
        let (store, report) = InstanceStore::load(&path).unwrap();
        assert_eq!(report.repaired_state_contradictions, vec!["zombie".to_string()]);
        let zombie = store.deleted.get("zombie").unwrap();
        assert_eq!(zombie.state, VmState::Stopped);
    }

    #[test]
    fn soft_delete_moves_between_buckets_and_forces_stopped() {
        let mut store = InstanceStore::new_in_memory();
        let mut r = record("web-1");
        r.state = VmState::Running;
        store.insert_operative(r);
        store.soft_delete("web-1");
        assert!(!store.operative.contains_key("web-1"));
        let deleted = store.deleted.get("web-1").unwrap();
        assert!(deleted.deleted);
        assert_eq!(deleted.state, VmState::Stopped);
    }

    #[test]
    fn recover_moves_back_to_operative() {
        let mut store = InstanceStore::new_in_memory();
        store.insert_operative(record("web-1"));
        store.soft_delete("web-1");
        store.recover("web-1");
        assert!(store.operative.contains_key("web-1"));
        assert!(!store.deleted.contains_key("web-1"));
    }

    #[test]
    fn purge_removes_permanently() {
        let mut store = InstanceStore::new_in_memory();
        store.insert_deleted(record("gone"));
        let purged = store.purge("gone");
        assert!(purged.is_some());
        assert!(store.purge("gone").is_none());
    }

    #[test]
    fn get_operative_mut_allows_in_place_edits() {
        let mut store = InstanceStore::new_in_memory();
        store.insert_operative(record("web-1"));
        store.get_operative_mut("web-1").unwrap().num_cores = 4;
        assert_eq!(store.get_operative("web-1").unwrap().num_cores, 4);
        assert!(store.get_operative_mut("nope").is_none());
    }

    #[test]
    fn get_deleted_finds_soft_deleted_records_only() {
        let mut store = InstanceStore::new_in_memory();
        store.insert_operative(record("web-1"));
        assert!(store.get_deleted("web-1").is_none());
        store.soft_delete("web-1");
        assert!(store.get_deleted("web-1").is_some());
        assert!(store.get_operative("web-1").is_none());
    }

    #[test]
    fn preparing_reservation_blocks_duplicate_names() {
        let mut store = InstanceStore::new_in_memory();
        assert!(store.reserve_preparing("web-1"));
        assert!(!store.reserve_preparing("web-1"));
        assert!(store.is_name_taken("web-1"));
        store.release_preparing("web-1");
        assert!(!store.is_name_taken("web-1"));
    }
}
