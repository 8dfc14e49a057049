//! The instance/snapshot settings handlers (§4.7). These live here rather
//! than in `fleet-settings` because they need access to the live instance
//! store, VM state, and snapshot forests rather than being self-contained.

use std::collections::HashSet;
use std::sync::Mutex;

use fleet_core::{ByteSize, FleetError, MacAddress};
use fleet_registry::{ExtraInterface, InstanceStore};
use fleet_settings::SettingValue;
use fleet_snapshot::SnapshotTree;
use fleet_vm::VmState;

/// Handles `<root>.<instance>.{cpus|memory|disk|bridged}`.
pub struct InstanceSettingsHandler {
    root: String,
    store: std::sync::Arc<Mutex<InstanceStore>>,
    mac_allocator: std::sync::Arc<Mutex<fleet_core::mac::MacAllocator>>,
}

enum Field {
    Cpus,
    Memory,
    Disk,
    Bridged,
}

impl InstanceSettingsHandler {
    pub fn new(
        root: impl Into<String>,
        store: std::sync::Arc<Mutex<InstanceStore>>,
        mac_allocator: std::sync::Arc<Mutex<fleet_core::mac::MacAllocator>>,
    ) -> Self {
        InstanceSettingsHandler {
            root: root.into(),
            store,
            mac_allocator,
        }
    }

    /// Splits `<root>.<instance>.<field>` into `(instance, field)`.
    fn parse_key<'a>(&self, key: &'a str) -> Option<(&'a str, Field)> {
        let rest = key.strip_prefix(&self.root)?.strip_prefix('.')?;
        let (instance, field) = rest.rsplit_once('.')?;
        let field = match field {
            "cpus" => Field::Cpus,
            "memory" => Field::Memory,
            "disk" => Field::Disk,
            "bridged" => Field::Bridged,
            _ => return None,
        };
        Some((instance, field))
    }

    fn require_stopped(state: VmState) -> Result<(), FleetError> {
        if !matches!(state, VmState::Stopped | VmState::Off) {
            return Err(FleetError::InstanceSettings {
                message: "instance must be stopped to change this setting".to_string(),
            });
        }
        Ok(())
    }
}

impl fleet_settings::SettingsHandler for InstanceSettingsHandler {
    fn keys(&self) -> HashSet<String> {
        let store = self.store.lock().unwrap();
        store
            .operative_names()
            .into_iter()
            .flat_map(|name| {
                ["cpus", "memory", "disk", "bridged"]
                    .into_iter()
                    .map(move |f| format!("{}.{}", name, f))
            })
            .map(|suffix| format!("{}.{}", self.root, suffix))
            .collect()
    }

    fn get(&self, key: &str) -> Result<String, FleetError> {
        let Some((instance, field)) = self.parse_key(key) else {
            return Err(FleetError::UnrecognizedSetting { key: key.to_string() });
        };
        let store = self.store.lock().unwrap();
        let record = store
            .get_operative(instance)
            .ok_or_else(|| FleetError::UnrecognizedSetting { key: key.to_string() })?;
        Ok(match field {
            Field::Cpus => record.num_cores.to_string(),
            Field::Memory => record.mem_size.bytes().to_string(),
            Field::Disk => record.disk_space.bytes().to_string(),
            Field::Bridged => record
                .extra_interfaces
                .iter()
                .any(|i| i.auto_mode)
                .to_string(),
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<(), FleetError> {
        let Some((instance, field)) = self.parse_key(key) else {
            return Err(FleetError::UnrecognizedSetting { key: key.to_string() });
        };
        let mut store = self.store.lock().unwrap();
        let record = store
            .get_operative_mut(instance)
            .ok_or_else(|| FleetError::InstanceSettings {
                message: format!("no such instance '{}'", instance),
            })?;

        match field {
            Field::Cpus => {
                Self::require_stopped(record.state)?;
                let cores: u32 = value.parse().map_err(|_| FleetError::InvalidSetting {
                    message: format!("'{}' is not a valid core count", value),
                })?;
                if cores == 0 {
                    return Err(FleetError::InvalidSetting {
                        message: "core count must be at least 1".to_string(),
                    });
                }
                record.num_cores = cores;
                Ok(())
            }
            Field::Memory => {
                Self::require_stopped(record.state)?;
                let size = ByteSize::parse(value).map_err(|_| FleetError::InvalidMemorySize {
                    message: format!("'{}' is not a valid memory size", value),
                })?;
                if size < fleet_core::size::MIN_MEMORY_SIZE {
                    return Err(FleetError::InvalidMemorySize {
                        message: "memory size must be at least 128MiB".to_string(),
                    });
                }
                record.mem_size = size;
                Ok(())
            }
            Field::Disk => {
                Self::require_stopped(record.state)?;
                let size = ByteSize::parse(value).map_err(|_| FleetError::InvalidDiskSize {
                    message: format!("'{}' is not a valid disk size", value),
                })?;
                if size <= record.disk_space {
                    return Err(FleetError::InvalidDiskSize {
                        message: "disk size can only be expanded".to_string(),
                    });
                }
                record.disk_space = size;
                Ok(())
            }
            Field::Bridged => {
                Self::require_stopped(record.state)?;
                let requested = bool::parse_setting(value).ok_or_else(|| FleetError::InvalidSetting {
                    message: format!("'{}' is not a valid boolean", value),
                })?;
                let already_bridged = record.extra_interfaces.iter().any(|i| i.auto_mode);
                if already_bridged && !requested {
                    return Err(FleetError::InvalidSetting {
                        message: "bridged cannot be disabled once enabled".to_string(),
                    });
                }
                if requested && !already_bridged {
                    let mut allocator = self.mac_allocator.lock().unwrap();
                    let mac = allocator.generate()?;
                    record.extra_interfaces.push(ExtraInterface {
                        id: "bridge0".to_string(),
                        mac,
                        auto_mode: true,
                    });
                }
                Ok(())
            }
        }
    }
}

/// Handles `<root>.<instance>.<snapshot>.{name|comment}`.
pub struct SnapshotSettingsHandler {
    root: String,
    snapshots: std::sync::Arc<Mutex<std::collections::HashMap<String, SnapshotTree>>>,
}

enum SnapshotField {
    Name,
    Comment,
}

impl SnapshotSettingsHandler {
    pub fn new(root: impl Into<String>, snapshots: std::sync::Arc<Mutex<std::collections::HashMap<String, SnapshotTree>>>) -> Self {
        SnapshotSettingsHandler {
            root: root.into(),
            snapshots,
        }
    }

    fn parse_key<'a>(&self, key: &'a str) -> Option<(&'a str, &'a str, SnapshotField)> {
        let rest = key.strip_prefix(&self.root)?.strip_prefix('.')?;
        let mut parts = rest.splitn(3, '.');
        let instance = parts.next()?;
        let snapshot = parts.next()?;
        let field = match parts.next()? {
            "name" => SnapshotField::Name,
            "comment" => SnapshotField::Comment,
            _ => return None,
        };
        Some((instance, snapshot, field))
    }
}

impl fleet_settings::SettingsHandler for SnapshotSettingsHandler {
    fn keys(&self) -> HashSet<String> {
        let snapshots = self.snapshots.lock().unwrap();
        snapshots
            .iter()
            .flat_map(|(instance, tree)| {
                tree.view_snapshots().into_iter().flat_map(move |s| {
                    let instance = instance.clone();
                    ["name", "comment"].into_iter().map(move |f| format!("{}.{}.{}", instance, s.name, f))
                })
            })
            .map(|suffix| format!("{}.{}", self.root, suffix))
            .collect()
    }

    fn get(&self, key: &str) -> Result<String, FleetError> {
        let Some((instance, name, field)) = self.parse_key(key) else {
            return Err(FleetError::UnrecognizedSetting { key: key.to_string() });
        };
        let snapshots = self.snapshots.lock().unwrap();
        let tree = snapshots
            .get(instance)
            .ok_or_else(|| FleetError::UnrecognizedSetting { key: key.to_string() })?;
        let snapshot = tree.get_snapshot(name)?;
        Ok(match field {
            SnapshotField::Name => snapshot.name,
            SnapshotField::Comment => snapshot.comment,
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<(), FleetError> {
        let Some((instance, name, field)) = self.parse_key(key) else {
            return Err(FleetError::UnrecognizedSetting { key: key.to_string() });
        };
        let mut snapshots = self.snapshots.lock().unwrap();
        let tree = snapshots
            .get_mut(instance)
            .ok_or_else(|| FleetError::NoSuchSnapshot { name: name.to_string() })?;
        match field {
            SnapshotField::Name => {
                if value.is_empty() {
                    return Err(FleetError::InvalidHostname { name: value.to_string() });
                }
                tree.rename_snapshot(name, value)
            }
            SnapshotField::Comment => tree.set_comment(name, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::ByteSize;
    use fleet_registry::InstanceRecord;
    use fleet_settings::SettingsHandler;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn sample_record(name: &str, state: VmState) -> InstanceRecord {
        InstanceRecord {
            name: name.to_string(),
            num_cores: 2,
            mem_size: ByteSize::from_gib(1),
            disk_space: ByteSize::from_gib(5),
            default_mac_address: MacAddress::parse("52:54:00:00:00:01").unwrap(),
            extra_interfaces: vec![],
            ssh_username: "ubuntu".to_string(),
            state,
            mounts: BTreeMap::new(),
            deleted: false,
            metadata: serde_json::Value::Null,
            clone_count: 0,
        }
    }

    fn handler_with(record: InstanceRecord) -> InstanceSettingsHandler {
        let mut store = InstanceStore::new_in_memory();
        store.insert_operative(record);
        InstanceSettingsHandler::new(
            "local",
            Arc::new(Mutex::new(store)),
            Arc::new(Mutex::new(fleet_core::mac::MacAllocator::new())),
        )
    }

    #[test]
    fn get_cpus_reads_current_value() {
        let handler = handler_with(sample_record("web-1", VmState::Stopped));
        assert_eq!(handler.get("local.web-1.cpus").unwrap(), "2");
    }

    #[test]
    fn set_cpus_while_running_is_rejected() {
        let handler = handler_with(sample_record("web-1", VmState::Running));
        let err = handler.set("local.web-1.cpus", "4").unwrap_err();
        assert!(matches!(err, FleetError::InstanceSettings { .. }));
    }

    #[test]
    fn set_cpus_while_stopped_succeeds() {
        let handler = handler_with(sample_record("web-1", VmState::Stopped));
        handler.set("local.web-1.cpus", "4").unwrap();
        assert_eq!(handler.get("local.web-1.cpus").unwrap(), "4");
    }

    #[test]
    fn disk_cannot_shrink() {
        let handler = handler_with(sample_record("web-1", VmState::Stopped));
        let err = handler.set("local.web-1.disk", "1G").unwrap_err();
        assert!(err.to_string().contains("can only be expanded"));
    }

    #[test]
    fn disk_can_grow() {
        let handler = handler_with(sample_record("web-1", VmState::Stopped));
        handler.set("local.web-1.disk", "10G").unwrap();
        assert_eq!(handler.get("local.web-1.disk").unwrap(), ByteSize::from_gib(10).bytes().to_string());
    }

    #[test]
    fn memory_below_minimum_is_rejected() {
        let handler = handler_with(sample_record("web-1", VmState::Stopped));
        let err = handler.set("local.web-1.memory", "32M").unwrap_err();
        assert!(matches!(err, FleetError::InvalidMemorySize { .. }));
    }

    #[test]
    fn bridged_cannot_be_disabled_once_enabled() {
        let handler = handler_with(sample_record("web-1", VmState::Stopped));
        handler.set("local.web-1.bridged", "true").unwrap();
        let err = handler.set("local.web-1.bridged", "false").unwrap_err();
        assert!(matches!(err, FleetError::InvalidSetting { .. }));
    }

    #[test]
    fn bridged_true_allocates_an_interface() {
        let handler = handler_with(sample_record("web-1", VmState::Stopped));
        handler.set("local.web-1.bridged", "true").unwrap();
        assert_eq!(handler.get("local.web-1.bridged").unwrap(), "true");
    }

    #[test]
    fn unknown_key_shape_is_unrecognized() {
        let handler = handler_with(sample_record("web-1", VmState::Stopped));
        assert!(matches!(
            handler.get("local.web-1.nonsense").unwrap_err(),
            FleetError::UnrecognizedSetting { .. }
        ));
    }

    fn snapshot_handler() -> (SnapshotSettingsHandler, Arc<Mutex<std::collections::HashMap<String, SnapshotTree>>>) {
        let mut tree = SnapshotTree::new();
        tree.take_snapshot(&sample_record("web-1", VmState::Stopped), Some("s1"), "first").unwrap();
        let mut map = std::collections::HashMap::new();
        map.insert("web-1".to_string(), tree);
        let snapshots = Arc::new(Mutex::new(map));
        (SnapshotSettingsHandler::new("local", Arc::clone(&snapshots)), snapshots)
    }

    #[test]
    fn get_snapshot_comment() {
        let (handler, _snapshots) = snapshot_handler();
        assert_eq!(handler.get("local.web-1.s1.comment").unwrap(), "first");
    }

    #[test]
    fn set_snapshot_name_renames() {
        let (handler, snapshots) = snapshot_handler();
        handler.set("local.web-1.s1.name", "renamed").unwrap();
        let snapshots = snapshots.lock().unwrap();
        let tree = snapshots.get("web-1").unwrap();
        assert!(tree.get_snapshot("renamed").is_ok());
        assert!(tree.get_snapshot("s1").is_err());
    }

    #[test]
    fn set_snapshot_name_empty_is_rejected() {
        let (handler, _snapshots) = snapshot_handler();
        let err = handler.set("local.web-1.s1.name", "").unwrap_err();
        assert!(matches!(err, FleetError::InvalidHostname { .. }));
    }

    #[test]
    fn set_snapshot_comment_updates() {
        let (handler, snapshots) = snapshot_handler();
        handler.set("local.web-1.s1.comment", "updated").unwrap();
        let snapshots = snapshots.lock().unwrap();
        assert_eq!(snapshots.get("web-1").unwrap().get_snapshot("s1").unwrap().comment, "updated");
    }
}
