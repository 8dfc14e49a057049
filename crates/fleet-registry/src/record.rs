//! Persisted instance record (§3 data model).

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use fleet_core::{ByteSize, MacAddress};
use fleet_mount::MountSpec;
use fleet_vm::VmState;
use serde::{Deserialize, Serialize};

fn default_ssh_username() -> String {
    "ubuntu".to_string()
}

/// One additional network interface beyond the default (§3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraInterface {
    pub id: String,
    pub mac: MacAddress,
    #[serde(default)]
    pub auto_mode: bool,
}

/// The persisted per-instance configuration (§3). Encoded as one entry of
/// the `multipassd-vm-instances.json` object, keyed by instance name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub name: String,
    pub num_cores: u32,
    pub mem_size: ByteSize,
    pub disk_space: ByteSize,
    pub default_mac_address: MacAddress,
    #[serde(default)]
    pub extra_interfaces: Vec<ExtraInterface>,
    #[serde(default = "default_ssh_username")]
    pub ssh_username: String,
    pub state: VmState,
    #[serde(default)]
    pub mounts: BTreeMap<String, MountSpec>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub clone_count: u64,
}

impl InstanceRecord {
    /// All MACs in use by this instance: the default plus every extra
    /// interface (§8 invariant: `|macs(s)| = 1 + |s.extra_interfaces|`).
    pub fn all_macs(&self) -> Vec<&MacAddress> {
        let mut macs = vec![&self.default_mac_address];
        macs.extend(self.extra_interfaces.iter().map(|i| &i.mac));
        macs
    }

    /// §3 invariant: `deleted == true ⇒ state ∈ {stopped, off}`.
    pub fn repair_deleted_state_contradiction(&mut self) -> bool {
        if self.deleted && !matches!(self.state, VmState::Stopped | VmState::Off) {
            self.state = VmState::Stopped;
            true
        } else {
            false
        }
    }

    /// A record with no cores/ssh user/mem/disk set — §4.1's "ghost
    /// entry" that load() skips with a warning.
    pub fn is_ghost(&self) -> bool {
        self.num_cores == 0
            && self.ssh_username.is_empty()
            && self.mem_size.bytes() == 0
            && self.disk_space.bytes() == 0
    }

    /// Generate the next clone name: `<base>-clone<N>`, using a monotonic
    /// suffix counter; §3's `clone_count` is that counter.
    pub fn next_clone_name(&self, base: &str) -> String {
        format!("{}-clone{}", base, self.clone_count + 1)
    }
}

/// Ephemeral, non-persisted runtime info (§2.2 supplemented feature,
/// grounded on the original's `runtime_instance_info_helper`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceRuntimeInfo {
    pub ipv4_addresses: Vec<Ipv4Addr>,
    pub ssh_port: Option<u16>,
    pub load: Option<[f32; 3]>,
    pub disk_usage_bytes: Option<u64>,
    pub current_release: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InstanceRecord {
        InstanceRecord {
            name: "web-1".to_string(),
            num_cores: 2,
            mem_size: ByteSize::from_gib(1),
            disk_space: ByteSize::from_gib(5),
            default_mac_address: MacAddress::parse("52:54:00:12:34:56").unwrap(),
            extra_interfaces: vec![ExtraInterface {
                id: "eth1".to_string(),
                mac: MacAddress::parse("52:54:00:12:34:57").unwrap(),
                auto_mode: true,
            }],
            ssh_username: "ubuntu".to_string(),
            state: VmState::Running,
            mounts: BTreeMap::new(),
            deleted: false,
            metadata: serde_json::Value::Null,
            clone_count: 0,
        }
    }

    #[test]
    fn all_macs_includes_default_and_extras() {
        let record = sample();
        assert_eq!(record.all_macs().len(), 2);
    }

    #[test]
    fn repairs_deleted_running_contradiction() {
        let mut record = sample();
        record.deleted = true;
        assert!(record.repair_deleted_state_contradiction());
        assert_eq!(record.state, VmState::Stopped);
    }

    #[test]
    fn does_not_touch_consistent_deleted_record() {
        let mut record = sample();
        record.deleted = true;
        record.state = VmState::Off;
        assert!(!record.repair_deleted_state_contradiction());
        assert_eq!(record.state, VmState::Off);
    }

    #[test]
    fn ghost_detection() {
        let mut record = sample();
        record.num_cores = 0;
        record.ssh_username = String::new();
        record.mem_size = ByteSize::from_bytes(0);
        record.disk_space = ByteSize::from_bytes(0);
        assert!(record.is_ghost());
    }

    #[test]
    fn non_ghost_record_is_not_flagged() {
        assert!(!sample().is_ghost());
    }

    #[test]
    fn next_clone_name_increments() {
        let record = sample();
        assert_eq!(record.next_clone_name("web-1"), "web-1-clone1");
    }

    #[test]
    fn serde_round_trip() {
        let record = sample();
        let json = serde_json::to_string(&record).unwrap();
        let parsed: InstanceRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn backward_compat_missing_ssh_username_defaults_to_ubuntu() {
        let json = r#"{
            "name": "legacy",
            "num_cores": 1,
            "mem_size": 1073741824,
            "disk_space": 5368709120,
            "default_mac_address": "52:54:00:00:00:01",
            "state": "stopped"
        }"#;
        let parsed: InstanceRecord = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.ssh_username, "ubuntu");
        assert!(parsed.extra_interfaces.is_empty());
        assert!(!parsed.deleted);
    }
}
