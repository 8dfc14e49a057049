use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `{source_path, uid_mappings, gid_mappings, type}` (§3 data model).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSpec {
    pub source_path: String,
    #[serde(default)]
    pub uid_mappings: BTreeMap<u32, u32>,
    #[serde(default)]
    pub gid_mappings: BTreeMap<u32, u32>,
    #[serde(rename = "type")]
    pub mount_type: MountType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountType {
    Classic,
    Native,
}
