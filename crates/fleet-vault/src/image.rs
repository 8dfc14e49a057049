use std::path::PathBuf;

use chrono::{DateTime, Utc};
use fleet_core::hash::ContentHash;
use fleet_core::size::ByteSize;
use serde::{Deserialize, Serialize};

/// A prepared, on-disk image ready for VM instantiation (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VMImage {
    pub hash: ContentHash,
    pub path: PathBuf,
    pub size: ByteSize,
    pub last_used: DateTime<Utc>,
}
