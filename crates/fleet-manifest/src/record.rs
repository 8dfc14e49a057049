use fleet_core::hash::ContentHash;
use serde::{Deserialize, Serialize};

/// One catalog entry: a buildable/downloadable image (§3 data model).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub hash: ContentHash,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub os: String,
    pub release: String,
    pub release_title: String,
    pub version: String,
    pub image_url: String,
    #[serde(default)]
    pub stream_url: String,
    #[serde(default = "default_supported")]
    pub supported: bool,
}

fn default_supported() -> bool {
    true
}
