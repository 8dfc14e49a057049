//! Static daemon configuration (§6): a small TOML file with CLI overrides
//! layered on top.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

fn default_socket() -> PathBuf {
    PathBuf::from("/run/fleetd.socket")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/fleetd")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("/var/cache/fleetd")
}

/// `multipassd.conf` (§6): watched for changes so a settings edit made
/// while the daemon is down still takes effect on next start, and so an
/// edit made by a parallel `fleetctl` invocation triggers a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticConfig {
    #[serde(default = "default_socket")]
    pub socket_path: PathBuf,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default)]
    pub verbosity: u8,
}

impl Default for StaticConfig {
    fn default() -> Self {
        StaticConfig {
            socket_path: default_socket(),
            data_dir: default_data_dir(),
            cache_dir: default_cache_dir(),
            verbosity: 0,
        }
    }
}

impl StaticConfig {
    /// Loads from `path` if it exists, otherwise returns defaults — a
    /// fresh install has no settings file yet (§6 "first run").
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(StaticConfig::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    pub fn instances_path(&self) -> PathBuf {
        self.data_dir.join("multipassd-vm-instances.json")
    }

    pub fn certificates_dir(&self) -> PathBuf {
        self.data_dir.join("certificates")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.data_dir.join("null-backend").join("images")
    }

    pub fn manifests_dir(&self) -> PathBuf {
        self.cache_dir.join("null-backend").join("manifests")
    }
}
