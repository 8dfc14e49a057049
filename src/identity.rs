//! The client's own self-signed identity (§4.9): generated once on first
//! use and reused on every later invocation, so the daemon's trust store
//! recognizes the same `fleetctl` across calls instead of bootstrapping a
//! fresh identity each time.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fleet_rpc::generate_self_signed;

/// Loads the cert PEM at `path`, generating and persisting a fresh
/// self-signed identity if none exists yet.
pub fn load_or_create(path: &Path) -> Result<String> {
    if let Ok(existing) = std::fs::read_to_string(path) {
        return Ok(existing);
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("creating fleetctl identity directory")?;
    }

    let common_name = std::env::var("USER").unwrap_or_else(|_| "fleetctl".to_string());
    let generated = generate_self_signed(&common_name).context("generating client identity")?;
    std::fs::write(path, &generated.cert_pem).context("persisting client identity")?;
    Ok(generated.cert_pem)
}

/// Default location for the client's persisted identity: under the
/// user's config home, alongside where `fleetctl` would keep other state.
pub fn default_identity_path() -> PathBuf {
    home_dir().join(".config").join("fleetctl").join("identity.pem")
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}
