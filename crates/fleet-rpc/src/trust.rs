//! Trusted-client cert store (§4.9, §6): a flat fingerprint set persisted
//! as PEM files under `<data>/certificates/`. Deliberately not a CA
//! hierarchy — see `certs.rs`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::sync::Mutex;

use crate::certs::{fingerprint_of_pem, CertFingerprint};

pub struct TrustStore {
    dir: PathBuf,
    fingerprints: Mutex<HashSet<CertFingerprint>>,
}

impl TrustStore {
    /// Loads every `*.pem` file already under `dir` (creating it if
    /// missing) and indexes each by its fingerprint.
    pub fn load(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).context("creating certificate trust directory")?;

        let mut fingerprints = HashSet::new();
        for entry in std::fs::read_dir(&dir).context("reading certificate trust directory")? {
            let entry = entry?;
            if entry.path().extension().and_then(|e| e.to_str()) != Some("pem") {
                continue;
            }
            let pem = std::fs::read(entry.path())?;
            if let Ok(fingerprint) = fingerprint_of_pem(&pem) {
                fingerprints.insert(fingerprint);
            }
        }

        Ok(TrustStore {
            dir,
            fingerprints: Mutex::new(fingerprints),
        })
    }

    pub async fn is_empty(&self) -> bool {
        self.fingerprints.lock().await.is_empty()
    }

    pub async fn contains(&self, fingerprint: &CertFingerprint) -> bool {
        self.fingerprints.lock().await.contains(fingerprint)
    }

    /// Accepts `cert_pem` as trusted iff the store currently has no
    /// trusted clients — the first-connect bootstrap (§4.9). Returns
    /// whether the bootstrap happened.
    pub async fn bootstrap_if_empty(&self, fingerprint: &CertFingerprint, cert_pem: &[u8]) -> Result<bool> {
        let mut fingerprints = self.fingerprints.lock().await;
        if !fingerprints.is_empty() {
            return Ok(false);
        }
        fingerprints.insert(fingerprint.clone());
        drop(fingerprints);
        self.persist(fingerprint, cert_pem)?;
        Ok(true)
    }

    /// Adds `cert_pem` to the trust store unconditionally — used after a
    /// successful `authenticate` passphrase check (§4.9).
    pub async fn add(&self, fingerprint: &CertFingerprint, cert_pem: &[u8]) -> Result<()> {
        self.fingerprints.lock().await.insert(fingerprint.clone());
        self.persist(fingerprint, cert_pem)
    }

    fn persist(&self, fingerprint: &CertFingerprint, cert_pem: &[u8]) -> Result<()> {
        let path = self.cert_path(fingerprint);
        std::fs::write(&path, cert_pem).with_context(|| format!("writing trusted cert to {}", path.display()))
    }

    fn cert_path(&self, fingerprint: &CertFingerprint) -> PathBuf {
        self.dir.join(format!("{fingerprint}.pem"))
    }
}

pub fn default_certificates_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("certificates")
}
