//! Self-signed certificate generation and fingerprinting (§4.9).
//!
//! No CA hierarchy: this daemon's single-host, single-client-class
//! trust model (§4.9) identifies a client by the fingerprint of its own
//! self-signed cert rather than by a chain signed by a shared CA, so there
//! is no CA key pair here — every party generates one cert and presents it.

use anyhow::{Context, Result};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use sha2::{Digest, Sha256};

/// A PEM-encoded certificate and its matching private key.
pub struct GeneratedCert {
    pub cert_pem: String,
    pub key_pem: String,
}

/// Generate a fresh self-signed identity certificate for `common_name`
/// (the daemon's hostname, or a client's local username).
pub fn generate_self_signed(common_name: &str) -> Result<GeneratedCert> {
    let key = KeyPair::generate().context("generating key pair")?;
    let mut params = CertificateParams::new(vec![common_name.to_string()]).context("building cert params")?;
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    dn.push(DnType::OrganizationName, "fleet");
    params.distinguished_name = dn;
    let cert = params.self_signed(&key).context("self-signing certificate")?;

    Ok(GeneratedCert {
        cert_pem: cert.pem(),
        key_pem: key.serialize_pem(),
    })
}

/// SHA-256 fingerprint of a cert's DER bytes, hex-encoded — the identity
/// a `TrustStore` actually tracks.
pub type CertFingerprint = String;

/// Parse the first certificate out of a PEM blob and return its
/// fingerprint.
pub fn fingerprint_of_pem(cert_pem: &[u8]) -> Result<CertFingerprint> {
    let mut reader = std::io::BufReader::new(cert_pem);
    let der = rustls_pemfile::certs(&mut reader)
        .next()
        .ok_or_else(|| anyhow::anyhow!("no certificate found in PEM input"))?
        .context("parsing PEM certificate")?;
    Ok(hex_encode(&Sha256::digest(der.as_ref())))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
