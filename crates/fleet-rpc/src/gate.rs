//! The authentication gate itself (C13, §4.9): combines cert-handshake
//! bootstrap/trust-check with the `authenticate` passphrase upgrade path.

use std::sync::Arc;

use anyhow::Result;

use crate::certs::{fingerprint_of_pem, CertFingerprint};
use crate::trust::TrustStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    /// First client ever seen; its cert was just trusted.
    Bootstrapped,
    /// Cert was already in the trust store.
    Trusted,
    /// Cert is unknown and the store is non-empty; the connection must
    /// be rejected unless the client subsequently calls `authenticate`.
    Untrusted,
}

pub struct AuthGate {
    trust_store: Arc<TrustStore>,
}

impl AuthGate {
    pub fn new(trust_store: Arc<TrustStore>) -> Self {
        AuthGate { trust_store }
    }

    /// Runs at connection setup, right after the client presents its
    /// cert, before any `RpcMethod` is dispatched.
    pub async fn authenticate_connection(&self, client_cert_pem: &[u8]) -> Result<AuthDecision> {
        let fingerprint = fingerprint_of_pem(client_cert_pem)?;

        if self.trust_store.bootstrap_if_empty(&fingerprint, client_cert_pem).await? {
            return Ok(AuthDecision::Bootstrapped);
        }
        if self.trust_store.contains(&fingerprint).await {
            return Ok(AuthDecision::Trusted);
        }
        Ok(AuthDecision::Untrusted)
    }

    /// Adds a client's cert to the trust store after the caller (the
    /// `authenticate` RPC handler in `fleet-daemon`) has independently
    /// verified its passphrase against `fleet_settings::PassphraseStore`
    /// — this gate owns cert trust, not passphrase hashing (§4.9).
    pub async fn trust_client(&self, client_cert_pem: &[u8]) -> Result<()> {
        let fingerprint: CertFingerprint = fingerprint_of_pem(client_cert_pem)?;
        self.trust_store.add(&fingerprint, client_cert_pem).await
    }

    /// Whether `ping` should succeed: it bypasses method dispatch but
    /// still requires the caller be trusted (§4.9).
    pub async fn is_trusted(&self, client_cert_pem: &[u8]) -> Result<bool> {
        let fingerprint = fingerprint_of_pem(client_cert_pem)?;
        Ok(self.trust_store.contains(&fingerprint).await)
    }
}

/// Restricts a just-created Unix socket to owner-only access (`0o600`)
/// since this gate assumes a single-client bootstrap trust model, not a
/// group-shared privileged socket.
#[cfg(unix)]
pub fn restrict_socket_permissions(socket_path: &std::path::Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certs::generate_self_signed;

    fn gate() -> (AuthGate, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TrustStore::load(dir.path()).unwrap());
        (AuthGate::new(store), dir)
    }

    #[tokio::test]
    async fn first_client_bootstraps() {
        let (gate, _dir) = gate();
        let cert = generate_self_signed("client-1").unwrap();
        let decision = gate.authenticate_connection(cert.cert_pem.as_bytes()).await.unwrap();
        assert_eq!(decision, AuthDecision::Bootstrapped);
    }

    #[tokio::test]
    async fn second_unknown_client_is_untrusted() {
        let (gate, _dir) = gate();
        let first = generate_self_signed("client-1").unwrap();
        gate.authenticate_connection(first.cert_pem.as_bytes()).await.unwrap();

        let second = generate_self_signed("client-2").unwrap();
        let decision = gate.authenticate_connection(second.cert_pem.as_bytes()).await.unwrap();
        assert_eq!(decision, AuthDecision::Untrusted);
    }

    #[tokio::test]
    async fn trust_client_promotes_an_unknown_client_after_passphrase_check_elsewhere() {
        let (gate, _dir) = gate();
        let first = generate_self_signed("client-1").unwrap();
        gate.authenticate_connection(first.cert_pem.as_bytes()).await.unwrap();

        let second = generate_self_signed("client-2").unwrap();
        assert_eq!(
            gate.authenticate_connection(second.cert_pem.as_bytes()).await.unwrap(),
            AuthDecision::Untrusted
        );

        gate.trust_client(second.cert_pem.as_bytes()).await.unwrap();
        assert_eq!(
            gate.authenticate_connection(second.cert_pem.as_bytes()).await.unwrap(),
            AuthDecision::Trusted
        );
    }

    #[tokio::test]
    async fn ping_requires_trust() {
        let (gate, _dir) = gate();
        let first = generate_self_signed("client-1").unwrap();
        gate.authenticate_connection(first.cert_pem.as_bytes()).await.unwrap();
        assert!(gate.is_trusted(first.cert_pem.as_bytes()).await.unwrap());

        let second = generate_self_signed("client-2").unwrap();
        assert!(!gate.is_trusted(second.cert_pem.as_bytes()).await.unwrap());
    }
}
