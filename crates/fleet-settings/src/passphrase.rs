//! Write-only `passphrase` setting (§4.7, §4.9): backs the `authenticate`
//! RPC's scrypt-hash check. `get` always fails — §8's round-trip property
//! explicitly excludes write-only settings like this one.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use fleet_core::FleetError;
use rand::RngCore;
use scrypt::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use scrypt::Scrypt;

use crate::registry::SettingsHandler;

const PASSPHRASE_KEY: &str = "passphrase";

/// Shared storage for the current passphrase hash, handed to both the
/// settings handler (writer) and `fleet-rpc`'s auth gate (reader) at
/// daemon construction time.
#[derive(Default, Clone)]
pub struct PassphraseStore(Arc<Mutex<Option<String>>>);

impl PassphraseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.0.lock().unwrap().is_some()
    }

    /// Verify a candidate passphrase against the stored hash. Returns
    /// `false` (not an error) when no passphrase has ever been set.
    pub fn verify(&self, candidate: &str) -> bool {
        let guard = self.0.lock().unwrap();
        let Some(hash) = guard.as_ref() else {
            return false;
        };
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        Scrypt.verify_password(candidate.as_bytes(), &parsed).is_ok()
    }

    fn set(&self, passphrase: &str) -> Result<(), FleetError> {
        let mut salt_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| {
            FleetError::InvalidSetting {
                message: format!("failed to generate salt: {}", e),
            }
        })?;
        let hash = Scrypt
            .hash_password(passphrase.as_bytes(), &salt)
            .map_err(|e| FleetError::InvalidSetting {
                message: format!("failed to hash passphrase: {}", e),
            })?
            .to_string();
        *self.0.lock().unwrap() = Some(hash);
        Ok(())
    }
}

pub struct PassphraseHandler {
    store: PassphraseStore,
}

impl PassphraseHandler {
    pub fn new(store: PassphraseStore) -> Self {
        PassphraseHandler { store }
    }
}

impl SettingsHandler for PassphraseHandler {
    fn keys(&self) -> HashSet<String> {
        HashSet::from([PASSPHRASE_KEY.to_string()])
    }

    fn get(&self, key: &str) -> Result<String, FleetError> {
        if key != PASSPHRASE_KEY {
            return Err(FleetError::UnrecognizedSetting { key: key.to_string() });
        }
        Err(FleetError::UnsupportedSettingValueType)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), FleetError> {
        if key != PASSPHRASE_KEY {
            return Err(FleetError::UnrecognizedSetting { key: key.to_string() });
        }
        if value.is_empty() {
            return Err(FleetError::InvalidSetting {
                message: "passphrase must not be empty".to_string(),
            });
        }
        self.store.set(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_store_rejects_every_candidate() {
        let store = PassphraseStore::new();
        assert!(!store.verify("anything"));
    }

    #[test]
    fn set_then_verify_matching_passphrase() {
        let store = PassphraseStore::new();
        let handler = PassphraseHandler::new(store.clone());
        handler.set(PASSPHRASE_KEY, "correct horse battery staple").unwrap();
        assert!(store.verify("correct horse battery staple"));
        assert!(!store.verify("wrong"));
    }

    #[test]
    fn get_is_always_unsupported() {
        let store = PassphraseStore::new();
        let handler = PassphraseHandler::new(store);
        handler.set(PASSPHRASE_KEY, "hunter2").unwrap();
        let err = handler.get(PASSPHRASE_KEY).unwrap_err();
        assert!(matches!(err, FleetError::UnsupportedSettingValueType));
    }

    #[test]
    fn rejects_empty_passphrase() {
        let store = PassphraseStore::new();
        let handler = PassphraseHandler::new(store);
        assert!(handler.set(PASSPHRASE_KEY, "").is_err());
    }

    #[test]
    fn rejects_unrecognized_key() {
        let store = PassphraseStore::new();
        let handler = PassphraseHandler::new(store);
        assert!(matches!(
            handler.set("client.other", "x"),
            Err(FleetError::UnrecognizedSetting { .. })
        ));
    }
}
