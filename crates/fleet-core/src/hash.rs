//! Content hashing for the image vault (§4.2): images are addressed by
//! full SHA-256 hash unless a checksum string carries an explicit
//! algorithm prefix (`sha512:...`).

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};

use crate::error::FleetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha512,
}

/// A hex-encoded content hash, tagged with the algorithm that produced it.
/// `Display`/serde representation is the bare hex digest for `Sha256`
/// (the default, used as the vault's primary key) and `algo:hex` for
/// anything else, matching checksum strings as they appear in manifests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn of_bytes(algo: HashAlgorithm, data: &[u8]) -> Self {
        let hex = match algo {
            HashAlgorithm::Sha256 => hex_encode(&Sha256::digest(data)),
            HashAlgorithm::Sha512 => hex_encode(&Sha512::digest(data)),
        };
        ContentHash(canonical_key(algo, &hex))
    }

    /// Parse a checksum string as it appears in a manifest or CLI flag:
    /// a bare hex digest (assumed SHA-256) or `algo:hex`.
    pub fn parse(checksum: &str) -> Result<Self, FleetError> {
        if let Some((algo_str, hex)) = checksum.split_once(':') {
            let algo = match algo_str.to_ascii_lowercase().as_str() {
                "sha256" => HashAlgorithm::Sha256,
                "sha512" => HashAlgorithm::Sha512,
                other => {
                    return Err(FleetError::InvalidSetting {
                        message: format!("unknown checksum algorithm '{}'", other),
                    });
                }
            };
            validate_hex(hex)?;
            Ok(ContentHash(canonical_key(algo, hex)))
        } else {
            validate_hex(checksum)?;
            Ok(ContentHash(canonical_key(HashAlgorithm::Sha256, checksum)))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The hex digest without any algorithm prefix — used as the vault's
    /// content-addressed storage key regardless of which algorithm the
    /// originating checksum used, since a SHA-256 vault key is always
    /// computed locally from the downloaded bytes (§4.2).
    pub fn vault_key(&self) -> &str {
        self.0.rsplit_once(':').map(|(_, hex)| hex).unwrap_or(&self.0)
    }
}

fn canonical_key(algo: HashAlgorithm, hex: &str) -> String {
    let hex = hex.to_ascii_lowercase();
    match algo {
        HashAlgorithm::Sha256 => hex,
        HashAlgorithm::Sha512 => format!("sha512:{}", hex),
    }
}

fn validate_hex(s: &str) -> Result<(), FleetError> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(FleetError::InvalidSetting {
            message: format!("'{}' is not a valid hex digest", s),
        });
    }
    Ok(())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
