//! MAC address value type and allocator (C2, §5 shared-resource policy).
//!
//! A validated, colon-separated 6-octet address. This system allocates
//! random, daemon-wide-unique locally administered addresses, retrying up
//! to 5 times (§5, §8).

use std::collections::HashSet;
use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::FleetError;

const MAX_GENERATE_ATTEMPTS: u32 = 5;

/// A validated, canonically-lowercased colon-separated MAC address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MacAddress(String);

impl MacAddress {
    pub fn parse(s: &str) -> Result<Self, FleetError> {
        let octets = parse_octets(s).ok_or_else(|| FleetError::InvalidSetting {
            message: format!("'{}' is not a valid MAC address", s),
        })?;
        Ok(MacAddress(format_octets(&octets)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A random locally-administered, unicast MAC (bit 1 of the first
    /// octet set, bit 0 clear) — the conventional `02:xx:xx:xx:xx:xx` form.
    fn random() -> Self {
        let mut octets = [0u8; 6];
        rand::thread_rng().fill_bytes(&mut octets);
        octets[0] = (octets[0] & 0b1111_1100) | 0b0000_0010;
        MacAddress(format_octets(&octets))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn parse_octets(s: &str) -> Option<[u8; 6]> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 6 {
        return None;
    }
    let mut octets = [0u8; 6];
    for (i, part) in parts.iter().enumerate() {
        if part.len() != 2 {
            return None;
        }
        octets[i] = u8::from_str_radix(part, 16).ok()?;
    }
    Some(octets)
}

fn format_octets(octets: &[u8; 6]) -> String {
    octets
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Daemon-wide MAC allocator: a guarded set of all MACs currently in use
/// (a `default_mac_address` or an `extra_interfaces` entry of any
/// instance). Callers hold this behind a `Mutex` in the daemon; the
/// allocator itself has no interior mutability so it stays easy to unit
/// test.
#[derive(Debug, Default)]
pub struct MacAllocator {
    allocated: HashSet<MacAddress>,
}

impl MacAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_existing(macs: impl IntoIterator<Item = MacAddress>) -> Self {
        MacAllocator {
            allocated: macs.into_iter().collect(),
        }
    }

    pub fn contains(&self, mac: &MacAddress) -> bool {
        self.allocated.contains(mac)
    }

    pub fn len(&self) -> usize {
        self.allocated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocated.is_empty()
    }

    /// Reserve a specific MAC (used when a client supplies `--network
    /// ...,mac=...` explicitly). Fails if already allocated.
    pub fn reserve(&mut self, mac: MacAddress) -> Result<(), FleetError> {
        if !self.allocated.insert(mac.clone()) {
            return Err(FleetError::InvalidSetting {
                message: format!("Repeated MAC address {}", mac),
            });
        }
        Ok(())
    }

    pub fn release(&mut self, mac: &MacAddress) {
        self.allocated.remove(mac);
    }

    /// Generate and reserve a fresh unique MAC, retrying up to
    /// `MAX_GENERATE_ATTEMPTS` times before giving up (§5, §8).
    pub fn generate(&mut self) -> Result<MacAddress, FleetError> {
        self.generate_with(MacAddress::random)
    }

    /// Same as `generate`, but draws candidates from `source` instead of
    /// the system RNG — lets tests exhaust the allocator deterministically.
    fn generate_with(
        &mut self,
        mut source: impl FnMut() -> MacAddress,
    ) -> Result<MacAddress, FleetError> {
        for _ in 0..MAX_GENERATE_ATTEMPTS {
            let candidate = source();
            if self.allocated.insert(candidate.clone()) {
                return Ok(candidate);
            }
        }
        Err(FleetError::MacAllocationExhausted {
            attempts: MAX_GENERATE_ATTEMPTS,
        })
    }
}
