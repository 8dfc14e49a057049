//! Byte-size parsing, formatting, and comparison (C1).
//!
//! Mirrors the instance spec's `mem_size`/`disk_space` fields: both are
//! plain byte counts underneath, but are accepted from users and config
//! files as human strings like `"1G"`, `"512MiB"`, `"5GB"`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FleetError;

/// Minimum memory size accepted for any instance (§8 boundary behavior).
pub const MIN_MEMORY_SIZE: ByteSize = ByteSize(128 * 1024 * 1024);

/// A byte count with human-friendly parsing/formatting.
///
/// Serializes as a plain `u64` of bytes so persisted specs stay simple to
/// diff and migrate; the human string forms only exist at the parse/format
/// boundary (CLI args, settings values).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ByteSize(u64);

impl ByteSize {
    pub const fn from_bytes(bytes: u64) -> Self {
        ByteSize(bytes)
    }

    pub fn bytes(self) -> u64 {
        self.0
    }

    pub const fn from_mib(mib: u64) -> Self {
        ByteSize(mib * 1024 * 1024)
    }

    pub const fn from_gib(gib: u64) -> Self {
        ByteSize(gib * 1024 * 1024 * 1024)
    }

    /// Parse a human size string. Accepts an optional decimal-or-binary
    /// suffix: `B`, `K`/`KB`/`KiB`, `M`/`MB`/`MiB`, `G`/`GB`/`GiB`,
    /// `T`/`TB`/`TiB`. Bare digits are interpreted as bytes. Case-insensitive.
    /// Binary (`Ki`/`Mi`/`Gi`/`Ti`) and decimal (`K`/`M`/`G`/`T`) suffixes
    /// both resolve to the 1024-based multiplier, matching the source
    /// tool's convention of treating "1G" as 1 GiB for VM sizing.
    pub fn parse(input: &str) -> Result<Self, FleetError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(FleetError::InvalidSetting {
                message: "empty size string".to_string(),
            });
        }

        let lower = s.to_ascii_lowercase();
        let (digits, multiplier) = if let Some(d) = lower.strip_suffix("tib").or(lower.strip_suffix("tb")).or(lower.strip_suffix("t")) {
            (d, 1024u64.pow(4))
        } else if let Some(d) = lower.strip_suffix("gib").or(lower.strip_suffix("gb")).or(lower.strip_suffix("g")) {
            (d, 1024u64.pow(3))
        } else if let Some(d) = lower.strip_suffix("mib").or(lower.strip_suffix("mb")).or(lower.strip_suffix("m")) {
            (d, 1024u64.pow(2))
        } else if let Some(d) = lower.strip_suffix("kib").or(lower.strip_suffix("kb")).or(lower.strip_suffix("k")) {
            (d, 1024)
        } else if let Some(d) = lower.strip_suffix("b") {
            (d, 1)
        } else {
            (lower.as_str(), 1)
        };

        let digits = digits.trim();
        let value: f64 = digits.parse().map_err(|_| FleetError::InvalidSetting {
            message: format!("'{}' is not a valid size", input),
        })?;
        if value < 0.0 {
            return Err(FleetError::InvalidSetting {
                message: format!("'{}' is negative", input),
            });
        }

        Ok(ByteSize((value * multiplier as f64).round() as u64))
    }

    /// Format as the largest whole unit that divides evenly, falling back
    /// to a one-decimal approximation otherwise (e.g. `1.5G`).
    pub fn format_human(self) -> String {
        const UNITS: &[(u64, &str)] = &[
            (1024u64.pow(4), "T"),
            (1024u64.pow(3), "G"),
            (1024u64.pow(2), "M"),
            (1024, "K"),
        ];
        for &(unit, suffix) in UNITS {
            if self.0 >= unit {
                let whole = self.0 / unit;
                let rem = self.0 % unit;
                if rem == 0 {
                    return format!("{}{}", whole, suffix);
                }
                let approx = self.0 as f64 / unit as f64;
                return format!("{:.1}{}", approx, suffix);
            }
        }
        format!("{}B", self.0)
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_human())
    }
}

impl FromStr for ByteSize {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_bytes() {
        assert_eq!(ByteSize::parse("1024").unwrap().bytes(), 1024);
    }

    #[test]
    fn parses_binary_and_decimal_suffixes_identically() {
        assert_eq!(ByteSize::parse("1G").unwrap(), ByteSize::parse("1GiB").unwrap());
        assert_eq!(ByteSize::parse("1GB").unwrap().bytes(), 1024 * 1024 * 1024);
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(ByteSize::parse("5g").unwrap(), ByteSize::parse("5G").unwrap());
    }

    #[test]
    fn rejects_empty_and_negative() {
        assert!(ByteSize::parse("").is_err());
        assert!(ByteSize::parse("-1G").is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(ByteSize::parse("a lot").is_err());
    }

    #[test]
    fn formats_human_whole_units() {
        assert_eq!(ByteSize::from_gib(5).format_human(), "5G");
        assert_eq!(ByteSize::from_mib(512).format_human(), "512M");
    }

    #[test]
    fn formats_human_fractional() {
        assert_eq!(ByteSize::from_bytes(1024 * 1024 * 1024 + 512 * 1024 * 1024).format_human(), "1.5G");
    }

    #[test]
    fn ordering_compares_by_bytes() {
        assert!(ByteSize::from_mib(512) < ByteSize::from_gib(1));
        assert!(ByteSize::from_gib(1) == ByteSize::from_mib(1024));
    }

    #[test]
    fn min_memory_size_is_128_mib() {
        assert_eq!(MIN_MEMORY_SIZE.bytes(), 128 * 1024 * 1024);
    }

    #[test]
    fn roundtrips_through_serde_as_bare_integer() {
        let size = ByteSize::from_gib(2);
        let json = serde_json::to_string(&size).unwrap();
        assert_eq!(json, (2u64 * 1024 * 1024 * 1024).to_string());
        let parsed: ByteSize = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, size);
    }
}
