//! Hostname validation shared by instance names, snapshot names, and
//! mount target checks.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FleetError;

/// A name that has passed hostname validation: starts with a letter,
/// contains only `[a-zA-Z0-9-]`, does not end in a hyphen, and is at
/// most 63 characters (the DNS label limit, which this system also
/// imposes on instance and snapshot names since they become guest
/// hostnames).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hostname(String);

impl Hostname {
    pub fn parse(name: &str) -> Result<Self, FleetError> {
        if !is_valid_hostname(name) {
            return Err(FleetError::InvalidHostname {
                name: name.to_string(),
            });
        }
        Ok(Hostname(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Hostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Hostname {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Check hostname validity without constructing a `Hostname`.
pub fn is_valid_hostname(name: &str) -> bool {
    if name.is_empty() || name.len() > 63 {
        return false;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    if name.ends_with('-') {
        return false;
    }
    name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_names() {
        assert!(Hostname::parse("web-1").is_ok());
        assert!(Hostname::parse("a").is_ok());
    }

    #[test]
    fn rejects_leading_digit() {
        assert!(!is_valid_hostname("1web"));
    }

    #[test]
    fn rejects_trailing_hyphen() {
        assert!(!is_valid_hostname("web-"));
    }

    #[test]
    fn rejects_underscores_and_dots() {
        assert!(!is_valid_hostname("web_1"));
        assert!(!is_valid_hostname("web.example"));
    }

    #[test]
    fn rejects_empty_and_too_long() {
        assert!(!is_valid_hostname(""));
        let long = "a".repeat(64);
        assert!(!is_valid_hostname(&long));
        let ok = "a".repeat(63);
        assert!(is_valid_hostname(&ok));
    }

    #[test]
    fn error_carries_offending_name() {
        let err = Hostname::parse("bad_name").unwrap_err();
        match err {
            FleetError::InvalidHostname { name } => assert_eq!(name, "bad_name"),
            _ => panic!("wrong error variant"),
        }
    }
}
