//! Request selection and reaction (C10, §4.1): turning a possibly-empty
//! client-supplied name list into a concrete set of instances to act on,
//! and turning the outcome into a single composed error when demanded.

use std::collections::HashSet;

use fleet_core::FleetError;
use tracing::warn;

use crate::record::InstanceRecord;
use crate::store::InstanceStore;

/// The result of looking up one name (§4.1: `find`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trail<'a> {
    Operative(&'a InstanceRecord),
    Deleted(&'a InstanceRecord),
    Missing,
}

/// Which bucket an empty name list expands to (§4.1: `select`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultGroup {
    None,
    Operative,
    Deleted,
    All,
}

/// The three buckets a selection splits into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectReport {
    pub operative: Vec<String>,
    pub deleted: Vec<String>,
    pub missing: Vec<String>,
}

impl SelectReport {
    pub fn is_empty(&self) -> bool {
        self.operative.is_empty() && self.deleted.is_empty() && self.missing.is_empty()
    }
}

/// What to do with a non-empty bucket of a `SelectReport` (§4.1: `react`).
/// `message_template` may use `{names}` as a placeholder for the
/// comma-joined bucket contents.
#[derive(Debug, Clone)]
pub struct ReactionOutcome {
    pub is_error: bool,
    pub message_template: Option<String>,
}

impl ReactionOutcome {
    pub fn ok() -> Self {
        ReactionOutcome {
            is_error: false,
            message_template: None,
        }
    }

    pub fn error(message_template: impl Into<String>) -> Self {
        ReactionOutcome {
            is_error: true,
            message_template: Some(message_template.into()),
        }
    }
}

/// Per-bucket reaction triple for a `select` call.
#[derive(Debug, Clone)]
pub struct Reaction {
    pub on_missing: ReactionOutcome,
    pub on_deleted: ReactionOutcome,
}

impl Reaction {
    /// Missing and deleted names are both errors (the common case: an
    /// operation that only makes sense on an operative instance).
    pub fn strict() -> Self {
        Reaction {
            on_missing: ReactionOutcome::error("instance(s) {names} do not exist"),
            on_deleted: ReactionOutcome::error("instance(s) {names} are deleted"),
        }
    }

    /// Neither bucket is an error (e.g. `list`, which just reports what it
    /// finds).
    pub fn lenient() -> Self {
        Reaction {
            on_missing: ReactionOutcome::ok(),
            on_deleted: ReactionOutcome::ok(),
        }
    }
}

fn render(template: &str, names: &[String]) -> String {
    template.replace("{names}", &names.join(", "))
}

impl InstanceStore {
    /// O(1) lookup of a single name (§4.1: `find`).
    pub fn find(&self, name: &str) -> Trail<'_> {
        if let Some(record) = self.operative.get(name) {
            Trail::Operative(record)
        } else if let Some(record) = self.deleted.get(name) {
            Trail::Deleted(record)
        } else {
            Trail::Missing
        }
    }

    /// Expand `names` (de-duplicated, first-seen order preserved) into a
    /// `SelectReport`. An empty list expands to `default_group`.
    pub fn select(&self, names: &[String], default_group: DefaultGroup) -> SelectReport {
        let mut report = SelectReport::default();

        if names.is_empty() {
            match default_group {
                DefaultGroup::None => {}
                DefaultGroup::Operative => {
                    report.operative = self.operative.keys().cloned().collect();
                }
                DefaultGroup::Deleted => {
                    report.deleted = self.deleted.keys().cloned().collect();
                }
                DefaultGroup::All => {
                    report.operative = self.operative.keys().cloned().collect();
                    report.deleted = self.deleted.keys().cloned().collect();
                }
            }
            report.operative.sort();
            report.deleted.sort();
            return report;
        }

        let mut seen = HashSet::new();
        for name in names {
            if !seen.insert(name.clone()) {
                continue;
            }
            match self.find(name) {
                Trail::Operative(_) => report.operative.push(name.clone()),
                Trail::Deleted(_) => report.deleted.push(name.clone()),
                Trail::Missing => report.missing.push(name.clone()),
            }
        }
        report
    }

    /// Apply `reaction` to `report`, composing and logging a single error
    /// when a non-empty bucket demands one. Missing is checked first so its
    /// message takes precedence when both buckets are non-empty and both
    /// react with an error.
    pub fn react(report: &SelectReport, reaction: &Reaction) -> Result<(), FleetError> {
        if !report.missing.is_empty() && reaction.on_missing.is_error {
            let message = reaction
                .on_missing
                .message_template
                .as_deref()
                .map(|t| render(t, &report.missing))
                .unwrap_or_else(|| "instance(s) not found".to_string());
            warn!(missing = ?report.missing, "select: missing instances");
            return Err(FleetError::Internal { message });
        }
        if !report.deleted.is_empty() && reaction.on_deleted.is_error {
            let message = reaction
                .on_deleted
                .message_template
                .as_deref()
                .map(|t| render(t, &report.deleted))
                .unwrap_or_else(|| "instance(s) are deleted".to_string());
            warn!(deleted = ?report.deleted, "select: deleted instances");
            return Err(FleetError::Internal { message });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::InstanceRecord;
    use fleet_core::{ByteSize, MacAddress};
    use fleet_vm::VmState;
    use std::collections::BTreeMap;

    fn record(name: &str) -> InstanceRecord {
        InstanceRecord {
            name: name.to_string(),
            num_cores: 1,
            mem_size: ByteSize::from_gib(1),
            disk_space: ByteSize::from_gib(5),
            default_mac_address: MacAddress::parse("52:54:00:00:00:01").unwrap(),
            extra_interfaces: vec![],
            ssh_username: "ubuntu".to_string(),
            state: VmState::Stopped,
            mounts: BTreeMap::new(),
            deleted: false,
            metadata: serde_json::Value::Null,
            clone_count: 0,
        }
    }

    fn store_with(operative: &[&str], deleted: &[&str]) -> InstanceStore {
        let mut store = InstanceStore::new_in_memory();
        for name in operative {
            store.insert_operative(record(name));
        }
        for name in deleted {
            let mut r = record(name);
            r.deleted = true;
            r.state = VmState::Stopped;
            store.insert_deleted(r);
        }
        store
    }

    #[test]
    fn find_distinguishes_operative_deleted_missing() {
        let store = store_with(&["a"], &["b"]);
        assert!(matches!(store.find("a"), Trail::Operative(_)));
        assert!(matches!(store.find("b"), Trail::Deleted(_)));
        assert!(matches!(store.find("c"), Trail::Missing));
    }

    #[test]
    fn select_empty_with_operative_default_group() {
        let store = store_with(&["a", "b"], &["c"]);
        let report = store.select(&[], DefaultGroup::Operative);
        assert_eq!(report.operative, vec!["a".to_string(), "b".to_string()]);
        assert!(report.deleted.is_empty());
    }

    #[test]
    fn select_empty_with_all_default_group() {
        let store = store_with(&["a"], &["b"]);
        let report = store.select(&[], DefaultGroup::All);
        assert_eq!(report.operative, vec!["a".to_string()]);
        assert_eq!(report.deleted, vec!["b".to_string()]);
    }

    #[test]
    fn select_deduplicates_preserving_first_seen_order() {
        let store = store_with(&["a", "b"], &[]);
        let names = vec!["b".to_string(), "a".to_string(), "b".to_string()];
        let report = store.select(&names, DefaultGroup::None);
        assert_eq!(report.operative, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn select_splits_explicit_names_into_three_buckets() {
        let store = store_with(&["a"], &["b"]);
        let names = vec!["a".to_string(), "b".to_string(), "ghost".to_string()];
        let report = store.select(&names, DefaultGroup::None);
        assert_eq!(report.operative, vec!["a".to_string()]);
        assert_eq!(report.deleted, vec!["b".to_string()]);
        assert_eq!(report.missing, vec!["ghost".to_string()]);
    }

    #[test]
    fn react_strict_errors_on_missing() {
        let mut report = SelectReport::default();
        report.missing.push("ghost".to_string());
        let err = InstanceStore::react(&report, &Reaction::strict()).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn react_lenient_never_errors() {
        let mut report = SelectReport::default();
        report.missing.push("ghost".to_string());
        report.deleted.push("gone".to_string());
        assert!(InstanceStore::react(&report, &Reaction::lenient()).is_ok());
    }

    #[test]
    fn react_ok_on_empty_buckets() {
        let report = SelectReport::default();
        assert!(InstanceStore::react(&report, &Reaction::strict()).is_ok());
    }
}
