//! Arena-backed snapshot forest for one instance (§4.4, §9 design note).
//!
//! Generalized from a fixed two-level base/delta pair to an
//! arbitrary-depth forest since this system's snapshots are named and
//! user-branchable. Nodes never move
//! once pushed, so `parent` indices stay stable across deletes — a deleted
//! node's slot becomes `None` and its children are re-parented.

use std::cell::RefCell;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use fleet_core::FleetError;
use fleet_core::hostname::is_valid_hostname;
use fleet_mount::MountSpec;
use fleet_registry::InstanceRecord;

struct Node {
    name: String,
    comment: String,
    parent: Option<usize>,
    captured_spec: InstanceRecord,
    created_at: DateTime<Utc>,
}

/// A read-only view of one snapshot, independent of arena internals.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub name: String,
    pub parent: Option<String>,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub captured_spec: InstanceRecord,
}

/// Result of `restore_snapshot`.
#[derive(Debug, Clone, Default)]
pub struct RestoreOutcome {
    /// Name of the automatic pre-restore snapshot, if one was taken
    /// (`destructive == false`).
    pub auto_snapshot: Option<String>,
    /// Mount targets present before restore but absent (or changed) in the
    /// restored spec — the caller prunes these via `fleet-mount`.
    pub pruned_mount_targets: Vec<String>,
    /// Mount targets newly present in the restored spec.
    pub new_mount_targets: Vec<String>,
}

/// One instance's snapshot forest.
#[derive(Default)]
pub struct SnapshotTree {
    nodes: Vec<Option<Node>>,
    by_name: HashMap<String, usize>,
    head: Option<usize>,
    topo_cache: RefCell<Option<Vec<usize>>>,
}

impl SnapshotTree {
    pub fn new() -> Self {
        Self::default()
    }

    fn invalidate_cache(&self) {
        *self.topo_cache.borrow_mut() = None;
    }

    fn next_auto_name(&self) -> String {
        let max = self
            .by_name
            .keys()
            .filter_map(|n| n.strip_prefix("snapshot"))
            .filter_map(|suffix| suffix.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        format!("snapshot{}", max + 1)
    }

    /// Take a snapshot of `spec` as a child of the current head (§4.4).
    pub fn take_snapshot(
        &mut self,
        spec: &InstanceRecord,
        name: Option<&str>,
        comment: &str,
    ) -> Result<Snapshot, FleetError> {
        let name = match name {
            Some(n) if !n.is_empty() => {
                if self.by_name.contains_key(n) {
                    return Err(FleetError::SnapshotNameTaken { name: n.to_string() });
                }
                n.to_string()
            }
            _ => self.next_auto_name(),
        };

        let node = Node {
            name: name.clone(),
            comment: comment.to_string(),
            parent: self.head,
            captured_spec: spec.clone(),
            created_at: Utc::now(),
        };

        let idx = self.nodes.len();
        self.nodes.push(Some(node));
        self.by_name.insert(name.clone(), idx);
        self.head = Some(idx);
        self.invalidate_cache();

        self.get_snapshot(&name)
    }

    /// Delete a snapshot, re-parenting its children to its own parent
    /// (§4.4). `instance_deleted` guards the rule that a deleted instance's
    /// snapshots can only go away as a whole via purge.
    pub fn delete_snapshot(&mut self, name: &str, instance_deleted: bool) -> Result<(), FleetError> {
        if instance_deleted {
            return Err(FleetError::InstanceSettings {
                message: format!(
                    "cannot delete snapshot '{}' of a deleted instance; purge the instance instead",
                    name
                ),
            });
        }

        let idx = *self
            .by_name
            .get(name)
            .ok_or_else(|| FleetError::NoSuchSnapshot { name: name.to_string() })?;

        let parent = self.nodes[idx].as_ref().and_then(|n| n.parent);

        for slot in self.nodes.iter_mut() {
            if let Some(node) = slot {
                if node.parent == Some(idx) {
                    node.parent = parent;
                }
            }
        }

        if self.head == Some(idx) {
            self.head = parent;
        }

        self.nodes[idx] = None;
        self.by_name.remove(name);
        self.invalidate_cache();
        Ok(())
    }

    /// Rename a snapshot, validating the new name is hostname-shaped and
    /// unused (§4.4).
    pub fn rename_snapshot(&mut self, old: &str, new: &str) -> Result<(), FleetError> {
        if !is_valid_hostname(new) {
            return Err(FleetError::InvalidHostname { name: new.to_string() });
        }
        if self.by_name.contains_key(new) {
            return Err(FleetError::SnapshotNameTaken { name: new.to_string() });
        }
        let idx = *self
            .by_name
            .get(old)
            .ok_or_else(|| FleetError::NoSuchSnapshot { name: old.to_string() })?;

        self.by_name.remove(old);
        self.by_name.insert(new.to_string(), idx);
        if let Some(node) = self.nodes[idx].as_mut() {
            node.name = new.to_string();
        }
        Ok(())
    }

    /// Update a snapshot's free-form comment (`<root>.<instance>.<snapshot>.comment`
    /// setting, §4.7).
    pub fn set_comment(&mut self, name: &str, comment: &str) -> Result<(), FleetError> {
        let idx = *self
            .by_name
            .get(name)
            .ok_or_else(|| FleetError::NoSuchSnapshot { name: name.to_string() })?;
        self.nodes[idx].as_mut().expect("by_name index must be live").comment = comment.to_string();
        Ok(())
    }

    /// Restore `out_spec` from the snapshot named `name` (§4.4). If not
    /// `destructive`, first captures an automatic pre-restore snapshot of
    /// `out_spec`'s current state.
    pub fn restore_snapshot(
        &mut self,
        name: &str,
        out_spec: &mut InstanceRecord,
        destructive: bool,
    ) -> Result<RestoreOutcome, FleetError> {
        let idx = *self
            .by_name
            .get(name)
            .ok_or_else(|| FleetError::NoSuchSnapshot { name: name.to_string() })?;

        let mut outcome = RestoreOutcome::default();

        if !destructive {
            let auto_name = format!("Before restoring {}", name);
            let auto = self.take_snapshot(out_spec, Some(&auto_name), "automatic pre-restore snapshot")?;
            outcome.auto_snapshot = Some(auto.name);
        }

        let captured = &self.nodes[idx].as_ref().unwrap().captured_spec;

        let old_targets: std::collections::HashSet<&String> = out_spec.mounts.keys().collect();
        let new_targets: std::collections::HashSet<&String> = captured.mounts.keys().collect();
        outcome.pruned_mount_targets = old_targets
            .difference(&new_targets)
            .map(|s| (*s).clone())
            .collect();
        outcome.new_mount_targets = new_targets
            .difference(&old_targets)
            .map(|s| (*s).clone())
            .collect();
        for changed in old_targets.intersection(&new_targets) {
            if out_spec.mounts.get(*changed) != captured.mounts.get(*changed) {
                outcome.pruned_mount_targets.push((*changed).clone());
                outcome.new_mount_targets.push((*changed).clone());
            }
        }

        out_spec.num_cores = captured.num_cores;
        out_spec.mem_size = captured.mem_size;
        out_spec.disk_space = captured.disk_space;
        out_spec.extra_interfaces = captured.extra_interfaces.clone();
        out_spec.ssh_username = captured.ssh_username.clone();
        out_spec.mounts = captured.mounts.clone();
        out_spec.metadata = captured.metadata.clone();

        self.invalidate_cache();
        Ok(outcome)
    }

    pub fn get_snapshot(&self, name: &str) -> Result<Snapshot, FleetError> {
        let idx = *self
            .by_name
            .get(name)
            .ok_or_else(|| FleetError::NoSuchSnapshot { name: name.to_string() })?;
        let node = self.nodes[idx].as_ref().expect("by_name index must be live");
        Ok(Snapshot {
            name: node.name.clone(),
            parent: node.parent.and_then(|p| self.nodes[p].as_ref()).map(|n| n.name.clone()),
            comment: node.comment.clone(),
            created_at: node.created_at,
            captured_spec: node.captured_spec.clone(),
        })
    }

    /// Snapshots in topological order (parents before children), cached
    /// until the next mutation (§4.4).
    pub fn view_snapshots(&self) -> Vec<Snapshot> {
        if self.topo_cache.borrow().is_none() {
            *self.topo_cache.borrow_mut() = Some(self.topological_order());
        }
        self.topo_cache
            .borrow()
            .as_ref()
            .unwrap()
            .iter()
            .map(|&idx| {
                let node = self.nodes[idx].as_ref().expect("cached index must be live");
                Snapshot {
                    name: node.name.clone(),
                    parent: node.parent.and_then(|p| self.nodes[p].as_ref()).map(|n| n.name.clone()),
                    comment: node.comment.clone(),
                    created_at: node.created_at,
                    captured_spec: node.captured_spec.clone(),
                }
            })
            .collect()
    }

    fn topological_order(&self) -> Vec<usize> {
        let mut children: HashMap<Option<usize>, Vec<usize>> = HashMap::new();
        for (idx, slot) in self.nodes.iter().enumerate() {
            if let Some(node) = slot {
                children.entry(node.parent).or_default().push(idx);
            }
        }

        let mut order = Vec::with_capacity(self.by_name.len());
        let mut queue: Vec<usize> = children.get(&None).cloned().unwrap_or_default();
        queue.sort();
        let mut i = 0;
        while i < queue.len() {
            let idx = queue[i];
            i += 1;
            order.push(idx);
            if let Some(mut kids) = children.get(&Some(idx)).cloned() {
                kids.sort();
                queue.extend(kids);
            }
        }
        order
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }
}
