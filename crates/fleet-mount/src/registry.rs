//! Per-instance mount registry and lifecycle (§4.5).

use std::collections::HashMap;

use anyhow::Result;
use fleet_core::ProgressSink;
use tracing::instrument;

use crate::handler::MountHandler;
use crate::spec::MountSpec;
use crate::validate::validate_target_path;

/// Owns the `target_path -> MountHandler` map for one instance.
#[derive(Default)]
pub struct MountRegistry {
    handlers: HashMap<String, Box<dyn MountHandler>>,
}

impl MountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, target: impl Into<String>, handler: Box<dyn MountHandler>) -> Result<()> {
        let target = target.into();
        validate_target_path(&target).map_err(anyhow::Error::from)?;
        self.handlers.insert(target, handler);
        Ok(())
    }

    pub fn remove(&mut self, target: &str) -> Option<Box<dyn MountHandler>> {
        self.handlers.remove(target)
    }

    pub fn get(&self, target: &str) -> Option<&dyn MountHandler> {
        self.handlers.get(target).map(|h| h.as_ref())
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Activate every handler not already managed by the backend (§4.5:
    /// "on instance start").
    #[instrument(skip_all)]
    pub fn activate_all(&self, progress: &dyn ProgressSink) -> Result<()> {
        for (target, handler) in &self.handlers {
            if handler.is_managed_by_backend() {
                continue;
            }
            handler
                .activate(progress)
                .map_err(|e| anyhow::anyhow!("failed to activate mount {}: {}", target, e))?;
        }
        Ok(())
    }

    /// Deactivate every non-backend-managed handler with `force = true`
    /// (§4.5: "on instance stop or suspend").
    #[instrument(skip_all)]
    pub fn deactivate_all(&self) -> Result<()> {
        for (target, handler) in &self.handlers {
            if handler.is_managed_by_backend() {
                continue;
            }
            handler
                .deactivate(true)
                .map_err(|e| anyhow::anyhow!("failed to deactivate mount {}: {}", target, e))?;
        }
        Ok(())
    }

    /// Prune handlers whose spec no longer matches `current_specs` (spec
    /// changed or target removed); the caller is responsible for creating
    /// handlers for any genuinely new targets.
    pub fn prune_stale(&mut self, current_specs: &HashMap<String, MountSpec>) -> Vec<String> {
        let mut removed = Vec::new();
        let stale: Vec<String> = self
            .handlers
            .iter()
            .filter(|(target, handler)| match current_specs.get(*target) {
                None => true,
                Some(spec) => handler.get_mount_spec() != spec,
            })
            .map(|(target, _)| target.clone())
            .collect();
        for target in stale {
            if let Some(handler) = self.handlers.remove(&target) {
                let _ = handler.deactivate(true);
            }
            removed.push(target);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::NativeMountHandler;
    use crate::spec::MountType;
    use fleet_core::NullProgressSink;
    use std::collections::BTreeMap;

    fn spec(source: &str) -> MountSpec {
        MountSpec {
            source_path: source.to_string(),
            uid_mappings: BTreeMap::new(),
            gid_mappings: BTreeMap::new(),
            mount_type: MountType::Native,
        }
    }

    #[test]
    fn insert_rejects_protected_target() {
        let mut registry = MountRegistry::new();
        let result = registry.insert("/etc", Box::new(NativeMountHandler::new(spec("/src"))));
        assert!(result.is_err());
    }

    #[test]
    fn activate_all_skips_backend_managed_handlers() {
        let mut registry = MountRegistry::new();
        registry
            .insert("/home/ubuntu/project", Box::new(NativeMountHandler::new(spec("/src"))))
            .unwrap();
        registry.activate_all(&NullProgressSink).unwrap();
        assert!(registry.get("/home/ubuntu/project").unwrap().is_active());
    }

    #[test]
    fn prune_stale_removes_changed_and_missing_targets() {
        let mut registry = MountRegistry::new();
        registry
            .insert("/home/ubuntu/a", Box::new(NativeMountHandler::new(spec("/src-a"))))
            .unwrap();
        registry
            .insert("/home/ubuntu/b", Box::new(NativeMountHandler::new(spec("/src-b"))))
            .unwrap();

        let mut current = HashMap::new();
        current.insert("/home/ubuntu/a".to_string(), spec("/src-a"));
        // /home/ubuntu/b missing from current_specs entirely (target removed)

        let removed = registry.prune_stale(&current);
        assert_eq!(removed, vec!["/home/ubuntu/b".to_string()]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn prune_stale_removes_handler_whose_spec_changed() {
        let mut registry = MountRegistry::new();
        registry
            .insert("/home/ubuntu/a", Box::new(NativeMountHandler::new(spec("/src-a"))))
            .unwrap();

        let mut current = HashMap::new();
        current.insert("/home/ubuntu/a".to_string(), spec("/different-source"));

        let removed = registry.prune_stale(&current);
        assert_eq!(removed, vec!["/home/ubuntu/a".to_string()]);
        assert!(registry.is_empty());
    }
}
