//! `MountHandler` capability set (§4.5): activate/deactivate a single
//! target-path share, polymorphic over Classic (an out-of-band bridge
//! process) versus Native (backend-managed) shares.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use fleet_core::ProgressSink;
use tokio::process::Command;

use crate::spec::MountSpec;

pub trait MountHandler: Send + Sync {
    fn activate(&self, progress: &dyn ProgressSink) -> Result<()>;
    fn deactivate(&self, force: bool) -> Result<()>;
    fn is_active(&self) -> bool;
    fn is_managed_by_backend(&self) -> bool;
    fn get_mount_spec(&self) -> &MountSpec;
}

/// An out-of-band protocol bridge spawned in the instance. The concrete
/// bridge protocol is out of scope (§1); this wraps a caller-supplied
/// command (typically an sshfs-style mount helper) and tracks whether the
/// spawned process is still alive.
pub struct ClassicMountHandler {
    spec: MountSpec,
    target: String,
    bridge_command: Vec<String>,
    active: AtomicBool,
    child: std::sync::Mutex<Option<tokio::process::Child>>,
}

impl ClassicMountHandler {
    pub fn new(target: impl Into<String>, spec: MountSpec, bridge_command: Vec<String>) -> Self {
        ClassicMountHandler {
            spec,
            target: target.into(),
            bridge_command,
            active: AtomicBool::new(false),
            child: std::sync::Mutex::new(None),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl MountHandler for ClassicMountHandler {
    fn activate(&self, progress: &dyn ProgressSink) -> Result<()> {
        if self.bridge_command.is_empty() {
            anyhow::bail!("classic mount handler for {} has no bridge command configured", self.target);
        }
        progress.on_progress(&format!("Mounting {} -> {}", self.spec.source_path, self.target));
        let mut cmd = Command::new(&self.bridge_command[0]);
        cmd.args(&self.bridge_command[1..]);
        cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
        let child = cmd.spawn()?;
        *self.child.lock().unwrap() = Some(child);
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn deactivate(&self, force: bool) -> Result<()> {
        let mut guard = self.child.lock().unwrap();
        if let Some(mut child) = guard.take() {
            if force {
                let _ = child.start_kill();
            }
        }
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn is_managed_by_backend(&self) -> bool {
        false
    }

    fn get_mount_spec(&self) -> &MountSpec {
        &self.spec
    }
}

/// A backend-managed share: the `VMFactory` backend sets it up as part of
/// VM start, so `activate`/`deactivate` here are no-ops that just track
/// the logical state for the registry's bookkeeping.
pub struct NativeMountHandler {
    spec: MountSpec,
    active: AtomicBool,
}

impl NativeMountHandler {
    pub fn new(spec: MountSpec) -> Self {
        NativeMountHandler {
            spec,
            active: AtomicBool::new(false),
        }
    }
}

impl MountHandler for NativeMountHandler {
    fn activate(&self, progress: &dyn ProgressSink) -> Result<()> {
        progress.on_progress("Native share managed by backend");
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn deactivate(&self, _force: bool) -> Result<()> {
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn is_managed_by_backend(&self) -> bool {
        true
    }

    fn get_mount_spec(&self) -> &MountSpec {
        &self.spec
    }
}
