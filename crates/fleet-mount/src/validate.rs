//! Target path validation (§4.5): reject mounts over protected system
//! directories using a prefix-based traversal guard.

use std::path::{Component, Path};

use fleet_core::FleetError;

const PROTECTED_ROOTS: &[&str] = &["/", "/etc", "/boot", "/proc", "/sys", "/dev"];

/// Reject a target path that resolves (lexically — no filesystem access
/// here, the guest filesystem isn't ours to stat) outside allowed roots,
/// or that is itself one of the protected system directories.
pub fn validate_target_path(target: &str) -> Result<(), FleetError> {
    if !target.starts_with('/') {
        return Err(FleetError::InvalidSetting {
            message: format!("mount target '{}' must be an absolute path", target),
        });
    }

    let normalized = normalize(target);

    if PROTECTED_ROOTS.contains(&normalized.as_str()) {
        return Err(FleetError::InvalidSetting {
            message: format!("mount target '{}' resolves to a protected system directory", target),
        });
    }

    for root in PROTECTED_ROOTS {
        if *root == "/" {
            continue;
        }
        if normalized == *root || normalized.starts_with(&format!("{}/", root)) {
            return Err(FleetError::InvalidSetting {
                message: format!("mount target '{}' is inside protected directory '{}'", target, root),
            });
        }
    }

    Ok(())
}

/// Lexically resolve `.`/`..` components without touching the filesystem
/// (the guest path doesn't exist on the host to canonicalize).
fn normalize(path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(seg) => stack.push(seg.to_str().unwrap_or("")),
            Component::ParentDir => {
                stack.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    if stack.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", stack.join("/"))
    }
}
