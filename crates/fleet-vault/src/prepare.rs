//! Post-decode image preparation (§4.2): resize, seed cloud-init NoCloud
//! metadata, etc. The concrete backend logic is out of scope per §1; this
//! crate only ships the contract and a no-op test double.

use std::path::{Path, PathBuf};

use anyhow::Result;

pub trait PrepareAction: Send + Sync {
    /// Prepare the decoded image at `image_path` for first boot, writing
    /// any side files into `dest_dir`. Returns the final image path (which
    /// may differ from `image_path`, e.g. after an in-place resize produces
    /// a new file).
    fn prepare(&self, image_path: &Path, dest_dir: &Path) -> Result<PathBuf>;
}

/// Leaves the image untouched; used in tests and wherever no backend-side
/// preparation is configured.
pub struct NullPrepareAction;

impl PrepareAction for NullPrepareAction {
    fn prepare(&self, image_path: &Path, _dest_dir: &Path) -> Result<PathBuf> {
        Ok(image_path.to_path_buf())
    }
}
