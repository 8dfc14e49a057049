//! Archive-to-disk-image decode boundary (§4.2). The concrete codec (qcow2
//! conversion, xz/zstd extraction, ...) is out of scope per §1; this crate
//! only ships the contract and a passthrough test double.

use std::path::{Path, PathBuf};

use anyhow::Result;

pub trait ImageDecoder: Send + Sync {
    /// Decode `archive_path` into `dest_dir`, returning the path to the
    /// usable disk image. The caller deletes `archive_path` once this
    /// returns `Ok`.
    fn decode(&self, archive_path: &Path, dest_dir: &Path) -> Result<PathBuf>;
}

/// Treats the fetched bytes as already being the final image; used in
/// tests and wherever no compression/conversion is configured.
pub struct PassthroughDecoder;

impl ImageDecoder for PassthroughDecoder {
    fn decode(&self, archive_path: &Path, dest_dir: &Path) -> Result<PathBuf> {
        let file_name = archive_path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("archive path has no file name"))?;
        let dest = dest_dir.join(file_name);
        if dest != archive_path {
            std::fs::copy(archive_path, &dest)?;
        }
        Ok(dest)
    }
}
