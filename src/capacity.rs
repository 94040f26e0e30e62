//! Free-storage check backing the write throttle.

use std::io;
use std::path::Path;

use tracing::warn;

/// Filesystem probe seam so the throttle is testable without a full disk.
pub trait CapacityProbe: Send + Sync {
    /// Available bytes on the filesystem backing `path`.
    fn available_bytes(&self, path: &Path) -> io::Result<u64>;
}

/// Probe backed by the real filesystem.
pub struct FsCapacityProbe;

impl CapacityProbe for FsCapacityProbe {
    fn available_bytes(&self, path: &Path) -> io::Result<u64> {
        fs2::available_space(path)
    }
}

/// Whether `path`'s filesystem has strictly more than `threshold_bytes`
/// available. Probe errors fail closed: the answer is "no capacity".
pub fn has_capacity(probe: &dyn CapacityProbe, path: &Path, threshold_bytes: u64) -> bool {
    match probe.available_bytes(path) {
        Ok(available) => available > threshold_bytes,
        Err(e) => {
            warn!("capacity probe failed for {:?}: {}", path, e);
            false
        }
    }
}
