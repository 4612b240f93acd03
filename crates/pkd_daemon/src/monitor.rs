//! Change detection for the configuration file and the daemon binary.

use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Remembers the content digest of a file and reports when it changes.
///
/// A missing file has no digest; appearing, disappearing and being rewritten
/// with different content all count as changes.
#[derive(Debug)]
pub struct FileMonitor {
    path: PathBuf,
    digest: Option<[u8; 32]>,
}

impl FileMonitor {
    /// Starts watching `path` from its current content.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let digest = digest_of(&path);
        debug!(path = %path.display(), present = digest.is_some(), "watching file");
        Self { path, digest }
    }

    /// The watched path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rehashes the file. Returns true if it differs from the last check.
    pub fn changed(&mut self) -> bool {
        let digest = digest_of(&self.path);
        if digest == self.digest {
            return false;
        }
        info!(path = %self.path.display(), "file changed");
        self.digest = digest;
        true
    }
}

fn digest_of(path: &Path) -> Option<[u8; 32]> {
    let bytes = fs::read(path).ok()?;
    Some(Sha256::digest(&bytes).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn detects_rewrites_and_removal() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("pkd.json");
        fs::write(&path, b"{}").unwrap();

        let mut monitor = FileMonitor::new(&path);
        assert!(!monitor.changed());

        fs::write(&path, b"{}").unwrap();
        assert!(!monitor.changed());

        fs::write(&path, br#"{"backend":"dummy"}"#).unwrap();
        assert!(monitor.changed());
        assert!(!monitor.changed());

        fs::remove_file(&path).unwrap();
        assert!(monitor.changed());
    }

    #[test]
    fn missing_file_appearing_is_a_change() {
        let temp = tempdir().unwrap();
        let mut monitor = FileMonitor::new(temp.path().join("pkd"));
        assert!(!monitor.changed());
        fs::write(monitor.path(), b"\x7fELF").unwrap();
        assert!(monitor.changed());
    }
}
