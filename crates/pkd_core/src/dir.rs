//! Daemon state directory.
//!
//! ```text
//! <state_dir>/
//! ├─ LOCK               # Advisory lock, one daemon per directory
//! ├─ job_count.dat      # Counter used to order transaction ids
//! └─ transactions.log   # Append-only transaction ledger
//! ```

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const JOB_COUNT_FILE: &str = "job_count.dat";
const LEDGER_FILE: &str = "transactions.log";

/// The daemon's state directory, held under an exclusive lock.
///
/// Only one `StateDir` can exist per directory at a time, which also means
/// only one daemon can serve a given state directory.
#[derive(Debug)]
pub struct StateDir {
    path: PathBuf,
    _lock_file: File,
}

impl StateDir {
    /// Opens or creates a state directory and takes its lock.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (`StateLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_format(format!(
                    "state directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::StateLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the job counter file.
    #[must_use]
    pub fn job_count_path(&self) -> PathBuf {
        self.path.join(JOB_COUNT_FILE)
    }

    /// Returns the path of the transaction ledger.
    #[must_use]
    pub fn ledger_path(&self) -> PathBuf {
        self.path.join(LEDGER_FILE)
    }
}

/// Replaces `target` atomically: write a temp file, sync it, rename it over
/// the target, then sync the directory.
pub(crate) fn write_atomic(target: &Path, data: &[u8]) -> CoreResult<()> {
    let mut temp_name = target.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, target)?;

    if let Some(parent) = target.parent() {
        sync_directory(parent)?;
    }
    Ok(())
}

#[cfg(unix)]
fn sync_directory(path: &Path) -> CoreResult<()> {
    let dir = File::open(path)?;
    dir.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_path: &Path) -> CoreResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("state");
        let dir = StateDir::open(&path, true).unwrap();
        assert!(path.is_dir());
        assert!(path.join(LOCK_FILE).exists());
        assert_eq!(dir.ledger_path(), path.join(LEDGER_FILE));
    }

    #[test]
    fn open_missing_without_create_fails() {
        let temp = tempdir().unwrap();
        let result = StateDir::open(&temp.path().join("absent"), false);
        assert!(matches!(result, Err(CoreError::InvalidFormat { .. })));
    }

    #[test]
    fn second_open_is_locked() {
        let temp = tempdir().unwrap();
        let _first = StateDir::open(temp.path(), true).unwrap();
        let second = StateDir::open(temp.path(), true);
        assert!(matches!(second, Err(CoreError::StateLocked)));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        {
            let _dir = StateDir::open(temp.path(), true).unwrap();
        }
        assert!(StateDir::open(temp.path(), true).is_ok());
    }

    #[test]
    fn write_atomic_replaces_content() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("value");
        write_atomic(&target, b"1").unwrap();
        write_atomic(&target, b"22").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"22");
        assert!(!temp.path().join("value.tmp").exists());
    }
}
