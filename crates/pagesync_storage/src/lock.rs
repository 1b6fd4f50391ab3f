//! Cross-process exclusion for a space directory.

use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Name of the advisory lock file inside a space directory.
pub const LOCK_FILE: &str = ".lock";

/// Exclusive advisory lock on one space.
///
/// Only one `SpaceLock` can exist per space directory across processes. The
/// lock is released when the value is dropped.
#[derive(Debug)]
pub struct SpaceLock {
    path: PathBuf,
    _file: File,
}

impl SpaceLock {
    /// Acquires the lock without blocking, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::SpaceLocked`] if another holder exists.
    pub fn acquire(space_dir: &Path, space_key: &str) -> StorageResult<Self> {
        fs::create_dir_all(space_dir)?;
        let path = space_dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(StorageError::SpaceLocked {
                space: space_key.to_string(),
            });
        }

        Ok(Self { path, _file: file })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_holder_is_rejected() {
        let dir = tempdir().unwrap();
        let space = dir.path().join("DEV");

        let first = SpaceLock::acquire(&space, "DEV").unwrap();
        assert!(first.path().ends_with(".lock"));

        let err = SpaceLock::acquire(&space, "DEV").unwrap_err();
        assert!(matches!(err, StorageError::SpaceLocked { .. }));

        drop(first);
        assert!(SpaceLock::acquire(&space, "DEV").is_ok());
    }

    #[test]
    fn spaces_lock_independently() {
        let dir = tempdir().unwrap();
        let _dev = SpaceLock::acquire(&dir.path().join("DEV"), "DEV").unwrap();
        assert!(SpaceLock::acquire(&dir.path().join("OPS"), "OPS").is_ok());
    }
}
