use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::Path;

/// Exclusive OS-level lock that keeps two update runs from overlapping.
/// Released when dropped; the lock file itself is left in place.
#[derive(Debug)]
pub struct RunLock {
    _file: File,
}

impl RunLock {
    /// Try to take the lock without waiting. `Ok(None)` means another run holds it.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open lock file {}", path.display()))?;

        let acquired = file
            .try_lock_exclusive()
            .with_context(|| format!("Failed to lock {}", path.display()))?;

        if !acquired {
            return Ok(None);
        }

        log::debug!("Acquired run lock {}", path.display());
        Ok(Some(Self { _file: file }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_second_acquire_is_refused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.lock");

        let first = RunLock::try_acquire(&path).unwrap();
        assert!(first.is_some());
        assert!(RunLock::try_acquire(&path).unwrap().is_none());

        drop(first);
        assert!(RunLock::try_acquire(&path).unwrap().is_some());
    }

    #[test]
    fn test_creates_parent_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("locks").join("run.lock");
        let lock = RunLock::try_acquire(&path).unwrap();
        assert!(lock.is_some());
        assert!(path.exists());
    }
}
