use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const PREFIX: &str = "idle-update.";

/// Scratch directory owned by a single run.
///
/// The directory is removed when the value is dropped, so every return path
/// out of the update flow cleans it up.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a uniquely named directory under `root`, or the system temp dir
    pub fn create(root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(PREFIX);

        let dir = match root {
            Some(root) => builder
                .tempdir_in(root)
                .with_context(|| format!("Failed to create working directory in {}", root.display()))?,
            None => builder
                .tempdir()
                .context("Failed to create working directory")?,
        };

        log::debug!("Working directory: {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn expand_dir(&self) -> PathBuf {
        self.path().join("expanded")
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.path().join("backup")
    }

    /// Remove the directory now, reporting failures instead of ignoring them
    pub fn close(self) -> Result<()> {
        let path = self.path().to_path_buf();
        self.dir
            .close()
            .with_context(|| format!("Failed to remove {}", path.display()))
    }
}
