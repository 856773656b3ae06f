use anyhow::{Context, Result};
use colored::Colorize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::package::{find_bundle, Artifact, ArtifactKind};
use super::workspace::Workspace;
use crate::config::{AppConfig, Config, Reopen};
use crate::host::Host;

/// Copy `src` to `dst` recursively, keeping symlinks as links and carrying
/// permissions over. `dst` must not exist yet.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    let mut dirs = Vec::new();

    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.with_context(|| format!("Failed to walk {}", src.display()))?;
        let rel = entry.path().strip_prefix(src)?;
        let target = if rel.as_os_str().is_empty() {
            dst.to_path_buf()
        } else {
            dst.join(rel)
        };
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(&link, &target)
                .with_context(|| format!("Failed to link {}", target.display()))?;
            #[cfg(not(unix))]
            {
                let _ = link;
                fs::copy(entry.path(), &target)
                    .with_context(|| format!("Failed to copy {}", target.display()))?;
            }
        } else if file_type.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create {}", target.display()))?;
            dirs.push((target, entry.metadata()?.permissions()));
        } else {
            fs::copy(entry.path(), &target)
                .with_context(|| format!("Failed to copy {}", target.display()))?;
        }
    }

    // read-only directories would block the copy above, so apply them last
    for (dir, perms) in dirs.into_iter().rev() {
        fs::set_permissions(&dir, perms)?;
    }

    Ok(())
}

fn remove_path(path: &Path) -> Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).with_context(|| format!("Failed to inspect {}", path.display())),
    };

    let removed = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    removed.with_context(|| format!("Failed to remove {}", path.display()))
}

fn is_present(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Full copy of the installed application, kept until the install outcome is known
#[derive(Debug)]
pub struct Backup {
    path: PathBuf,
}

impl Backup {
    /// Snapshot `app_path` into `dest`. `Ok(None)` when nothing is installed.
    pub fn snapshot(app_path: &Path, dest: &Path) -> Result<Option<Self>> {
        if !is_present(app_path) {
            log::warn!(
                "No existing installation at {}; installing without a backup",
                app_path.display()
            );
            return Ok(None);
        }

        copy_tree(app_path, dest)
            .with_context(|| format!("Failed to back up {}", app_path.display()))?;
        log::info!("Backed up {} to {}", app_path.display(), dest.display());
        Ok(Some(Self {
            path: dest.to_path_buf(),
        }))
    }

    /// Replace whatever is at `app_path` with the snapshot
    pub fn restore(&self, app_path: &Path) -> Result<()> {
        remove_path(app_path)?;
        copy_tree(&self.path, app_path)
            .with_context(|| format!("Failed to restore {}", app_path.display()))
    }

    pub fn discard(self) -> Result<()> {
        remove_path(&self.path)
    }
}

/// Install the artifact with rollback, then reopen the application.
///
/// The application is quit first if it is running. It is relaunched in the
/// console user's session only when a usable bundle remains: the new one, the
/// restored old one, or an untouched one when the backup step failed. The
/// install error, if any, is returned after that.
pub fn apply(artifact: &Artifact, workspace: &Workspace, config: &Config, host: &dyn Host) -> Result<()> {
    let app = &config.app;

    let was_running = host.is_running(&app.name);
    if was_running {
        println!("Quitting {}...", app.name);
        if let Err(e) = host.quit(&app.name) {
            log::warn!("Failed to quit {}: {:#}", app.name, e);
        }
    }

    let attempt = install_with_rollback(artifact, workspace, config, host);

    if attempt.usable && is_present(&app.path) {
        relaunch(config, host, was_running);
    } else {
        log::warn!(
            "{} is missing or incomplete; not relaunching",
            app.path.display()
        );
    }

    attempt.result
}

/// Result of an install attempt plus whether the bundle left behind can be launched
struct Attempt {
    result: Result<()>,
    usable: bool,
}

impl Attempt {
    fn usable(result: Result<()>) -> Self {
        Self { result, usable: true }
    }

    fn broken(err: anyhow::Error) -> Self {
        Self {
            result: Err(err),
            usable: false,
        }
    }
}

fn install_with_rollback(
    artifact: &Artifact,
    workspace: &Workspace,
    config: &Config,
    host: &dyn Host,
) -> Attempt {
    let app_path = &config.app.path;

    // nothing has been touched yet if the snapshot fails
    let backup = match Backup::snapshot(app_path, &workspace.backup_dir()) {
        Ok(backup) => backup,
        Err(e) => return Attempt::usable(Err(e)),
    };

    println!("{}", "Installing...".cyan());
    let err = match install(artifact, config, host) {
        Ok(()) => {
            if let Some(backup) = backup {
                if let Err(e) = backup.discard() {
                    log::warn!("Failed to discard backup: {:#}", e);
                }
            }
            return Attempt::usable(Ok(()));
        }
        Err(err) => err,
    };

    match backup {
        Some(backup) => {
            eprintln!(
                "{} Install failed, restoring previous installation...",
                "⚠".yellow()
            );
            if let Err(restore_err) = backup.restore(app_path) {
                log::error!("Restore failed: {:#}", restore_err);
                return Attempt::broken(restore_err.context(format!(
                    "Install failed ({:#}) and restoring {} also failed",
                    err,
                    app_path.display()
                )));
            }
            Attempt::usable(Err(err.context(format!(
                "Install failed; restored previous {}",
                app_path.display()
            ))))
        }
        None => {
            log::error!(
                "Install failed with no backup; {} may be missing or incomplete",
                app_path.display()
            );
            Attempt::broken(err.context(format!(
                "Install failed and no backup was available; {} may be missing or incomplete",
                app_path.display()
            )))
        }
    }
}

fn install(artifact: &Artifact, config: &Config, host: &dyn Host) -> Result<()> {
    match artifact.kind {
        ArtifactKind::Pkg => host
            .install_package(&artifact.path, &config.install.target)
            .with_context(|| format!("Installer failed for {}", artifact.path.display())),
        ArtifactKind::TarGz | ArtifactKind::Zip => replace_bundle(artifact, &config.app),
    }
}

/// Swap the installed bundle for the one shipped in the expanded archive
fn replace_bundle(artifact: &Artifact, app: &AppConfig) -> Result<()> {
    let bundle = find_bundle(&artifact.expanded, app.bundle_name()?)?;

    remove_path(&app.path)?;
    if let Some(parent) = app.path.parent() {
        fs::create_dir_all(parent)?;
    }

    copy_tree(&bundle, &app.path).context("Failed to install bundle")
}

fn relaunch(config: &Config, host: &dyn Host, was_running: bool) {
    if config.install.reopen == Reopen::WhenRunning && !was_running {
        log::info!("{} was not running; not relaunching", config.app.name);
        return;
    }

    let uid = match host.console_uid() {
        Ok(0) => {
            log::warn!("No user logged in at the console; not relaunching");
            return;
        }
        Ok(uid) => uid,
        Err(e) => {
            log::warn!("Failed to resolve console user: {:#}", e);
            return;
        }
    };

    println!("Relaunching {}...", config.app.name);
    if let Err(e) = host.launch_as(uid, &config.app.path) {
        log::warn!("Failed to relaunch {}: {:#}", config.app.name, e);
    }
}
