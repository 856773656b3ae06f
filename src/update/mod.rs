pub mod download;
pub mod idle;
pub mod install;
pub mod lock;
pub mod package;
pub mod version;
pub mod workspace;

use anyhow::Result;
use colored::Colorize;

use crate::config::Config;
use crate::host::Host;
use idle::{IdleGate, IdleOutcome};
use lock::RunLock;
use package::Artifact;
use version::Version;
use workspace::Workspace;

pub use version::parse_version;

/// How a run ended without error. Every variant maps to exit code 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Another run holds the lock; nothing was done
    AlreadyRunning,
    UpToDate {
        installed: Option<Version>,
        available: Version,
    },
    /// The user never went idle within the polling budget
    Deferred { ticks: u32 },
    Updated {
        from: Option<Version>,
        to: Version,
    },
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Install right away instead of waiting for the user to go idle
    pub skip_idle_wait: bool,
}

#[derive(Debug, Clone)]
pub struct CheckReport {
    pub installed: Option<Version>,
    pub available: Version,
    pub needs_update: bool,
}

fn display_installed(installed: Option<&Version>) -> String {
    installed
        .map(Version::to_string)
        .unwrap_or_else(|| "not installed".to_string())
}

/// Download and expand the artifact, then compare it with the installed version
fn prepare(config: &Config, host: &dyn Host, workspace: &Workspace) -> Result<(Artifact, CheckReport)> {
    println!("Downloading {}...", config.source.url);
    let artifact_path = download::fetch(&config.source, workspace.path())?;

    let artifact = package::expand(&artifact_path, &workspace.expand_dir(), host)?;
    let available = package::discover_version(&artifact, &config.package)?;
    let installed = version::installed_version(&config.app, host);
    let needs_update = version::needs_update(installed.as_ref(), &available);

    log::info!(
        "Installed: {}, available: {}",
        display_installed(installed.as_ref()),
        available
    );

    Ok((
        artifact,
        CheckReport {
            installed,
            available,
            needs_update,
        },
    ))
}

/// Report installed and available versions without changing anything
pub fn check(config: &Config, host: &dyn Host) -> Result<CheckReport> {
    let workspace = Workspace::create(config.work_root.as_deref())?;
    let (_, report) = prepare(config, host, &workspace)?;
    workspace.close()?;
    Ok(report)
}

/// One full unattended update: fetch, compare, wait for idle, install with rollback.
///
/// The working directory lives for exactly this call and is removed on every
/// return path, including errors.
pub fn run(config: &Config, host: &dyn Host, options: &RunOptions) -> Result<Outcome> {
    let Some(_lock) = RunLock::try_acquire(&config.lock_file)? else {
        log::warn!(
            "Another update run holds {}; exiting",
            config.lock_file.display()
        );
        return Ok(Outcome::AlreadyRunning);
    };

    let workspace = Workspace::create(config.work_root.as_deref())?;
    let (artifact, report) = prepare(config, host, &workspace)?;

    if !report.needs_update {
        println!(
            "{} Already up to date ({})",
            "✓".green(),
            display_installed(report.installed.as_ref())
        );
        return Ok(Outcome::UpToDate {
            installed: report.installed,
            available: report.available,
        });
    }

    println!(
        "{} Update available: {} → {}",
        "↑".yellow(),
        display_installed(report.installed.as_ref()).dimmed(),
        report.available.to_string().green()
    );

    if options.skip_idle_wait {
        log::info!("Skipping idle wait");
    } else {
        println!(
            "Waiting for {}s of user inactivity...",
            config.idle.threshold_secs
        );
        match IdleGate::new(&config.idle).wait(host) {
            IdleOutcome::ThresholdMet { idle_secs, .. } => {
                log::info!("User idle for {}s", idle_secs);
            }
            IdleOutcome::TimedOut { ticks } => {
                println!(
                    "{} User stayed active; deferring update to the next run",
                    "→".yellow()
                );
                return Ok(Outcome::Deferred { ticks });
            }
        }
    }

    install::apply(&artifact, &workspace, config, host)?;
    workspace.close()?;

    println!(
        "\n{} Updated to version {}",
        "✓".green(),
        report.available.to_string().green()
    );

    Ok(Outcome::Updated {
        from: report.installed,
        to: report.available,
    })
}
