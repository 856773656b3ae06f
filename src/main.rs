use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;

use idle_update::host::Host;
use idle_update::{Config, Outcome, RunOptions, SystemHost};

#[derive(Parser, Debug)]
#[command(name = "idle-update")]
#[command(about = "Update an application once the user has gone idle", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Config file (defaults to ~/.config/idle-update/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download, wait for idle and install (default)
    Run {
        /// Install immediately instead of waiting for the user to go idle
        #[arg(long)]
        no_wait: bool,
    },

    /// Compare installed and available versions without installing
    Check,

    /// Print the current idle time in seconds
    Idle,
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_secs()
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run_cli(cli, &SystemHost::new()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "✗".red(), e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli(cli: Cli, host: &dyn Host) -> Result<()> {
    let config_path = cli.config.as_deref();

    // `idle` only reads the host, so a broken config must not stop it
    match cli.command.unwrap_or(Command::Run { no_wait: false }) {
        Command::Run { no_wait } => run_update_command(&Config::load(config_path)?, host, no_wait),
        Command::Check => run_check_command(&Config::load(config_path)?, host),
        Command::Idle => run_idle_command(host),
    }
}

fn run_update_command(config: &Config, host: &dyn Host, no_wait: bool) -> Result<()> {
    let options = RunOptions {
        skip_idle_wait: no_wait,
    };

    match idle_update::run(config, host, &options)? {
        Outcome::AlreadyRunning => {
            println!("{}", "Another update is already running".dimmed());
        }
        Outcome::Deferred { ticks } => {
            log::info!("Deferred after {} idle checks", ticks);
        }
        Outcome::UpToDate { .. } | Outcome::Updated { .. } => {}
    }

    Ok(())
}

fn run_check_command(config: &Config, host: &dyn Host) -> Result<()> {
    let report = idle_update::check(config, host)?;
    let installed = report
        .installed
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "not installed".to_string());

    if report.needs_update {
        println!(
            "{} New version available: {} → {}",
            "↑".yellow(),
            installed.dimmed(),
            report.available.to_string().green()
        );
        println!("  Run `idle-update run` to install");
    } else {
        println!(
            "{} {} is up to date ({})",
            "✓".green(),
            config.app.name,
            installed
        );
    }

    Ok(())
}

fn run_idle_command(host: &dyn Host) -> Result<()> {
    println!("{}", host.idle_seconds()?);
    Ok(())
}
