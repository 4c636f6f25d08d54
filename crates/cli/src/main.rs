//! OrcaSync command-line tool.
//!
//! Thin front end over `orcasync-core`: resolves the configuration, hands
//! operations to the sync engine and renders the results.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use orcasync_core::config::{self, EffectiveConfig, HostContext, RawConfig};
use orcasync_core::models::SyncOperation;
use orcasync_core::PlatformKind;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Keep OrcaSlicer profiles in sync across machines through Git.
#[derive(Parser, Debug)]
#[command(name = "orcasync", version, about = "Sync OrcaSlicer profiles through a Git repository")]
struct Cli {
    /// Path to the configuration file (TOML or YAML).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Profile to use instead of the configured default.
    #[arg(short, long, global = true)]
    profile: Option<String>,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a starting configuration and prepare the local repository.
    Init {
        /// Remote repository URL. Leave empty for a local-only setup.
        #[arg(long)]
        repository_url: Option<String>,

        /// Overwrite an existing configuration without asking.
        #[arg(short, long)]
        yes: bool,
    },

    /// Commit local profiles and push them.
    Push {
        /// Commit message, replacing the configured template.
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Pull remote changes and restore them into the profile folders.
    Pull,

    /// Commit, pull, restore and push in one go.
    Sync {
        /// Commit message, replacing the configured template.
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Show the effective configuration and repository state.
    Status {
        /// Print machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the configuration file in use.
    ConfigPath,

    /// List the profiles defined in the configuration.
    Profiles,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_target(false)
        .without_time()
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let host = HostContext::detect();
    let config_path = match &cli.config {
        Some(path) => config::expand_tilde(path, &host.home),
        None => {
            let cwd = std::env::current_dir().context("failed to read current directory")?;
            config::find_config_file(&cwd, &host.home)
        }
    };
    debug!(path = %config_path.display(), "using configuration file");
    let profile = cli.profile.as_deref();

    match cli.command {
        Commands::Init {
            repository_url,
            yes,
        } => {
            commands::init::run_init(&config_path, profile, &host, repository_url.as_deref(), yes)
        }
        Commands::Push { message } => {
            let config = load_config(&config_path, profile, &host)?;
            commands::sync::run_operation(config, SyncOperation::Push, message).await
        }
        Commands::Pull => {
            let config = load_config(&config_path, profile, &host)?;
            commands::sync::run_operation(config, SyncOperation::Pull, None).await
        }
        Commands::Sync { message } => {
            let config = load_config(&config_path, profile, &host)?;
            commands::sync::run_operation(config, SyncOperation::Sync, message).await
        }
        Commands::Status { json } => {
            let config = load_config(&config_path, profile, &host)?;
            commands::status::run_status(&config_path, config, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::ConfigPath => {
            println!("{}", config_path.display());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Profiles => {
            let raw = RawConfig::load_from_file(&config_path)
                .context("failed to load configuration file")?;
            commands::status::run_profiles(&raw);
            Ok(ExitCode::SUCCESS)
        }
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(
    path: &std::path::Path,
    profile: Option<&str>,
    host: &HostContext,
) -> Result<EffectiveConfig> {
    let raw = RawConfig::load_from_file(path).with_context(|| {
        format!(
            "failed to load configuration file (run `orcasync init` to create {})",
            path.display()
        )
    })?;
    config::resolve(&raw, profile, PlatformKind::current(), host)
        .context("failed to resolve configuration")
}
