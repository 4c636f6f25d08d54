//! `orcasync init`: write a starting configuration and prepare the local
//! repository.

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};

use orcasync_core::config::{self, HostContext, RawConfig};
use orcasync_core::platform::{self, SearchRoots};
use orcasync_core::{PlatformKind, SyncEngine};

use super::style;

/// Run init against `config_path`.
///
/// An existing configuration is kept unless the user agrees to replace it
/// (or passed `--yes`). Either way the repository is then prepared.
pub fn run_init(
    config_path: &Path,
    profile: Option<&str>,
    host: &HostContext,
    repository_url: Option<&str>,
    assume_yes: bool,
) -> Result<ExitCode> {
    let current = PlatformKind::current();

    println!();
    println!("{}", style::header("OrcaSync Setup"));
    println!("{}", "═".repeat(14));
    println!();

    let write_config = if config_path.exists() && !assume_yes {
        Confirm::new()
            .with_prompt(format!("{} already exists. Overwrite?", config_path.display()))
            .default(false)
            .interact()
            .context("failed to read confirmation")?
    } else {
        true
    };

    if write_config {
        let discovered = platform::discover_profile_dirs(current, &SearchRoots::from_env());
        if discovered.is_empty() {
            println!(
                "  {}",
                style::warn("No OrcaSlicer profile folders found; using the default locations")
            );
        }
        for dir in &discovered.user {
            println!("  {}", style::success(&format!("User profiles     {}", dir.display())));
        }
        for dir in &discovered.system {
            println!("  {}", style::dim(&format!("System profiles   {}", dir.display())));
        }

        let raw = RawConfig::default_template(
            &host.home,
            current,
            &discovered,
            repository_url.unwrap_or_default(),
        );
        raw.save(config_path)
            .with_context(|| format!("failed to write {}", config_path.display()))?;
        println!(
            "  {}",
            style::success(&format!("Configuration     {}", config_path.display()))
        );
    } else {
        if repository_url.is_some() {
            println!(
                "  {}",
                style::warn("Existing file kept; --repository-url was not applied")
            );
        }
        println!(
            "  {}",
            style::dim(&format!("Keeping existing configuration {}", config_path.display()))
        );
    }

    let raw = RawConfig::load_from_file(config_path).context("failed to load configuration file")?;
    let effective = config::resolve(&raw, profile, current, host)
        .context("failed to resolve configuration")?;

    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
        spinner.set_style(template);
    }
    spinner.set_message("Preparing repository...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let mut engine = SyncEngine::new(effective);
    let prepared = engine.prepare();
    spinner.finish_and_clear();
    prepared.context("failed to prepare the local repository")?;

    let config = engine.config();
    println!(
        "  {}",
        style::success(&format!("Repository        {}", config.repository_path.display()))
    );
    println!(
        "  {}",
        style::success(&format!("Branch            {}", config.branch_name))
    );
    if !config.has_remote() {
        println!(
            "  {}",
            style::warn("No repository_url set; push and pull will stay local")
        );
    }
    println!();
    println!("Next: run 'orcasync sync' to share your profiles");
    println!();

    Ok(ExitCode::SUCCESS)
}
