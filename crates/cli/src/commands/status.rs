//! `orcasync status` and `orcasync profiles`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};

use orcasync_core::config::{BranchSource, EffectiveConfig, RawConfig};
use orcasync_core::models::RepoStatus;
use orcasync_core::SyncEngine;

use super::style;

/// Display the configuration and repository dashboard.
pub fn run_status(config_path: &Path, config: EffectiveConfig, json: bool) -> Result<()> {
    let engine = SyncEngine::new(config);
    let status = engine.status().context("failed to read repository status")?;
    let config = engine.config();

    if json {
        let doc = serde_json::json!({
            "config_file": config_path,
            "config": config,
            "repository": status,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&doc).context("failed to serialize status")?
        );
        return Ok(());
    }

    println!();
    println!("{}", style::header("OrcaSync Status"));
    println!("{}", "═".repeat(15));
    println!();

    println!("{}", config_table(config_path, config));
    println!();

    if status.exists {
        println!("{}", repository_table(&status));
    } else {
        println!(
            "  {}",
            style::dim("Repository not initialized. Run 'orcasync init' first.")
        );
    }

    if let Some(state) = &status.state {
        println!();
        println!(
            "  {}",
            style::error(&format!(
                "Unfinished {} in {}; resolve it before syncing again",
                state, status.path
            ))
        );
    }
    println!();
    Ok(())
}

fn config_table(config_path: &Path, config: &EffectiveConfig) -> Table {
    let branch_note = match config.branch_source {
        BranchSource::Explicit => "",
        BranchSource::Hostname => " (from hostname)",
    };
    let remote = if config.has_remote() {
        config.repository_url.clone()
    } else {
        "local only".to_string()
    };

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Setting", "Value"]);
    table.add_row(vec![Cell::new("Config file"), Cell::new(config_path.display())]);
    table.add_row(vec![
        Cell::new("Profile"),
        Cell::new(config.profile.as_deref().unwrap_or("(global)")),
    ]);
    table.add_row(vec![Cell::new("Platform"), Cell::new(config.platform)]);
    table.add_row(vec![Cell::new("Hostname"), Cell::new(&config.hostname)]);
    table.add_row(vec![
        Cell::new("Branch"),
        Cell::new(format!("{}{}", config.branch_name, branch_note)),
    ]);
    table.add_row(vec![Cell::new("Remote"), Cell::new(remote)]);
    table.add_row(vec![
        Cell::new("Repository"),
        Cell::new(config.repository_path.display()),
    ]);
    table.add_row(vec![
        Cell::new("Auto commit"),
        Cell::new(if config.auto_commit { "on" } else { "off" }),
    ]);
    table.add_row(vec![Cell::new("User paths"), Cell::new(path_list(&config.user_paths))]);
    table.add_row(vec![
        Cell::new("System paths"),
        Cell::new(path_list(&config.system_paths)),
    ]);
    table
}

fn repository_table(status: &RepoStatus) -> Table {
    let head = status
        .head
        .as_deref()
        .map(|h| h[..7.min(h.len())].to_string())
        .unwrap_or_else(|| "—".to_string());

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Repository", "State"]);
    table.add_row(vec![
        Cell::new("Branch"),
        Cell::new(status.branch.as_deref().unwrap_or("—")),
    ]);
    table.add_row(vec![Cell::new("HEAD"), Cell::new(head)]);
    table.add_row(vec![
        Cell::new("Upstream"),
        Cell::new(status.upstream.as_deref().unwrap_or("—")),
    ]);
    table.add_row(vec![
        Cell::new("Ahead / behind"),
        Cell::new(format!("{} / {}", status.ahead, status.behind)),
    ]);
    table.add_row(vec![
        Cell::new("Modified"),
        Cell::new(status.modified.len()),
    ]);
    table.add_row(vec![
        Cell::new("Untracked"),
        Cell::new(status.untracked.len()),
    ]);
    let conflicted = Cell::new(status.conflicted.len());
    table.add_row(vec![
        Cell::new("Conflicted"),
        if status.conflicted.is_empty() {
            conflicted
        } else {
            conflicted.fg(Color::Red)
        },
    ]);
    table
}

fn path_list(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "—".to_string();
    }
    paths
        .iter()
        .map(|p| format!("{} {}", style::presence(p.is_dir()), p.display()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// List the configured profiles, marking the default one.
pub fn run_profiles(raw: &RawConfig) {
    let profiles = raw.list_profiles();
    if profiles.is_empty() {
        println!("{}", style::dim("No profiles defined; global settings are used."));
        return;
    }
    let default = raw.default_profile.as_deref();
    for name in profiles {
        if Some(name) == default {
            println!("* {} {}", style::header(name), style::dim("(default)"));
        } else {
            println!("  {}", name);
        }
    }
}
