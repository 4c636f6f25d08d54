//! `orcasync push`, `pull` and `sync`.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};

use orcasync_core::config::EffectiveConfig;
use orcasync_core::models::{PullOutcome, SyncOperation, SyncOutcome, SyncResult};
use orcasync_core::{SyncEngine, SyncWorker, WorkerEvent};

use super::style;

/// Run one operation on the background worker, showing a spinner until it
/// finishes.
pub async fn run_operation(
    config: EffectiveConfig,
    operation: SyncOperation,
    message: Option<String>,
) -> Result<ExitCode> {
    let repo_path = config.repository_path.clone();
    let worker = SyncWorker::new();
    let mut rx = worker.spawn(SyncEngine::new(config), operation, message)?;

    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
        spinner.set_style(
            template.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
    }
    spinner.set_message(format!("Running {}...", operation));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let mut finished = None;
    while let Some(event) = rx.recv().await {
        match event {
            WorkerEvent::Progress(stage) => spinner.set_message(format!("{}...", stage)),
            WorkerEvent::Finished(result) => finished = Some(result),
        }
    }
    spinner.finish_and_clear();

    let Some(result) = finished else {
        bail!("{} ended without reporting a result", operation);
    };
    Ok(report(&result, &repo_path))
}

fn report(result: &SyncResult, repo_path: &std::path::Path) -> ExitCode {
    for warning in &result.warnings {
        println!("{}", style::warn(warning));
    }

    match &result.outcome {
        SyncOutcome::NoOp => {
            println!("{}", style::success("Already in sync"));
            ExitCode::SUCCESS
        }
        SyncOutcome::Success => {
            println!(
                "{}",
                style::success(&format!("{} complete", capitalize(&result.operation.to_string())))
            );
            println!(
                "  Files      {} added, {} changed, {} removed",
                result.files_added, result.files_changed, result.files_removed
            );
            if let Some(commit) = &result.commit {
                println!("  Commit     {}", &commit[..7.min(commit.len())]);
            }
            if let Some(pull) = &result.pull {
                println!("  Pulled     {}", describe_pull(pull));
            }
            if result.pushed {
                println!("  Pushed     yes");
            }
            ExitCode::SUCCESS
        }
        SyncOutcome::Conflict { files } => {
            println!("{}", style::error("Remote changes conflict with local edits"));
            for file in files {
                println!("    {}", file);
            }
            println!();
            println!(
                "  {}",
                style::dim(&format!(
                    "Resolve the files in {} and commit, or run `git merge --abort` there.",
                    repo_path.display()
                ))
            );
            println!(
                "  {}",
                style::dim("Your profile folders were left untouched.")
            );
            ExitCode::FAILURE
        }
        SyncOutcome::Failed { kind, message } => {
            println!("{}", style::error(&format!("{} failed ({})", result.operation, kind)));
            println!("  {}", message);
            ExitCode::FAILURE
        }
    }
}

fn describe_pull(pull: &PullOutcome) -> String {
    match pull {
        PullOutcome::NoRemoteBranch => "remote branch does not exist yet".to_string(),
        PullOutcome::UpToDate => "up to date".to_string(),
        PullOutcome::FastForward { files } => format!("fast-forward, {} files", files.len()),
        PullOutcome::Rebased { files } => format!("rebased onto remote, {} files", files.len()),
        PullOutcome::Merged { files } => format!("merged, {} files", files.len()),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("sync"), "Sync");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn test_describe_pull() {
        assert_eq!(describe_pull(&PullOutcome::UpToDate), "up to date");
        let pull = PullOutcome::Rebased {
            files: vec!["profiles/user/a.json".into()],
        };
        assert_eq!(describe_pull(&pull), "rebased onto remote, 1 files");
    }
}
