//! Domain model types shared by the sync engine, the worker and the CLI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{ErrorKind, SyncError};
use crate::mirror::MirrorReport;

// ---------------------------------------------------------------------------
// Operations and progress
// ---------------------------------------------------------------------------

/// A user-level sync operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Push,
    Pull,
    Sync,
}

impl std::fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Push => write!(f, "push"),
            Self::Pull => write!(f, "pull"),
            Self::Sync => write!(f, "sync"),
        }
    }
}

/// Progress stages reported while an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    PreparingRepository,
    MirroringIn,
    Committing,
    Pulling,
    MirroringOut,
    Pushing,
}

impl std::fmt::Display for SyncStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PreparingRepository => write!(f, "preparing repository"),
            Self::MirroringIn => write!(f, "collecting local profiles"),
            Self::Committing => write!(f, "committing"),
            Self::Pulling => write!(f, "pulling remote changes"),
            Self::MirroringOut => write!(f, "restoring profiles"),
            Self::Pushing => write!(f, "pushing"),
        }
    }
}

// ---------------------------------------------------------------------------
// Pull
// ---------------------------------------------------------------------------

/// How remote changes were integrated by a pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PullOutcome {
    /// The remote has no branch of this name yet.
    NoRemoteBranch,
    UpToDate,
    /// Local was strictly behind and was moved forward.
    FastForward { files: Vec<String> },
    /// Local commits were replayed on top of the remote branch.
    Rebased { files: Vec<String> },
    /// Rebase conflicted and a merge commit integrated the histories.
    Merged { files: Vec<String> },
}

impl PullOutcome {
    /// Repository paths changed by the pull.
    pub fn changed_files(&self) -> &[String] {
        match self {
            Self::FastForward { files } | Self::Rebased { files } | Self::Merged { files } => files,
            Self::NoRemoteBranch | Self::UpToDate => &[],
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Final disposition of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum SyncOutcome {
    Success,
    /// Nothing needed to change.
    NoOp,
    Conflict { files: Vec<String> },
    Failed { kind: ErrorKind, message: String },
}

/// Summary of a completed (or failed) operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    pub operation: SyncOperation,
    pub outcome: SyncOutcome,
    /// Files added, changed and removed across all mirror passes.
    pub files_added: usize,
    pub files_changed: usize,
    pub files_removed: usize,
    /// Commit created by this operation, if any.
    pub commit: Option<String>,
    pub pushed: bool,
    pub pull: Option<PullOutcome>,
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl SyncResult {
    pub fn new(operation: SyncOperation) -> Self {
        let now = Utc::now();
        Self {
            operation,
            outcome: SyncOutcome::NoOp,
            files_added: 0,
            files_changed: 0,
            files_removed: 0,
            commit: None,
            pushed: false,
            pull: None,
            warnings: Vec::new(),
            started_at: now,
            completed_at: now,
        }
    }

    /// Fold a mirror report into the counters.
    pub fn record_mirror(&mut self, report: &MirrorReport) {
        self.files_added += report.added.len();
        self.files_changed += report.changed.len();
        self.files_removed += report.removed.len();
        self.warnings
            .extend(report.warnings.iter().map(|w| w.to_string()));
        self.warnings.extend(report.collisions.iter().map(|c| {
            format!(
                "{} exists in several directories; used {}",
                c.relative.display(),
                c.winner.display()
            )
        }));
    }

    /// Close the result, deriving success or no-op from what happened.
    pub fn finish(mut self) -> Self {
        if self.outcome == SyncOutcome::NoOp && self.did_anything() {
            self.outcome = SyncOutcome::Success;
        }
        self.completed_at = Utc::now();
        self
    }

    /// Close the result with an error.
    pub fn fail(mut self, err: &SyncError) -> Self {
        self.outcome = match err {
            SyncError::Conflict { files } => SyncOutcome::Conflict {
                files: files.clone(),
            },
            other => SyncOutcome::Failed {
                kind: other.kind(),
                message: other.to_string(),
            },
        };
        self.completed_at = Utc::now();
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, SyncOutcome::Success | SyncOutcome::NoOp)
    }

    fn did_anything(&self) -> bool {
        self.files_added + self.files_changed + self.files_removed > 0
            || self.commit.is_some()
            || self.pushed
            || self
                .pull
                .as_ref()
                .is_some_and(|p| !p.changed_files().is_empty())
    }
}

// ---------------------------------------------------------------------------
// Repository status
// ---------------------------------------------------------------------------

/// Snapshot of the local repository.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoStatus {
    pub path: String,
    pub exists: bool,
    pub branch: Option<String>,
    pub head: Option<String>,
    pub upstream: Option<String>,
    pub remote_url: Option<String>,
    /// Commits on the local branch not on its upstream.
    pub ahead: usize,
    pub behind: usize,
    pub modified: Vec<String>,
    pub untracked: Vec<String>,
    pub conflicted: Vec<String>,
    /// Unfinished repository operation (`merge`, `rebase`, ...).
    pub state: Option<String>,
}

impl RepoStatus {
    pub fn is_clean(&self) -> bool {
        self.modified.is_empty()
            && self.untracked.is_empty()
            && self.conflicted.is_empty()
            && self.state.is_none()
    }
}
