//! Error types for the OrcaSync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mirror::Category;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and resolution. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// The document could not be parsed.
    #[error("failed to parse {format} configuration '{path}': {detail}")]
    ParseError {
        path: String,
        format: String,
        detail: String,
    },

    /// The file extension does not map to a supported document format.
    #[error("unsupported configuration format '{0}' (expected .toml, .yaml or .yml)")]
    UnsupportedFormat(String),

    /// The requested profile does not exist in the `profiles` mapping.
    #[error("profile '{name}' not found in configuration (available: {available})")]
    UnknownProfile { name: String, available: String },

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// The configuration could not be serialized back to disk.
    #[error("failed to serialize configuration: {0}")]
    SerializeError(String),

    /// Generic I/O error reading or writing the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Path problems (reported, never fatal)
// ---------------------------------------------------------------------------

/// A configured profile directory that could not be used.
///
/// These are collected in mirror reports as warnings; a sync proceeds with
/// whatever directories exist.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathError {
    /// One configured source directory does not exist; it was skipped.
    #[error("{category} source directory does not exist: {path}")]
    SourceMissing { category: Category, path: PathBuf },

    /// Every configured source directory of a category is missing.
    #[error("all {category} source directories are missing; {category} profiles were not synced")]
    AllSourcesMissing { category: Category },

    /// A configured path exists but is a file.
    #[error("configured profile path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// A symbolic link inside a mirrored tree. Links are never followed,
    /// copied, replaced or deleted.
    #[error("symbolic link left untouched: {path}")]
    Symlink { path: PathBuf },
}

// ---------------------------------------------------------------------------
// Git errors
// ---------------------------------------------------------------------------

/// Errors from local Git (git2) operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// The repository path does not exist or is not a git repo.
    #[error("git repository not found at '{0}'")]
    RepositoryNotFound(String),

    /// A `git2` library error.
    #[error("git2 error: {0}")]
    Git2Error(#[from] git2::Error),

    /// A ref (branch, remote-tracking branch) could not be resolved.
    #[error("git ref not found: {0}")]
    RefNotFound(String),

    /// HEAD points at a branch with no commits yet.
    #[error("branch '{0}' has no commits yet")]
    UnbornHead(String),

    /// Generic I/O wrapper.
    #[error("git I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Sync engine errors
// ---------------------------------------------------------------------------

/// Errors from the synchronization engine.
///
/// Every variant is fatal for the current invocation. None of them is
/// retried automatically.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote could not be reached and there is no local copy to use.
    #[error("cannot access repository '{url}': {detail}")]
    RepositoryAccess { url: String, detail: String },

    /// The remote rejected our credentials, or none were available.
    #[error("authentication failed for '{url}': {detail}\n{hint}")]
    Authentication {
        url: String,
        detail: String,
        hint: String,
    },

    /// The remote repository does not exist (HTTP 404 or equivalent).
    #[error("repository not found: {url}. Make sure it exists and you have access to it")]
    RepositoryNotFound { url: String },

    /// The remote branch has commits the local branch lacks.
    #[error("push of branch '{branch}' rejected (non-fast-forward). Run 'orcasync pull' first to integrate remote changes")]
    NonFastForward { branch: String },

    /// Rebase and merge both conflicted; the working copy holds a
    /// conflicted merge awaiting manual resolution.
    #[error("merge conflict in {} file(s): {}. Resolve the conflicts in the local repository and commit", files.len(), files.join(", "))]
    Conflict { files: Vec<String> },

    /// A merge or rebase is still unresolved in the local repository.
    #[error("repository has an unfinished {state} operation; resolve it manually before syncing")]
    OperationInProgress { state: String },

    /// No `origin` remote is configured (local-only mode).
    #[error("no remote repository configured; set repository_url to push or pull")]
    NoRemote,

    /// Another sync operation is already running against this repository.
    #[error("a sync operation is already in progress")]
    AlreadyRunning,

    /// Copying or removing a profile file failed.
    #[error("failed to mirror '{path}': {source}")]
    Mirror {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Underlying Git error.
    #[error("sync Git error: {0}")]
    GitError(#[from] GitError),

    /// Configuration error surfaced during a sync.
    #[error("sync config error: {0}")]
    ConfigError(#[from] ConfigError),
}

impl From<git2::Error> for SyncError {
    fn from(err: git2::Error) -> Self {
        SyncError::GitError(GitError::Git2Error(err))
    }
}

/// Flat classification of a [`SyncError`], carried in a
/// [`crate::models::SyncResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    RepositoryAccess,
    Authentication,
    RepositoryNotFound,
    NonFastForward,
    Conflict,
    OperationInProgress,
    NoRemote,
    AlreadyRunning,
    Io,
    Git,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Config => "config",
            Self::RepositoryAccess => "repository_access",
            Self::Authentication => "authentication",
            Self::RepositoryNotFound => "repository_not_found",
            Self::NonFastForward => "non_fast_forward",
            Self::Conflict => "conflict",
            Self::OperationInProgress => "operation_in_progress",
            Self::NoRemote => "no_remote",
            Self::AlreadyRunning => "already_running",
            Self::Io => "io",
            Self::Git => "git",
        };
        f.write_str(label)
    }
}

impl SyncError {
    /// Classify this error for reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RepositoryAccess { .. } => ErrorKind::RepositoryAccess,
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::RepositoryNotFound { .. } => ErrorKind::RepositoryNotFound,
            Self::NonFastForward { .. } => ErrorKind::NonFastForward,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::OperationInProgress { .. } => ErrorKind::OperationInProgress,
            Self::NoRemote => ErrorKind::NoRemote,
            Self::AlreadyRunning => ErrorKind::AlreadyRunning,
            Self::Mirror { .. } => ErrorKind::Io,
            Self::GitError(GitError::IoError(_)) => ErrorKind::Io,
            Self::GitError(_) => ErrorKind::Git,
            Self::ConfigError(_) => ErrorKind::Config,
        }
    }

    /// Files left conflicted, if this is a conflict.
    pub fn conflicted_files(&self) -> Option<&[String]> {
        match self {
            Self::Conflict { files } => Some(files),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = ConfigError::UnknownProfile {
            name: "work".into(),
            available: "default, home".into(),
        };
        assert_eq!(
            err.to_string(),
            "profile 'work' not found in configuration (available: default, home)"
        );

        let err = GitError::RepositoryNotFound("/tmp/repo".into());
        assert_eq!(err.to_string(), "git repository not found at '/tmp/repo'");

        let err = SyncError::NonFastForward {
            branch: "laptop".into(),
        };
        assert!(err.to_string().contains("orcasync pull"));

        let err = SyncError::Conflict {
            files: vec!["profiles/user/a.json".into(), "profiles/user/b.json".into()],
        };
        assert!(err.to_string().starts_with("merge conflict in 2 file(s)"));
    }

    #[test]
    fn test_path_error_display() {
        let err = PathError::AllSourcesMissing {
            category: Category::System,
        };
        assert!(err.to_string().contains("all system source directories"));
    }

    #[test]
    fn test_sync_error_kind() {
        assert_eq!(SyncError::NoRemote.kind(), ErrorKind::NoRemote);
        assert_eq!(
            SyncError::Conflict { files: vec![] }.kind(),
            ErrorKind::Conflict
        );
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert_eq!(SyncError::GitError(GitError::IoError(io)).kind(), ErrorKind::Io);
        let cfg = ConfigError::FileNotFound("x".into());
        assert_eq!(SyncError::from(cfg).kind(), ErrorKind::Config);
        assert_eq!(ErrorKind::NonFastForward.to_string(), "non_fast_forward");
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let core_err: CoreError = SyncError::AlreadyRunning.into();
        assert!(matches!(core_err, CoreError::Sync(_)));

        let core_err: CoreError = ConfigError::FileNotFound("x".into()).into();
        assert!(matches!(core_err, CoreError::Config(_)));
    }
}
