//! Sync engine: owns the local repository and sequences the sync flows.
//!
//! Every operation is synchronous and blocking. The engine never runs two
//! steps at once; a flow is mirror, commit, push or fetch, integrate,
//! mirror-out, strictly in order. Callers that need a responsive front end
//! hand the engine to a [`crate::worker::SyncWorker`].
//!
//! # Flows
//!
//! - push: prepare, mirror profiles in, commit, push.
//! - pull: prepare, pull, mirror profiles out.
//! - sync: prepare, mirror in, commit, pull, mirror out, push.
//!
//! With `auto_commit` disabled, push and sync stop after mirroring in.

use std::path::PathBuf;

use tracing::{debug, info, instrument, warn};

use crate::commit_format::CommitFormatter;
use crate::config::EffectiveConfig;
use crate::errors::{GitError, SyncError};
use crate::git::{BranchOrigin, CredentialPolicy, GitClient, RemoteAuth};
use crate::mirror::{self, Category};
use crate::models::{PullOutcome, RepoStatus, SyncOperation, SyncResult, SyncStage};

/// The synchronization engine for one effective configuration.
pub struct SyncEngine {
    config: EffectiveConfig,
    auth: RemoteAuth,
    client: Option<GitClient>,
    credentials_applied: bool,
}

impl SyncEngine {
    pub fn new(config: EffectiveConfig) -> Self {
        let auth = RemoteAuth::new(config.resolve_token());
        Self {
            config,
            auth,
            client: None,
            credentials_applied: false,
        }
    }

    pub fn config(&self) -> &EffectiveConfig {
        &self.config
    }

    pub fn repository_path(&self) -> &std::path::Path {
        &self.config.repository_path
    }

    fn client(&mut self) -> Result<&GitClient, SyncError> {
        if self.client.is_none() {
            self.ensure_repository()?;
        }
        self.client.as_ref().ok_or_else(|| {
            GitError::RepositoryNotFound(self.config.repository_path.display().to_string()).into()
        })
    }

    fn paths(&self, category: Category) -> &[PathBuf] {
        match category {
            Category::User => &self.config.user_paths,
            Category::System => &self.config.system_paths,
        }
    }

    // -----------------------------------------------------------------------
    // Repository lifecycle
    // -----------------------------------------------------------------------

    /// Attach to the local repository, creating it if needed.
    ///
    /// An existing repository is reused and its `origin` pointed at the
    /// configured URL. Otherwise a reachable remote whose HEAD names a branch
    /// is cloned; any other reachable remote gets a fresh repository with
    /// `origin` registered, and branches it does hold are picked up by
    /// [`Self::ensure_branch`]. An unreachable remote with no local copy is
    /// an error.
    #[instrument(skip(self), fields(path = %self.config.repository_path.display()))]
    pub fn ensure_repository(&mut self) -> Result<(), SyncError> {
        if self.client.is_some() {
            return Ok(());
        }
        let path = self.config.repository_path.clone();
        let url = self.config.repository_url.clone();
        let branch = self.config.branch_name.clone();

        let client = if git2::Repository::open(&path).is_ok() {
            let client = GitClient::open(&path, self.auth.clone())?;
            if self.config.has_remote() {
                client.set_origin(&url)?;
            }
            debug!("reusing existing repository");
            client
        } else {
            if path.is_dir() && std::fs::read_dir(&path).map_err(GitError::from)?.next().is_some() {
                return Err(SyncError::RepositoryAccess {
                    url: if url.is_empty() { path.display().to_string() } else { url },
                    detail: format!(
                        "'{}' exists and is not a git repository; move it aside or choose another repository_name",
                        path.display()
                    ),
                });
            }

            if self.config.has_remote() {
                let has_history = match GitClient::probe_remote(&url, &self.auth) {
                    Ok(has_history) => has_history,
                    Err(e @ (SyncError::Authentication { .. } | SyncError::RepositoryNotFound { .. })) => {
                        return Err(e)
                    }
                    Err(e) => {
                        return Err(SyncError::RepositoryAccess {
                            url,
                            detail: e.to_string(),
                        })
                    }
                };
                if has_history {
                    GitClient::clone_repo(&url, &path, self.auth.clone())?
                } else {
                    info!("remote is empty, initialising a new repository");
                    let client = self.init_repository(&path, &branch)?;
                    client.set_origin(&url)?;
                    client
                }
            } else {
                info!("no remote configured, initialising a local-only repository");
                self.init_repository(&path, &branch)?
            }
        };

        self.client = Some(client.with_hostname(&self.config.hostname));
        Ok(())
    }

    /// Fresh repository on `branch` with a README commit, so branches can
    /// be created from HEAD.
    fn init_repository(&self, path: &std::path::Path, branch: &str) -> Result<GitClient, SyncError> {
        let client = GitClient::init(path, branch, self.auth.clone())?
            .with_hostname(&self.config.hostname);
        client.ensure_initial_commit()?;
        Ok(client)
    }

    /// Apply the platform credential policy to the repository, once per
    /// engine.
    pub fn configure_credentials(&mut self) -> Result<CredentialPolicy, SyncError> {
        let policy = CredentialPolicy::for_platform(self.config.platform);
        if self.credentials_applied {
            return Ok(policy);
        }
        let client = self.client()?;
        policy.apply(client.repo())?;
        if !self.auth.has_token() && self.config.token_env.is_some() {
            warn!("token_env is configured but no token was found; relying on ssh or credential helpers");
        }
        self.credentials_applied = true;
        Ok(policy)
    }

    /// Check out the configured branch, creating it if needed.
    ///
    /// The remote is fetched first so an existing remote branch is tracked
    /// instead of shadowed. A failed fetch is logged and the branch is
    /// resolved locally.
    #[instrument(skip(self), fields(branch = %self.config.branch_name))]
    pub fn ensure_branch(&mut self) -> Result<BranchOrigin, SyncError> {
        let branch = self.config.branch_name.clone();
        let has_remote = self.config.has_remote();
        let client = self.client()?;
        if has_remote {
            if let Err(e) = client.fetch() {
                warn!(error = %e, "fetch failed, resolving branch from local state");
            }
        }
        Ok(client.checkout_branch(&branch)?)
    }

    /// Ensure repository, credentials and branch, and refuse to continue
    /// over an unfinished merge or rebase.
    pub fn prepare(&mut self) -> Result<(), SyncError> {
        self.ensure_repository()?;
        self.configure_credentials()?;
        if let Some(state) = self.client()?.operation_in_progress() {
            return Err(SyncError::OperationInProgress { state });
        }
        self.ensure_branch()?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Repository operations
    // -----------------------------------------------------------------------

    /// Stage everything and commit. `message` replaces the configured
    /// template. Returns `None` when nothing changed.
    pub fn commit_changes(&mut self, message: Option<&str>) -> Result<Option<String>, SyncError> {
        let formatter = CommitFormatter::new(
            &self.config.commit_message_template,
            &self.config.hostname,
            &self.config.branch_name,
            self.config.profile.as_deref(),
        );
        let client = self.client()?;
        if let Some(state) = client.operation_in_progress() {
            return Err(SyncError::OperationInProgress { state });
        }
        let oid = client.commit_all(&formatter.message(message))?;
        Ok(oid.map(|o| o.to_string()))
    }

    /// Push the active branch. `Ok(false)` when the remote already matches.
    pub fn push(&mut self) -> Result<bool, SyncError> {
        if !self.config.has_remote() {
            return Err(SyncError::NoRemote);
        }
        let branch = self.config.branch_name.clone();
        self.client()?.push(&branch)
    }

    /// Fetch and integrate the remote branch.
    pub fn pull(&mut self) -> Result<PullOutcome, SyncError> {
        if !self.config.has_remote() {
            return Err(SyncError::NoRemote);
        }
        let branch = self.config.branch_name.clone();
        self.client()?.pull(&branch)
    }

    /// Read-only status. Does not create the repository.
    pub fn status(&self) -> Result<RepoStatus, SyncError> {
        if let Some(client) = &self.client {
            return Ok(client.status()?);
        }
        match GitClient::open(&self.config.repository_path, RemoteAuth::default()) {
            Ok(client) => Ok(client.status()?),
            Err(GitError::RepositoryNotFound(path)) => Ok(RepoStatus {
                path,
                exists: false,
                ..Default::default()
            }),
            Err(e) => Err(e.into()),
        }
    }

    // -----------------------------------------------------------------------
    // Flows
    // -----------------------------------------------------------------------

    /// Run a complete operation, reporting each stage to `progress`.
    #[instrument(skip(self, message, progress), fields(op = %operation, branch = %self.config.branch_name))]
    pub fn run(
        &mut self,
        operation: SyncOperation,
        message: Option<&str>,
        progress: &mut dyn FnMut(SyncStage),
    ) -> SyncResult {
        info!("starting");
        let mut result = SyncResult::new(operation);
        let outcome = match operation {
            SyncOperation::Push => self.push_flow(&mut result, message, progress),
            SyncOperation::Pull => self.pull_flow(&mut result, progress),
            SyncOperation::Sync => self.sync_flow(&mut result, message, progress),
        };
        match outcome {
            Ok(()) => {
                let result = result.finish();
                info!(
                    outcome = ?result.outcome,
                    added = result.files_added,
                    changed = result.files_changed,
                    removed = result.files_removed,
                    "finished"
                );
                result
            }
            Err(e) => {
                warn!(error = %e, kind = %e.kind(), "failed");
                result.fail(&e)
            }
        }
    }

    fn push_flow(
        &mut self,
        result: &mut SyncResult,
        message: Option<&str>,
        progress: &mut dyn FnMut(SyncStage),
    ) -> Result<(), SyncError> {
        progress(SyncStage::PreparingRepository);
        self.prepare()?;
        self.mirror_in(result, progress)?;
        if !self.commit_step(result, message, progress)? {
            return Ok(());
        }
        if self.config.has_remote() {
            progress(SyncStage::Pushing);
            result.pushed = self.push()?;
        }
        Ok(())
    }

    fn pull_flow(
        &mut self,
        result: &mut SyncResult,
        progress: &mut dyn FnMut(SyncStage),
    ) -> Result<(), SyncError> {
        progress(SyncStage::PreparingRepository);
        self.prepare()?;
        if self.config.has_remote() {
            progress(SyncStage::Pulling);
            result.pull = Some(self.pull()?);
        }
        self.mirror_out(result, progress)
    }

    fn sync_flow(
        &mut self,
        result: &mut SyncResult,
        message: Option<&str>,
        progress: &mut dyn FnMut(SyncStage),
    ) -> Result<(), SyncError> {
        progress(SyncStage::PreparingRepository);
        self.prepare()?;
        self.mirror_in(result, progress)?;
        if !self.commit_step(result, message, progress)? {
            return Ok(());
        }
        if self.config.has_remote() {
            progress(SyncStage::Pulling);
            result.pull = Some(self.pull()?);
        }
        self.mirror_out(result, progress)?;
        if self.config.has_remote() {
            progress(SyncStage::Pushing);
            result.pushed = self.push()?;
        }
        Ok(())
    }

    /// Commit when `auto_commit` is on. Returns false when the flow should
    /// stop here.
    fn commit_step(
        &mut self,
        result: &mut SyncResult,
        message: Option<&str>,
        progress: &mut dyn FnMut(SyncStage),
    ) -> Result<bool, SyncError> {
        if !self.config.auto_commit {
            info!("auto_commit is disabled, leaving changes uncommitted");
            return Ok(false);
        }
        progress(SyncStage::Committing);
        result.commit = self.commit_changes(message)?;
        Ok(true)
    }

    fn mirror_in(
        &mut self,
        result: &mut SyncResult,
        progress: &mut dyn FnMut(SyncStage),
    ) -> Result<(), SyncError> {
        progress(SyncStage::MirroringIn);
        let repo_root = self.config.repository_path.clone();
        for category in Category::ALL {
            let report = mirror::mirror_into(self.paths(category), &repo_root, category)?;
            result.record_mirror(&report);
        }
        Ok(())
    }

    fn mirror_out(
        &mut self,
        result: &mut SyncResult,
        progress: &mut dyn FnMut(SyncStage),
    ) -> Result<(), SyncError> {
        progress(SyncStage::MirroringOut);
        let repo_root = self.config.repository_path.clone();
        for category in Category::ALL {
            let report = mirror::mirror_out(self.paths(category), &repo_root, category)?;
            result.record_mirror(&report);
        }
        Ok(())
    }
}
