//! Local Git repository operations via `git2`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    BranchType, Direction, ErrorCode, FetchOptions, IndexAddOption, MergeOptions, Oid, PushOptions,
    RebaseOptions, Remote, Repository, RepositoryInitOptions, RepositoryState, Signature,
    StatusOptions,
};
use tracing::{debug, info, instrument, warn};

use super::credentials::{classify_remote_error, RemoteAuth};
use crate::errors::{GitError, SyncError};
use crate::models::{PullOutcome, RepoStatus};

/// Name of the single remote the engine works with.
pub const REMOTE_NAME: &str = "origin";

const README_CONTENTS: &str =
    "# OrcaSync Profiles\n\nThis repository contains OrcaSlicer profile synchronization data.\n";

/// Pull state machine. Every transition is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullState {
    Fetched,
    Rebasing,
    RebaseOk,
    RebaseConflict,
    Merging,
    MergeOk,
    MergeConflict,
}

impl std::fmt::Display for PullState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetched => write!(f, "FETCHED"),
            Self::Rebasing => write!(f, "REBASING"),
            Self::RebaseOk => write!(f, "REBASE_OK"),
            Self::RebaseConflict => write!(f, "REBASE_CONFLICT"),
            Self::Merging => write!(f, "MERGING"),
            Self::MergeOk => write!(f, "MERGE_OK"),
            Self::MergeConflict => write!(f, "MERGE_CONFLICT"),
        }
    }
}

/// Where the checked-out branch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchOrigin {
    /// Already checked out.
    Current,
    /// An existing local branch was checked out.
    Local,
    /// A local branch was created tracking the remote branch.
    Remote,
    /// A new branch was created from HEAD.
    Created,
}

/// High-level Git client wrapping a `git2::Repository`.
pub struct GitClient {
    repo: Repository,
    repo_path: PathBuf,
    auth: RemoteAuth,
    hostname: String,
}

impl GitClient {
    /// Open an existing Git repository at `repo_path`.
    pub fn open<P: AsRef<Path>>(repo_path: P, auth: RemoteAuth) -> Result<Self, GitError> {
        let path = repo_path.as_ref();
        debug!(path = %path.display(), "opening git repository");
        let repo = Repository::open(path)
            .map_err(|_| GitError::RepositoryNotFound(path.display().to_string()))?;
        Ok(Self::wrap(repo, path, auth))
    }

    /// Initialise a new repository whose HEAD points at `branch`.
    #[instrument(skip(auth), fields(path = %path.display()))]
    pub fn init(path: &Path, branch: &str, auth: RemoteAuth) -> Result<Self, GitError> {
        info!("initialising git repository");
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head(branch).mkpath(true);
        let repo = Repository::init_opts(path, &opts)?;
        Ok(Self::wrap(repo, path, auth))
    }

    /// Clone `url` to `path`.
    #[instrument(skip(auth), fields(url = %url, path = %path.display()))]
    pub fn clone_repo(url: &str, path: &Path, auth: RemoteAuth) -> Result<Self, SyncError> {
        info!("cloning git repository");
        let config = git2::Config::open_default().ok();
        let repo = {
            let mut fetch_opts = FetchOptions::new();
            fetch_opts.remote_callbacks(auth.callbacks(config));
            let mut builder = RepoBuilder::new();
            builder.fetch_options(fetch_opts);
            builder
                .clone(url, path)
                .map_err(|e| classify_remote_error(url, "", e))?
        };
        info!("clone completed");
        Ok(Self::wrap(repo, path, auth))
    }

    /// Ask `url` whether it already holds history. `Ok(true)` when the
    /// remote advertises a HEAD that resolves to a branch.
    ///
    /// The advertised refs are never listed directly: an empty remote
    /// advertises none, and `git_remote_ls` then hands back a null array.
    /// libgit2 answers the default-branch query with `NotFound` instead.
    #[instrument(skip(auth))]
    pub fn probe_remote(url: &str, auth: &RemoteAuth) -> Result<bool, SyncError> {
        let mut remote = Remote::create_detached(url)?;
        let config = git2::Config::open_default().ok();
        let mut connection = remote
            .connect_auth(Direction::Fetch, Some(auth.callbacks(config)), None)
            .map_err(|e| classify_remote_error(url, "", e))?;
        let has_history = match connection.remote().default_branch() {
            Ok(head) => {
                debug!(head = head.as_str().unwrap_or_default(), "remote has a default branch");
                true
            }
            Err(e) if e.code() == ErrorCode::NotFound => false,
            Err(e) => return Err(classify_remote_error(url, "", e)),
        };
        debug!(has_history, "remote checked for history");
        Ok(has_history)
    }

    fn wrap(repo: Repository, path: &Path, auth: RemoteAuth) -> Self {
        Self {
            repo,
            repo_path: path.to_path_buf(),
            auth,
            hostname: "localhost".into(),
        }
    }

    /// Hostname used for the fallback commit identity.
    pub fn with_hostname(mut self, hostname: &str) -> Self {
        self.hostname = hostname.to_string();
        self
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    // -----------------------------------------------------------------------
    // Remote configuration
    // -----------------------------------------------------------------------

    /// URL of `origin`, if configured.
    pub fn remote_url(&self) -> Option<String> {
        self.repo
            .find_remote(REMOTE_NAME)
            .ok()
            .and_then(|r| r.url().map(str::to_string))
    }

    /// Add `origin` or point it at `url`. Returns true when anything changed.
    pub fn set_origin(&self, url: &str) -> Result<bool, GitError> {
        match self.remote_url() {
            Some(current) if current == url => Ok(false),
            Some(current) => {
                info!(from = %current, to = %url, "updating origin url");
                self.repo.remote_set_url(REMOTE_NAME, url)?;
                Ok(true)
            }
            None => {
                info!(%url, "adding origin remote");
                self.repo.remote(REMOTE_NAME, url)?;
                Ok(true)
            }
        }
    }

    // -----------------------------------------------------------------------
    // HEAD and branches
    // -----------------------------------------------------------------------

    /// Name of the branch HEAD points at, even when it has no commits.
    pub fn current_branch(&self) -> Option<String> {
        match self.repo.head() {
            Ok(head) => head.shorthand().map(str::to_string),
            Err(_) => self
                .repo
                .find_reference("HEAD")
                .ok()
                .and_then(|r| r.symbolic_target().map(str::to_string))
                .and_then(|t| t.strip_prefix("refs/heads/").map(str::to_string)),
        }
    }

    pub fn head_oid(&self) -> Option<Oid> {
        self.repo.head().ok().and_then(|h| h.target())
    }

    /// Unfinished operation (`merge`, `rebase`, ...), if any.
    pub fn operation_in_progress(&self) -> Option<String> {
        let label = match self.repo.state() {
            RepositoryState::Clean => return None,
            RepositoryState::Merge => "merge",
            RepositoryState::Rebase
            | RepositoryState::RebaseInteractive
            | RepositoryState::RebaseMerge => "rebase",
            RepositoryState::ApplyMailbox | RepositoryState::ApplyMailboxOrRebase => "am",
            RepositoryState::CherryPick | RepositoryState::CherryPickSequence => "cherry-pick",
            RepositoryState::Revert | RepositoryState::RevertSequence => "revert",
            RepositoryState::Bisect => "bisect",
        };
        Some(label.to_string())
    }

    fn remote_branch_oid(&self, branch: &str) -> Option<Oid> {
        self.repo
            .refname_to_id(&format!("refs/remotes/{}/{}", REMOTE_NAME, branch))
            .ok()
    }

    /// Check out `branch`, creating it when needed.
    ///
    /// Existing local branch first, then a branch tracking the remote one,
    /// then a new branch from HEAD. An existing branch is never reset.
    #[instrument(skip(self))]
    pub fn checkout_branch(&self, branch: &str) -> Result<BranchOrigin, GitError> {
        let refname = format!("refs/heads/{}", branch);
        let head_born = self.head_oid().is_some();

        if head_born && self.current_branch().as_deref() == Some(branch) {
            debug!("branch already checked out");
            return Ok(BranchOrigin::Current);
        }

        if self.repo.find_branch(branch, BranchType::Local).is_ok() {
            self.switch_to(&refname)?;
            info!("checked out existing local branch");
            return Ok(BranchOrigin::Local);
        }

        if let Some(oid) = self.remote_branch_oid(branch) {
            let commit = self.repo.find_commit(oid)?;
            self.repo.branch(branch, &commit, false)?;
            self.set_upstream(branch)?;
            self.switch_to(&refname)?;
            info!("created local branch tracking remote");
            return Ok(BranchOrigin::Remote);
        }

        if head_born {
            let head = self.repo.head()?.peel_to_commit()?;
            self.repo.branch(branch, &head, false)?;
            self.switch_to(&refname)?;
        } else {
            self.repo.set_head(&refname)?;
            self.ensure_initial_commit()?;
        }
        info!("created new branch");
        Ok(BranchOrigin::Created)
    }

    fn switch_to(&self, refname: &str) -> Result<(), GitError> {
        let target = self.repo.revparse_single(refname)?;
        self.repo
            .checkout_tree(&target, Some(CheckoutBuilder::new().safe()))?;
        self.repo.set_head(refname)?;
        Ok(())
    }

    /// Record `origin/<branch>` as the upstream of `branch`.
    pub fn set_upstream(&self, branch: &str) -> Result<(), GitError> {
        let mut config = self.repo.config()?.open_level(git2::ConfigLevel::Local)?;
        let remote_key = format!("branch.{}.remote", branch);
        let merge_key = format!("branch.{}.merge", branch);
        let merge_value = format!("refs/heads/{}", branch);
        if config.get_string(&remote_key).ok().as_deref() != Some(REMOTE_NAME) {
            config.set_str(&remote_key, REMOTE_NAME)?;
        }
        if config.get_string(&merge_key).ok().as_deref() != Some(merge_value.as_str()) {
            config.set_str(&merge_key, &merge_value)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Commits
    // -----------------------------------------------------------------------

    /// Configured identity, or `OrcaSync <orcasync@HOST>`.
    fn signature(&self) -> Result<Signature<'static>, GitError> {
        match self.repo.signature() {
            Ok(sig) => Ok(sig.to_owned()),
            Err(_) => Ok(Signature::now(
                "OrcaSync",
                &format!("orcasync@{}", self.hostname),
            )?),
        }
    }

    /// Give an empty repository its first commit, a README.
    pub fn ensure_initial_commit(&self) -> Result<Option<Oid>, GitError> {
        if self.head_oid().is_some() {
            return Ok(None);
        }
        let readme = self.repo_path.join("README.md");
        if !readme.exists() {
            std::fs::write(&readme, README_CONTENTS)?;
        }
        let mut index = self.repo.index()?;
        index.add_path(Path::new("README.md"))?;
        index.write()?;
        let tree = self.repo.find_tree(index.write_tree()?)?;
        let sig = self.signature()?;
        let oid = self.repo.commit(Some("HEAD"), &sig, &sig, "Initial commit", &tree, &[])?;
        info!(sha = %oid, "created initial commit");
        Ok(Some(oid))
    }

    /// Stage every addition, modification and deletion and commit.
    ///
    /// Returns `None` without committing when the staged tree equals HEAD.
    #[instrument(skip(self, message))]
    pub fn commit_all(&self, message: &str) -> Result<Option<Oid>, GitError> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        let tree_oid = index.write_tree()?;

        let parent = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(_) => None,
        };
        if parent.as_ref().is_some_and(|p| p.tree_id() == tree_oid) {
            debug!("nothing to commit");
            return Ok(None);
        }

        let tree = self.repo.find_tree(tree_oid)?;
        let sig = self.signature()?;
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;
        info!(sha = %oid, "created commit");
        Ok(Some(oid))
    }

    // -----------------------------------------------------------------------
    // Network
    // -----------------------------------------------------------------------

    fn require_remote(&self) -> Result<String, SyncError> {
        self.remote_url().ok_or(SyncError::NoRemote)
    }

    /// Fetch all branches from `origin`.
    #[instrument(skip(self))]
    pub fn fetch(&self) -> Result<(), SyncError> {
        let url = self.require_remote()?;
        let mut remote = self.repo.find_remote(REMOTE_NAME)?;
        let mut fetch_opts = FetchOptions::new();
        fetch_opts.remote_callbacks(self.auth.callbacks(self.repo.config().ok()));
        remote
            .fetch(&[] as &[&str], Some(&mut fetch_opts), None)
            .map_err(|e| classify_remote_error(&url, "", e))?;
        debug!("fetch completed");
        Ok(())
    }

    /// Push `branch` to `origin` and record the upstream.
    ///
    /// Returns `false` without sending anything when the remote branch
    /// already matches.
    #[instrument(skip(self))]
    pub fn push(&self, branch: &str) -> Result<bool, SyncError> {
        let url = self.require_remote()?;
        self.fetch()?;

        let local = self
            .repo
            .refname_to_id(&format!("refs/heads/{}", branch))
            .map_err(|_| GitError::RefNotFound(branch.to_string()))?;
        if let Some(remote_oid) = self.remote_branch_oid(branch) {
            if remote_oid == local {
                debug!("remote branch already up to date");
                self.set_upstream(branch)?;
                return Ok(false);
            }
            if !self.repo.graph_descendant_of(local, remote_oid)? {
                warn!("remote has commits the local branch lacks");
                return Err(SyncError::NonFastForward {
                    branch: branch.to_string(),
                });
            }
        }

        info!(remote = REMOTE_NAME, "pushing");
        let rejection = Arc::new(Mutex::new(None::<String>));
        {
            let mut remote = self.repo.find_remote(REMOTE_NAME)?;
            let mut callbacks = self.auth.callbacks(self.repo.config().ok());
            let rejection_slot = Arc::clone(&rejection);
            callbacks.push_update_reference(move |refname, status| {
                if let Some(msg) = status {
                    warn!(refname, msg, "push rejected");
                    if let Ok(mut slot) = rejection_slot.lock() {
                        *slot = Some(msg.to_string());
                    }
                }
                Ok(())
            });
            let mut push_opts = PushOptions::new();
            push_opts.remote_callbacks(callbacks);
            let refspec = format!("refs/heads/{}:refs/heads/{}", branch, branch);
            remote
                .push(&[&refspec], Some(&mut push_opts))
                .map_err(|e| classify_remote_error(&url, branch, e))?;
        }

        let rejected = rejection.lock().ok().and_then(|mut slot| slot.take());
        if let Some(msg) = rejected {
            let lower = msg.to_lowercase();
            if lower.contains("non-fast-forward") || lower.contains("fetch first") {
                return Err(SyncError::NonFastForward {
                    branch: branch.to_string(),
                });
            }
            return Err(SyncError::RepositoryAccess { url, detail: msg });
        }

        self.set_upstream(branch)?;
        info!("push completed");
        Ok(true)
    }

    /// Fetch and integrate `origin/<branch>` into the checked-out branch.
    ///
    /// Fast-forwards when possible; otherwise rebases, and if the rebase
    /// conflicts, aborts it and merges. A conflicted merge is left in the
    /// working tree and reported as [`SyncError::Conflict`].
    #[instrument(skip(self))]
    pub fn pull(&self, branch: &str) -> Result<PullOutcome, SyncError> {
        if let Some(state) = self.operation_in_progress() {
            return Err(SyncError::OperationInProgress { state });
        }
        self.fetch()?;
        info!(state = %PullState::Fetched, "pull");

        let Some(remote_oid) = self.remote_branch_oid(branch) else {
            debug!("remote branch does not exist yet");
            return Ok(PullOutcome::NoRemoteBranch);
        };
        let Some(local_oid) = self.head_oid() else {
            return Err(GitError::UnbornHead(branch.to_string()).into());
        };
        if local_oid == remote_oid {
            return Ok(PullOutcome::UpToDate);
        }

        let (ahead, behind) = self.repo.graph_ahead_behind(local_oid, remote_oid)?;
        debug!(ahead, behind, "compared with remote");
        if behind == 0 {
            return Ok(PullOutcome::UpToDate);
        }

        if ahead == 0 {
            self.fast_forward(branch, remote_oid)?;
            info!(state = %PullState::RebaseOk, "fast-forwarded");
            let files = self.changed_paths(local_oid, remote_oid)?;
            return Ok(PullOutcome::FastForward { files });
        }

        info!(state = %PullState::Rebasing, "pull");
        if self.rebase_onto(remote_oid)? {
            info!(state = %PullState::RebaseOk, "pull");
            let files = self.changed_paths(local_oid, self.head_oid().unwrap_or(local_oid))?;
            return Ok(PullOutcome::Rebased { files });
        }
        info!(state = %PullState::RebaseConflict, "rebase aborted");

        info!(state = %PullState::Merging, "pull");
        let merged = self.merge(branch, remote_oid)?;
        info!(state = %PullState::MergeOk, "pull");
        let files = self.changed_paths(local_oid, merged)?;
        Ok(PullOutcome::Merged { files })
    }

    fn fast_forward(&self, branch: &str, target: Oid) -> Result<(), GitError> {
        let refname = format!("refs/heads/{}", branch);
        let commit = self.repo.find_commit(target)?;
        self.repo
            .checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().safe()))?;
        let mut reference = self.repo.find_reference(&refname)?;
        reference.set_target(target, "orcasync: fast-forward")?;
        self.repo.set_head(&refname)?;
        Ok(())
    }

    /// Replay local commits onto `upstream`. Returns `false` after aborting
    /// on conflict; the working tree is then back where it started.
    fn rebase_onto(&self, upstream: Oid) -> Result<bool, GitError> {
        let head = self.repo.head()?;
        let local = self.repo.reference_to_annotated_commit(&head)?;
        let onto = self.repo.find_annotated_commit(upstream)?;
        let sig = self.signature()?;

        let mut opts = RebaseOptions::new();
        let mut rebase = self
            .repo
            .rebase(Some(&local), Some(&onto), None, Some(&mut opts))?;

        while let Some(op) = rebase.next() {
            if let Err(e) = op {
                warn!(error = %e, "rebase step failed");
                rebase.abort()?;
                return Ok(false);
            }
            if self.repo.index()?.has_conflicts() {
                rebase.abort()?;
                return Ok(false);
            }
            match rebase.commit(None, &sig, None) {
                Ok(_) => {}
                // The patch was already upstream.
                Err(e) if e.code() == git2::ErrorCode::Applied => {}
                Err(e) if e.code() == git2::ErrorCode::Unmerged => {
                    rebase.abort()?;
                    return Ok(false);
                }
                Err(e) => {
                    rebase.abort()?;
                    return Err(e.into());
                }
            }
        }
        rebase.finish(Some(&sig))?;
        Ok(true)
    }

    /// Three-way merge of `theirs` into HEAD. Conflicts stay in the working
    /// tree with the merge in progress.
    fn merge(&self, branch: &str, theirs: Oid) -> Result<Oid, SyncError> {
        let annotated = self.repo.find_annotated_commit(theirs)?;
        let mut merge_opts = MergeOptions::new();
        let mut checkout = CheckoutBuilder::new();
        checkout.safe().allow_conflicts(true).conflict_style_merge(true);
        self.repo
            .merge(&[&annotated], Some(&mut merge_opts), Some(&mut checkout))?;

        let mut index = self.repo.index()?;
        if index.has_conflicts() {
            let mut files = Vec::new();
            for conflict in index.conflicts()? {
                let conflict = conflict?;
                let entry = conflict.our.or(conflict.their).or(conflict.ancestor);
                if let Some(entry) = entry {
                    files.push(String::from_utf8_lossy(&entry.path).into_owned());
                }
            }
            files.sort();
            files.dedup();
            warn!(state = %PullState::MergeConflict, files = ?files, "merge left conflicts");
            return Err(SyncError::Conflict { files });
        }

        let tree = self.repo.find_tree(index.write_tree()?)?;
        let ours = self.repo.head()?.peel_to_commit()?;
        let theirs_commit = self.repo.find_commit(theirs)?;
        let sig = self.signature()?;
        let message = format!(
            "Merge remote-tracking branch '{}/{}' into {}",
            REMOTE_NAME, branch, branch
        );
        let oid = self.repo.commit(
            Some("HEAD"),
            &sig,
            &sig,
            &message,
            &tree,
            &[&ours, &theirs_commit],
        )?;
        self.repo.cleanup_state()?;
        Ok(oid)
    }

    /// Paths that differ between two commits.
    fn changed_paths(&self, old: Oid, new: Oid) -> Result<Vec<String>, GitError> {
        let old_tree = self.repo.find_commit(old)?.tree()?;
        let new_tree = self.repo.find_commit(new)?.tree()?;
        let diff = self
            .repo
            .diff_tree_to_tree(Some(&old_tree), Some(&new_tree), None)?;
        Ok(diff
            .deltas()
            .filter_map(|d| {
                d.new_file()
                    .path()
                    .or_else(|| d.old_file().path())
                    .map(|p| p.to_string_lossy().into_owned())
            })
            .collect())
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    /// Read-only status of the working copy against `origin/<branch>`.
    pub fn status(&self) -> Result<RepoStatus, GitError> {
        let mut status = RepoStatus {
            path: self.repo_path.display().to_string(),
            exists: true,
            branch: self.current_branch(),
            head: self.head_oid().map(|o| o.to_string()),
            remote_url: self.remote_url(),
            state: self.operation_in_progress(),
            ..Default::default()
        };

        let mut opts = StatusOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true);
        for entry in self.repo.statuses(Some(&mut opts))?.iter() {
            let Some(path) = entry.path().map(str::to_string) else {
                continue;
            };
            let flags = entry.status();
            if flags.is_conflicted() {
                status.conflicted.push(path);
            } else if flags.is_wt_new() {
                status.untracked.push(path);
            } else if !flags.is_ignored() {
                status.modified.push(path);
            }
        }

        if let (Some(branch), Some(local)) = (status.branch.clone(), self.head_oid()) {
            if let Some(remote) = self.remote_branch_oid(&branch) {
                let (ahead, behind) = self.repo.graph_ahead_behind(local, remote)?;
                status.ahead = ahead;
                status.behind = behind;
                status.upstream = Some(format!("{}/{}", REMOTE_NAME, branch));
            }
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_client(dir: &Path) -> GitClient {
        let client = GitClient::init(dir, "main", RemoteAuth::default())
            .unwrap()
            .with_hostname("testhost");
        let mut config = client.repo().config().unwrap();
        config.set_str("user.name", "Test").unwrap();
        config.set_str("user.email", "test@test.com").unwrap();
        client
    }

    #[test]
    fn test_init_initial_commit_and_commit_all() {
        let dir = tempfile::tempdir().unwrap();
        let client = init_client(dir.path());
        assert_eq!(client.current_branch().as_deref(), Some("main"));
        assert!(client.head_oid().is_none());

        assert!(client.ensure_initial_commit().unwrap().is_some());
        assert!(dir.path().join("README.md").is_file());
        assert!(client.ensure_initial_commit().unwrap().is_none());

        std::fs::write(dir.path().join("a.json"), "{}").unwrap();
        let oid = client.commit_all("add a").unwrap();
        assert!(oid.is_some());
        assert_eq!(client.head_oid(), oid);
    }

    #[test]
    fn test_commit_all_without_changes_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let client = init_client(dir.path());
        client.ensure_initial_commit().unwrap();
        assert!(client.commit_all("nothing").unwrap().is_none());
    }

    #[test]
    fn test_commit_all_stages_deletions() {
        let dir = tempfile::tempdir().unwrap();
        let client = init_client(dir.path());
        client.ensure_initial_commit().unwrap();
        std::fs::write(dir.path().join("a.json"), "{}").unwrap();
        client.commit_all("add").unwrap();

        std::fs::remove_file(dir.path().join("a.json")).unwrap();
        client.commit_all("remove").unwrap().unwrap();
        let tree = client.repo().head().unwrap().peel_to_tree().unwrap();
        assert!(tree.get_name("a.json").is_none());
        assert!(client.status().unwrap().is_clean());
    }

    #[test]
    fn test_checkout_branch_creates_from_head() {
        let dir = tempfile::tempdir().unwrap();
        let client = init_client(dir.path());
        client.ensure_initial_commit().unwrap();

        assert_eq!(client.checkout_branch("main").unwrap(), BranchOrigin::Current);
        assert_eq!(client.checkout_branch("laptop").unwrap(), BranchOrigin::Created);
        assert_eq!(client.current_branch().as_deref(), Some("laptop"));
        assert_eq!(client.checkout_branch("main").unwrap(), BranchOrigin::Local);
    }

    #[test]
    fn test_checkout_branch_on_unborn_head() {
        let dir = tempfile::tempdir().unwrap();
        let client = init_client(dir.path());
        assert_eq!(client.checkout_branch("desk").unwrap(), BranchOrigin::Created);
        assert_eq!(client.current_branch().as_deref(), Some("desk"));
        assert!(client.head_oid().is_some());
    }

    #[test]
    fn test_set_origin_add_then_update() {
        let dir = tempfile::tempdir().unwrap();
        let client = init_client(dir.path());
        assert!(client.remote_url().is_none());
        assert!(client.set_origin("https://a/b.git").unwrap());
        assert!(!client.set_origin("https://a/b.git").unwrap());
        assert!(client.set_origin("https://a/c.git").unwrap());
        assert_eq!(client.remote_url().as_deref(), Some("https://a/c.git"));
    }

    #[test]
    fn test_network_without_remote() {
        let dir = tempfile::tempdir().unwrap();
        let client = init_client(dir.path());
        client.ensure_initial_commit().unwrap();
        assert!(matches!(client.push("main"), Err(SyncError::NoRemote)));
        assert!(matches!(client.pull("main"), Err(SyncError::NoRemote)));
    }

    #[test]
    fn test_status_reports_changes() {
        let dir = tempfile::tempdir().unwrap();
        let client = init_client(dir.path());
        client.ensure_initial_commit().unwrap();
        std::fs::write(dir.path().join("new.json"), "{}").unwrap();
        std::fs::write(dir.path().join("README.md"), "changed").unwrap();

        let status = client.status().unwrap();
        assert_eq!(status.branch.as_deref(), Some("main"));
        assert_eq!(status.untracked, vec!["new.json".to_string()]);
        assert_eq!(status.modified, vec!["README.md".to_string()]);
        assert!(status.state.is_none());
        assert!(status.upstream.is_none());
    }

    #[test]
    fn test_repo_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = GitClient::open(dir.path().join("missing"), RemoteAuth::default());
        assert!(matches!(result, Err(GitError::RepositoryNotFound(_))));
    }

    #[test]
    fn test_remote_history_detection() {
        let origin_dir = tempfile::tempdir().unwrap();
        let bare = Repository::init_bare(origin_dir.path()).unwrap();
        bare.set_head("refs/heads/main").unwrap();
        let url = origin_dir.path().to_str().unwrap();
        assert!(!GitClient::probe_remote(url, &RemoteAuth::default()).unwrap());

        let work = tempfile::tempdir().unwrap();
        let client = init_client(work.path());
        client.ensure_initial_commit().unwrap();
        client.set_origin(url).unwrap();
        assert!(client.push("main").unwrap());
        assert!(GitClient::probe_remote(url, &RemoteAuth::default()).unwrap());
        assert!(!client.push("main").unwrap());
    }

    #[test]
    fn test_empty_remote_reports_no_history() {
        // A freshly created bare repository advertises no refs at all.
        let origin_dir = tempfile::tempdir().unwrap();
        Repository::init_bare(origin_dir.path()).unwrap();
        let url = origin_dir.path().to_str().unwrap();
        assert!(!GitClient::probe_remote(url, &RemoteAuth::default()).unwrap());
    }

    #[test]
    fn test_missing_remote_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let url = dir.path().join("absent.git");
        assert!(GitClient::probe_remote(url.to_str().unwrap(), &RemoteAuth::default()).is_err());
    }
}
