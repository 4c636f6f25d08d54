//! Credential policy and non-interactive authentication for remote
//! operations.

use std::path::PathBuf;

use git2::{Config, Cred, CredentialType, ErrorClass, ErrorCode, RemoteCallbacks, Repository};
use tracing::{debug, info, warn};

use crate::errors::SyncError;
use crate::platform::PlatformKind;

/// Credential callbacks give up after this many attempts. libgit2 keeps
/// calling back while the server rejects, so an unbounded callback loops.
const MAX_AUTH_ATTEMPTS: u32 = 3;

/// Username sent alongside an HTTPS token.
const TOKEN_USERNAME: &str = "x-access-token";

// ---------------------------------------------------------------------------
// Credential policy
// ---------------------------------------------------------------------------

/// Platform-selected credential strategy written into the repository
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialPolicy {
    /// macOS keychain (`osxkeychain` helper).
    Keychain,
    /// Windows Credential Manager (`wincred` helper).
    WindowsCredentialManager,
    /// Leave the user's git configuration untouched.
    SystemDefault,
}

impl CredentialPolicy {
    pub fn for_platform(kind: PlatformKind) -> Self {
        match kind {
            PlatformKind::Darwin => Self::Keychain,
            PlatformKind::Windows => Self::WindowsCredentialManager,
            PlatformKind::Linux => Self::SystemDefault,
        }
    }

    pub fn helper(&self) -> Option<&'static str> {
        match self {
            Self::Keychain => Some("osxkeychain"),
            Self::WindowsCredentialManager => Some("wincred"),
            Self::SystemDefault => None,
        }
    }

    /// Settings this policy writes, as `(key, value)` pairs.
    fn settings(&self) -> Vec<(&'static str, &'static str)> {
        let mut settings = vec![("pull.rebase", "true")];
        if let Some(helper) = self.helper() {
            settings.push(("credential.helper", helper));
        }
        settings
    }

    /// Write the policy into the repository-local configuration. Only
    /// values that differ are written; returns the number of keys changed.
    pub fn apply(&self, repo: &Repository) -> Result<usize, git2::Error> {
        let mut config = repo.config()?.open_level(git2::ConfigLevel::Local)?;
        let mut changed = 0;
        for (key, value) in self.settings() {
            if config.get_string(key).ok().as_deref() == Some(value) {
                continue;
            }
            config.set_str(key, value)?;
            debug!(key, value, "set repository config");
            changed += 1;
        }
        if changed > 0 {
            info!(policy = ?self, changed, "credential policy applied");
        }
        Ok(changed)
    }
}

// ---------------------------------------------------------------------------
// Remote authentication
// ---------------------------------------------------------------------------

/// Credentials available to remote operations.
#[derive(Debug, Clone, Default)]
pub struct RemoteAuth {
    token: Option<String>,
    ssh_key_dir: Option<PathBuf>,
}

impl RemoteAuth {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token,
            ssh_key_dir: dirs::home_dir().map(|h| h.join(".ssh")),
        }
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Build callbacks that answer credential requests without prompting.
    ///
    /// Order: SSH agent then key files for SSH, the token for HTTPS, the
    /// configured credential helper, and finally default credentials.
    pub fn callbacks<'a>(&'a self, config: Option<Config>) -> RemoteCallbacks<'a> {
        let mut callbacks = RemoteCallbacks::new();
        let mut attempts = 0u32;
        let mut ssh_keys = self.ssh_key_candidates().into_iter();

        callbacks.credentials(move |url, username, allowed| {
            attempts += 1;
            if attempts > MAX_AUTH_ATTEMPTS {
                return Err(git2::Error::new(
                    ErrorCode::Auth,
                    ErrorClass::Callback,
                    "authentication failed: no credentials were accepted",
                ));
            }
            let user = username.unwrap_or("git");
            debug!(url, attempt = attempts, ?allowed, "credentials requested");

            if allowed.contains(CredentialType::USERNAME) {
                return Cred::username(user);
            }
            if allowed.contains(CredentialType::SSH_KEY) {
                if attempts == 1 {
                    return Cred::ssh_key_from_agent(user);
                }
                if let Some(key) = ssh_keys.next() {
                    debug!(key = %key.display(), "trying ssh key file");
                    return Cred::ssh_key(user, None, &key, None);
                }
            }
            if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
                if let Some(token) = &self.token {
                    return Cred::userpass_plaintext(TOKEN_USERNAME, token);
                }
                if let Some(config) = &config {
                    if let Ok(cred) = Cred::credential_helper(config, url, username) {
                        return Ok(cred);
                    }
                }
            }
            if allowed.contains(CredentialType::DEFAULT) {
                return Cred::default();
            }
            Err(git2::Error::new(
                ErrorCode::Auth,
                ErrorClass::Callback,
                "no usable credentials available and terminal prompts are disabled",
            ))
        });
        callbacks
    }

    fn ssh_key_candidates(&self) -> Vec<PathBuf> {
        let Some(dir) = &self.ssh_key_dir else {
            return Vec::new();
        };
        ["id_ed25519", "id_ecdsa", "id_rsa"]
            .iter()
            .map(|name| dir.join(name))
            .filter(|path| path.is_file())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

const AUTH_PHRASES: &[&str] = &[
    "authentication failed",
    "authentication error",
    "could not read username",
    "could not read password",
    "permission denied",
    "invalid credentials",
    "access denied",
    "terminal prompts disabled",
    "no credentials",
    "401",
    "403",
];

/// Map a libgit2 error from a remote operation onto the sync taxonomy.
pub fn classify_remote_error(url: &str, branch: &str, err: git2::Error) -> SyncError {
    let message = err.message().to_lowercase();

    if err.code() == ErrorCode::Auth
        || err.class() == ErrorClass::Ssh
        || AUTH_PHRASES.iter().any(|p| message.contains(p))
    {
        warn!(url, error = %err, "authentication failed");
        return SyncError::Authentication {
            url: url.to_string(),
            detail: err.message().to_string(),
            hint: auth_hint(PlatformKind::current()),
        };
    }
    if message.contains("repository not found") || message.contains("404") {
        return SyncError::RepositoryNotFound {
            url: url.to_string(),
        };
    }
    if err.code() == ErrorCode::NotFastForward
        || message.contains("non-fast-forward")
        || message.contains("fetch first")
    {
        return SyncError::NonFastForward {
            branch: branch.to_string(),
        };
    }
    if matches!(err.class(), ErrorClass::Net | ErrorClass::Os | ErrorClass::Http)
        || message.contains("could not find repository")
        || message.contains("failed to resolve path")
    {
        return SyncError::RepositoryAccess {
            url: url.to_string(),
            detail: err.message().to_string(),
        };
    }
    SyncError::from(err)
}

/// Remediation text shown with authentication failures.
pub fn auth_hint(kind: PlatformKind) -> String {
    let mut hint = String::from(
        "Git cannot prompt for credentials here. Load an SSH key into ssh-agent, \
         set token_env to a variable holding an access token, or configure a credential helper.",
    );
    if kind == PlatformKind::Darwin {
        hint.push_str(
            "\nOn macOS: switch repository_url to the SSH form (git@host:owner/repo.git), \
             or run 'git config --global credential.helper osxkeychain' and authenticate once \
             with a manual 'git push' in the local repository.",
        );
    }
    hint
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(code: ErrorCode, class: ErrorClass, msg: &str) -> git2::Error {
        git2::Error::new(code, class, msg)
    }

    #[test]
    fn test_policy_for_platform() {
        assert_eq!(
            CredentialPolicy::for_platform(PlatformKind::Darwin).helper(),
            Some("osxkeychain")
        );
        assert_eq!(
            CredentialPolicy::for_platform(PlatformKind::Windows).helper(),
            Some("wincred")
        );
        assert_eq!(CredentialPolicy::for_platform(PlatformKind::Linux).helper(), None);
    }

    #[test]
    fn test_apply_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();

        assert_eq!(CredentialPolicy::Keychain.apply(&repo).unwrap(), 2);
        assert_eq!(CredentialPolicy::Keychain.apply(&repo).unwrap(), 0);

        let config = repo.config().unwrap().open_level(git2::ConfigLevel::Local).unwrap();
        assert_eq!(config.get_string("credential.helper").unwrap(), "osxkeychain");
        assert!(config.get_bool("pull.rebase").unwrap());
    }

    #[test]
    fn test_system_default_writes_no_helper() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        assert_eq!(CredentialPolicy::SystemDefault.apply(&repo).unwrap(), 1);
        let config = repo.config().unwrap().open_level(git2::ConfigLevel::Local).unwrap();
        assert!(config.get_string("credential.helper").is_err());
    }

    #[test]
    fn test_classify_auth() {
        let e = err(ErrorCode::Auth, ErrorClass::Callback, "authentication failed");
        assert!(matches!(
            classify_remote_error("https://x/y.git", "main", e),
            SyncError::Authentication { .. }
        ));
        let e = err(ErrorCode::GenericError, ErrorClass::Http, "unexpected http status code: 403");
        assert!(matches!(
            classify_remote_error("https://x/y.git", "main", e),
            SyncError::Authentication { .. }
        ));
    }

    #[test]
    fn test_classify_not_found_and_non_fast_forward() {
        let e = err(ErrorCode::GenericError, ErrorClass::Http, "unexpected http status code: 404");
        assert!(matches!(
            classify_remote_error("u", "main", e),
            SyncError::RepositoryNotFound { .. }
        ));
        let e = err(
            ErrorCode::NotFastForward,
            ErrorClass::Reference,
            "cannot push non-fastforwardable reference",
        );
        assert!(matches!(
            classify_remote_error("u", "laptop", e),
            SyncError::NonFastForward { ref branch } if branch == "laptop"
        ));
    }

    #[test]
    fn test_classify_network_and_other() {
        let e = err(ErrorCode::GenericError, ErrorClass::Net, "failed to connect");
        assert!(matches!(
            classify_remote_error("u", "main", e),
            SyncError::RepositoryAccess { .. }
        ));
        let e = err(ErrorCode::GenericError, ErrorClass::Index, "index is locked");
        assert!(matches!(
            classify_remote_error("u", "main", e),
            SyncError::GitError(_)
        ));
    }

    #[test]
    fn test_auth_hint_mentions_macos_only_on_darwin() {
        assert!(auth_hint(PlatformKind::Darwin).contains("macOS"));
        assert!(!auth_hint(PlatformKind::Linux).contains("macOS"));
    }
}
