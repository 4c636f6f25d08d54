//! Layered configuration for OrcaSync.
//!
//! A configuration document holds global settings, a mapping of named
//! profiles that may override any of them, and per-platform path sets. The
//! [`resolve`] function merges these into a single [`EffectiveConfig`] for
//! one profile on one platform.
//!
//! # Precedence
//!
//! For every setting: profile value (if present and non-null), else global
//! value, else the built-in default. Path sets are chosen as a whole: the
//! profile's `paths` mapping if it has one, else the global `paths`
//! mapping, else the legacy top-level `user_paths` / `system_paths` lists.
//! Within a mapping only the entry for the exact current platform is used.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;
use crate::platform::{self, DiscoveredDirs, PlatformKind};

/// Default local repository directory name.
pub const DEFAULT_REPOSITORY_NAME: &str = "orca-profiles";

/// Default commit message template.
pub const DEFAULT_COMMIT_TEMPLATE: &str = "Sync from {hostname} - {timestamp}";

/// File names tried, in order, when no config path is given.
pub const CONFIG_FILE_NAMES: [&str; 3] = [
    "orcasync.toml",
    "orcasync-config.yaml",
    "orcasync-config.yml",
];

// ---------------------------------------------------------------------------
// Raw document
// ---------------------------------------------------------------------------

/// Settings that may appear globally and in every profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Remote repository URL. Empty means local-only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_url: Option<String>,

    /// Name of the local repository directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_name: Option<String>,

    /// Explicit branch name. When unset the branch is derived from the
    /// hostname.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_prefix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_postfix: Option<String>,

    /// Commit mirrored changes automatically.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_commit: Option<bool>,

    /// Placeholders: `{hostname}`, `{timestamp}`, `{branch}`, `{profile}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_message_template: Option<String>,

    /// Environment variable holding an HTTPS access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    /// Parent directory of the local repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl Settings {
    /// Field-by-field overlay: values set in `over` win.
    pub fn overlay(&self, over: &Settings) -> Settings {
        fn pick<T: Clone>(over: &Option<T>, base: &Option<T>) -> Option<T> {
            over.clone().or_else(|| base.clone())
        }
        Settings {
            repository_url: pick(&over.repository_url, &self.repository_url),
            repository_name: pick(&over.repository_name, &self.repository_name),
            branch_name: pick(&over.branch_name, &self.branch_name),
            branch_prefix: pick(&over.branch_prefix, &self.branch_prefix),
            branch_postfix: pick(&over.branch_postfix, &self.branch_postfix),
            auto_commit: pick(&over.auto_commit, &self.auto_commit),
            commit_message_template: pick(
                &over.commit_message_template,
                &self.commit_message_template,
            ),
            token_env: pick(&over.token_env, &self.token_env),
            data_dir: pick(&over.data_dir, &self.data_dir),
        }
    }
}

/// User and system profile directories for one platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSet {
    #[serde(default, deserialize_with = "nullable_list")]
    pub user_paths: Vec<PathBuf>,

    #[serde(default, deserialize_with = "nullable_list")]
    pub system_paths: Vec<PathBuf>,
}

fn nullable_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<PathBuf>, D::Error> {
    Ok(Option::<Vec<PathBuf>>::deserialize(d)?.unwrap_or_default())
}

/// A named set of overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileOverride {
    #[serde(flatten)]
    pub settings: Settings,

    /// Platform name (`Darwin`, `Windows`, `Linux`) to path set.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub paths: BTreeMap<String, PathSet>,
}

/// The parsed configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,

    #[serde(flatten)]
    pub settings: Settings,

    /// Global platform path sets, used when the profile has none.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub paths: BTreeMap<String, PathSet>,

    /// Legacy platform-agnostic user paths.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_paths: Option<Vec<PathBuf>>,

    /// Legacy platform-agnostic system paths.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_paths: Option<Vec<PathBuf>>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub profiles: BTreeMap<String, ProfileOverride>,
}

// ---------------------------------------------------------------------------
// Document format
// ---------------------------------------------------------------------------

/// On-disk format of a configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
}

impl ConfigFormat {
    /// Detect the format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match ext.as_str() {
            "toml" => Ok(Self::Toml),
            "yaml" | "yml" => Ok(Self::Yaml),
            _ => Err(ConfigError::UnsupportedFormat(ext)),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Toml => "TOML",
            Self::Yaml => "YAML",
        }
    }
}

// ---------------------------------------------------------------------------
// Loading, saving, validation
// ---------------------------------------------------------------------------

impl RawConfig {
    /// Load a document from `path`, choosing the parser by extension.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let format = ConfigFormat::from_path(path)?;
        let contents = std::fs::read_to_string(path)?;
        let config = Self::parse(&contents, format).map_err(|detail| ConfigError::ParseError {
            path: path.display().to_string(),
            format: format.label().into(),
            detail,
        })?;

        debug!(profiles = config.profiles.len(), "configuration parsed successfully");
        Ok(config)
    }

    /// Parse a document from a string. An empty document is valid.
    pub fn parse(contents: &str, format: ConfigFormat) -> Result<Self, String> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        match format {
            ConfigFormat::Toml => toml::from_str(contents).map_err(|e| e.to_string()),
            ConfigFormat::Yaml => serde_yaml::from_str(contents).map_err(|e| e.to_string()),
        }
    }

    /// Write the document to `path` in the format implied by its extension,
    /// creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match ConfigFormat::from_path(path)? {
            ConfigFormat::Toml => toml::to_string_pretty(self)
                .map_err(|e| ConfigError::SerializeError(e.to_string()))?,
            ConfigFormat::Yaml => serde_yaml::to_string(self)
                .map_err(|e| ConfigError::SerializeError(e.to_string()))?,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        info!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Profile names in sorted order.
    pub fn list_profiles(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }

    /// Check every platform key in every path mapping.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_platform_keys(&self.paths, "paths")?;
        for (name, profile) in &self.profiles {
            check_platform_keys(&profile.paths, &format!("profiles.{}.paths", name))?;
        }
        if let Some(name) = self.settings.repository_name.as_deref() {
            check_repository_name(name, "repository_name")?;
        }
        for (name, profile) in &self.profiles {
            if let Some(repo) = profile.settings.repository_name.as_deref() {
                check_repository_name(repo, &format!("profiles.{}.repository_name", name))?;
            }
        }
        Ok(())
    }

    /// A starting document: one `default` profile on a shared `main`
    /// branch, user profile paths for every platform and no system paths.
    ///
    /// Directories discovered on this machine replace the stock location
    /// for the current platform.
    pub fn default_template(
        home: &Path,
        current: PlatformKind,
        discovered: &DiscoveredDirs,
        repository_url: &str,
    ) -> Self {
        let mut paths = BTreeMap::new();
        for kind in PlatformKind::ALL {
            let user_paths = if kind == current && !discovered.user.is_empty() {
                discovered.user.clone()
            } else {
                vec![kind.default_profile_root(home).join("user")]
            };
            paths.insert(
                kind.to_string(),
                PathSet {
                    user_paths,
                    system_paths: Vec::new(),
                },
            );
        }

        let mut profiles = BTreeMap::new();
        profiles.insert(
            "default".to_string(),
            ProfileOverride {
                settings: Settings {
                    branch_name: Some("main".into()),
                    ..Default::default()
                },
                paths,
            },
        );

        Self {
            default_profile: Some("default".into()),
            settings: Settings {
                repository_url: Some(repository_url.to_string()),
                repository_name: Some(DEFAULT_REPOSITORY_NAME.into()),
                auto_commit: Some(true),
                commit_message_template: Some(DEFAULT_COMMIT_TEMPLATE.into()),
                ..Default::default()
            },
            profiles,
            ..Default::default()
        }
    }
}

fn check_platform_keys(paths: &BTreeMap<String, PathSet>, field: &str) -> Result<(), ConfigError> {
    for key in paths.keys() {
        PlatformKind::from_str(key).map_err(|detail| ConfigError::InvalidValue {
            field: format!("{}.{}", field, key),
            detail,
        })?;
    }
    Ok(())
}

fn check_repository_name(name: &str, field: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(ConfigError::InvalidValue {
            field: field.into(),
            detail: format!("'{}' is not a plain directory name", name),
        });
    }
    Ok(())
}

impl FromStr for PlatformKind {
    type Err = String;

    /// Accepts the platform names case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlatformKind::ALL
            .into_iter()
            .find(|kind| kind.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!("unknown platform '{}', expected one of Darwin, Windows, Linux", s)
            })
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Facts about the running host that feed into resolution.
#[derive(Debug, Clone)]
pub struct HostContext {
    pub hostname: String,
    pub home: PathBuf,
}

impl HostContext {
    /// Detect the hostname and home directory of this machine.
    pub fn detect() -> Self {
        Self {
            hostname: platform::hostname(),
            home: dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

/// How the branch name was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchSource {
    Explicit,
    Hostname,
}

/// The merged, platform- and profile-specific configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveConfig {
    /// Active profile, or `None` when global settings are used directly.
    pub profile: Option<String>,
    pub platform: PlatformKind,
    pub hostname: String,
    /// Remote URL; empty in local-only mode.
    pub repository_url: String,
    pub repository_name: String,
    pub repository_path: PathBuf,
    pub branch_name: String,
    pub branch_source: BranchSource,
    pub auto_commit: bool,
    pub commit_message_template: String,
    pub token_env: Option<String>,
    pub user_paths: Vec<PathBuf>,
    pub system_paths: Vec<PathBuf>,
}

impl EffectiveConfig {
    /// Whether a remote repository is configured.
    pub fn has_remote(&self) -> bool {
        !self.repository_url.is_empty()
    }

    /// All configured profile directories, user first.
    pub fn sync_paths(&self) -> Vec<PathBuf> {
        self.user_paths
            .iter()
            .chain(self.system_paths.iter())
            .cloned()
            .collect()
    }

    /// Read the HTTPS token from the environment variable named by
    /// `token_env`, if any.
    pub fn resolve_token(&self) -> Option<String> {
        let env_name = self.token_env.as_deref()?;
        match std::env::var(env_name) {
            Ok(val) if !val.is_empty() => {
                debug!(env_name, "resolved token env var");
                Some(val)
            }
            Ok(_) => {
                warn!(env_name, "token env var is set but empty");
                None
            }
            Err(_) => {
                warn!(env_name, "token env var not set");
                None
            }
        }
    }
}

/// Merge `raw` into the effective configuration for `profile` on
/// `platform`.
///
/// `profile` falls back to `default_profile`. When the document defines no
/// profiles at all the global fields are used directly. Fails when a
/// requested profile is missing or a platform key is misspelled.
pub fn resolve(
    raw: &RawConfig,
    profile: Option<&str>,
    platform: PlatformKind,
    host: &HostContext,
) -> Result<EffectiveConfig, ConfigError> {
    raw.validate()?;

    let requested = profile.or(raw.default_profile.as_deref());
    let selected = match requested {
        _ if raw.profiles.is_empty() => None,
        None => None,
        Some(name) => match raw.profiles.get(name) {
            Some(overrides) => Some((name, overrides)),
            None => {
                return Err(ConfigError::UnknownProfile {
                    name: name.to_string(),
                    available: raw.list_profiles().join(", "),
                })
            }
        },
    };

    let settings = match selected {
        Some((_, overrides)) => raw.settings.overlay(&overrides.settings),
        None => raw.settings.clone(),
    };

    let path_set = select_path_set(raw, selected.map(|(_, p)| p), platform);
    let (branch_name, branch_source) = resolve_branch(&settings, &host.hostname);

    let repository_name = settings
        .repository_name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_REPOSITORY_NAME.to_string());
    let data_dir = settings
        .data_dir
        .as_deref()
        .map(|d| expand_tilde(d, &host.home))
        .unwrap_or_else(|| host.home.join(".local").join("share").join("orcasync"));

    let effective = EffectiveConfig {
        profile: selected.map(|(name, _)| name.to_string()),
        platform,
        hostname: host.hostname.clone(),
        repository_url: settings.repository_url.clone().unwrap_or_default(),
        repository_path: data_dir.join(&repository_name),
        repository_name,
        branch_name,
        branch_source,
        auto_commit: settings.auto_commit.unwrap_or(true),
        commit_message_template: settings
            .commit_message_template
            .clone()
            .unwrap_or_else(|| DEFAULT_COMMIT_TEMPLATE.to_string()),
        token_env: settings.token_env.clone().filter(|t| !t.is_empty()),
        user_paths: expand_all(&path_set.user_paths, &host.home),
        system_paths: expand_all(&path_set.system_paths, &host.home),
    };

    info!(
        profile = effective.profile.as_deref().unwrap_or("<global>"),
        platform = %platform,
        branch = %effective.branch_name,
        user_paths = effective.user_paths.len(),
        system_paths = effective.system_paths.len(),
        "configuration resolved"
    );
    Ok(effective)
}

fn select_path_set(
    raw: &RawConfig,
    profile: Option<&ProfileOverride>,
    platform: PlatformKind,
) -> PathSet {
    let mapping = match profile {
        Some(p) if !p.paths.is_empty() => Some(&p.paths),
        _ if !raw.paths.is_empty() => Some(&raw.paths),
        _ => None,
    };

    match mapping {
        Some(mapping) => mapping
            .iter()
            .find(|(key, _)| PlatformKind::from_str(key).ok() == Some(platform))
            .map(|(_, set)| set.clone())
            .unwrap_or_else(|| {
                debug!(platform = %platform, "no path set for current platform");
                PathSet::default()
            }),
        None => PathSet {
            user_paths: raw.user_paths.clone().unwrap_or_default(),
            system_paths: raw.system_paths.clone().unwrap_or_default(),
        },
    }
}

fn resolve_branch(settings: &Settings, hostname: &str) -> (String, BranchSource) {
    if let Some(name) = settings.branch_name.as_deref().filter(|n| !n.trim().is_empty()) {
        return (name.trim().to_string(), BranchSource::Explicit);
    }
    let prefix = settings.branch_prefix.as_deref().unwrap_or("");
    let postfix = settings.branch_postfix.as_deref().unwrap_or("");
    (
        format!("{}{}{}", prefix, sanitize_ref_component(hostname), postfix),
        BranchSource::Hostname,
    )
}

/// Replace characters Git does not allow in ref names.
fn sanitize_ref_component(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ' ' | '~' | '^' | ':' | '?' | '*' | '[' | '\\' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect()
}

/// Expand a leading `~` to `home`.
pub fn expand_tilde(path: &Path, home: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home.join(rest),
        Err(_) => path.to_path_buf(),
    }
}

fn expand_all(paths: &[PathBuf], home: &Path) -> Vec<PathBuf> {
    paths.iter().map(|p| expand_tilde(p, home)).collect()
}

/// Locate the configuration file.
///
/// Probes [`CONFIG_FILE_NAMES`] in `cwd`, then in `<home>/.config/orcasync`.
/// When nothing exists the default location is returned.
pub fn find_config_file(cwd: &Path, home: &Path) -> PathBuf {
    let config_dir = home.join(".config").join("orcasync");
    for dir in [cwd, config_dir.as_path()] {
        for name in CONFIG_FILE_NAMES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                debug!(path = %candidate.display(), "found configuration file");
                return candidate;
            }
        }
    }
    config_dir.join(CONFIG_FILE_NAMES[0])
}

/// Convenience: load `path` and resolve it for this host and platform.
pub fn load_and_resolve<P: AsRef<Path>>(
    path: P,
    profile: Option<&str>,
) -> Result<EffectiveConfig, ConfigError> {
    let raw = RawConfig::load_from_file(path)?;
    resolve(&raw, profile, PlatformKind::current(), &HostContext::detect())
}
