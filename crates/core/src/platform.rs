//! Platform detection and profile directory discovery.
//!
//! The running operating system is mapped to a closed [`PlatformKind`] which
//! selects the path set used for syncing. Discovery checks the locations the
//! slicer is known to keep its `user` and `system` profile directories in.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Name of the slicer's application directory.
const APP_DIR: &str = "OrcaSlicer";

/// Operating-system category used to select a path set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PlatformKind {
    Darwin,
    Windows,
    Linux,
}

impl PlatformKind {
    /// All platform kinds, in the order they are written to new configs.
    pub const ALL: [PlatformKind; 3] = [Self::Darwin, Self::Windows, Self::Linux];

    /// The platform kind of the running process. Unix flavours other than
    /// macOS share the Linux path conventions.
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::Darwin
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else {
            Self::Linux
        }
    }

    /// The stock profile root of the slicer for this platform, relative to
    /// the user's home directory.
    pub fn default_profile_root(&self, home: &Path) -> PathBuf {
        match self {
            Self::Windows => home.join("AppData").join("Roaming").join(APP_DIR),
            Self::Darwin => home
                .join("Library")
                .join("Application Support")
                .join(APP_DIR),
            Self::Linux => home.join(".config").join(APP_DIR),
        }
    }

    /// Secondary locations that may hold a profile root.
    fn extra_profile_roots(&self, roots: &SearchRoots) -> Vec<PathBuf> {
        let home = &roots.home;
        match self {
            Self::Windows => {
                let mut extra = Vec::new();
                if let Some(local) = &roots.local_app_data {
                    extra.push(local.join(APP_DIR));
                }
                for program_files in &roots.program_files {
                    extra.push(program_files.join(APP_DIR));
                }
                extra.push(home.join(APP_DIR));
                extra
            }
            Self::Darwin => vec![
                home.join(".config").join(APP_DIR),
                PathBuf::from("/Applications/OrcaSlicer.app/Contents/Resources/profiles"),
            ],
            Self::Linux => vec![
                home.join(".local").join("share").join(APP_DIR),
                home.join(APP_DIR),
            ],
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Darwin => write!(f, "Darwin"),
            Self::Windows => write!(f, "Windows"),
            Self::Linux => write!(f, "Linux"),
        }
    }
}

/// Base directories consulted during discovery.
#[derive(Debug, Clone)]
pub struct SearchRoots {
    pub home: PathBuf,
    pub local_app_data: Option<PathBuf>,
    pub program_files: Vec<PathBuf>,
}

impl SearchRoots {
    /// Roots for the current user, read from the environment.
    pub fn from_env() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let program_files = ["PROGRAMFILES", "PROGRAMFILES(X86)"]
            .iter()
            .filter_map(|var| std::env::var_os(var))
            .map(PathBuf::from)
            .collect();
        Self {
            home,
            local_app_data: std::env::var_os("LOCALAPPDATA").map(PathBuf::from),
            program_files,
        }
    }

    /// Roots anchored at `home` only.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            local_app_data: None,
            program_files: Vec::new(),
        }
    }
}

/// Profile directories found on this machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredDirs {
    pub user: Vec<PathBuf>,
    pub system: Vec<PathBuf>,
}

impl DiscoveredDirs {
    pub fn is_empty(&self) -> bool {
        self.user.is_empty() && self.system.is_empty()
    }
}

/// Probe the standard and secondary profile locations for `kind`.
///
/// Returns every existing `user` / `system` directory, without duplicates,
/// in search order (standard location first).
pub fn discover_profile_dirs(kind: PlatformKind, roots: &SearchRoots) -> DiscoveredDirs {
    let mut found = DiscoveredDirs::default();
    let mut candidates = vec![kind.default_profile_root(&roots.home)];
    candidates.extend(kind.extra_profile_roots(roots));

    for base in candidates {
        for (name, bucket) in [("user", &mut found.user), ("system", &mut found.system)] {
            let dir = base.join(name);
            if dir.is_dir() && !bucket.contains(&dir) {
                debug!(platform = %kind, path = %dir.display(), "discovered profile directory");
                bucket.push(dir);
            }
        }
    }
    found
}

/// Hostname of this machine, or `"unknown"`.
pub fn hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
