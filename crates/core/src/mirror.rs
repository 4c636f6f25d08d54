//! Directory mirroring between profile directories and the repository.
//!
//! Each category of profiles lives under its own subtree of the repository
//! (`profiles/user`, `profiles/system`). Mirroring makes a target tree
//! byte-identical to a source tree: missing files are copied, differing
//! files are overwritten, and files absent from the source are deleted.
//! Files with identical contents are never rewritten.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::errors::{PathError, SyncError};

/// Profile category, each mirrored into its own repository subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    User,
    System,
}

impl Category {
    pub const ALL: [Category; 2] = [Self::User, Self::System];

    /// Subtree of the repository holding this category.
    pub fn subtree(&self) -> PathBuf {
        Path::new("profiles").join(self.to_string())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::System => write!(f, "system"),
        }
    }
}

/// Two source directories provided the same relative file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Collision {
    pub relative: PathBuf,
    /// Source file that was mirrored (the later configured directory).
    pub winner: PathBuf,
    pub shadowed: PathBuf,
}

/// What a mirror pass changed. Paths are destination paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MirrorReport {
    pub added: Vec<PathBuf>,
    pub changed: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    pub collisions: Vec<Collision>,
    pub warnings: Vec<PathError>,
}

impl MirrorReport {
    /// Number of files written or deleted.
    pub fn total_changes(&self) -> usize {
        self.added.len() + self.changed.len() + self.removed.len()
    }

    pub fn is_unchanged(&self) -> bool {
        self.total_changes() == 0
    }

    pub fn absorb(&mut self, other: MirrorReport) {
        self.added.extend(other.added);
        self.changed.extend(other.changed);
        self.removed.extend(other.removed);
        self.collisions.extend(other.collisions);
        self.warnings.extend(other.warnings);
    }
}

/// Marker kept at the root of every synced repository subtree. Git does not
/// track empty directories; the marker keeps a category whose profiles were
/// all deleted distinguishable from one that was never synced.
pub const KEEP_FILE: &str = ".orcasync-keep";

/// Prefix of the staging directory created inside a target while copying.
const STAGING_PREFIX: &str = ".orcasync-stage";

/// Relative path to absolute source file.
type FileMap = BTreeMap<PathBuf, PathBuf>;

fn mirror_err(path: &Path) -> impl FnOnce(io::Error) -> SyncError + '_ {
    move |source| SyncError::Mirror {
        path: path.to_path_buf(),
        source,
    }
}

/// Mirror `sources` into the `category` subtree of `repo_root`.
///
/// Missing sources are skipped with a warning. When every configured
/// source is missing the repository subtree is left untouched. When the
/// same relative file exists in several sources the last configured one
/// wins and the collision is reported.
pub fn mirror_into(
    sources: &[PathBuf],
    repo_root: &Path,
    category: Category,
) -> Result<MirrorReport, SyncError> {
    let mut report = MirrorReport::default();
    if sources.is_empty() {
        debug!(%category, "no source directories configured, skipping");
        return Ok(report);
    }

    let mut usable = Vec::new();
    for source in sources {
        if !source.exists() {
            warn!(%category, path = %source.display(), "source directory does not exist");
            report.warnings.push(PathError::SourceMissing {
                category,
                path: source.clone(),
            });
        } else if !source.is_dir() {
            warn!(path = %source.display(), "source path is not a directory");
            report.warnings.push(PathError::NotADirectory {
                path: source.clone(),
            });
        } else {
            usable.push(source);
        }
    }

    if usable.is_empty() {
        warn!(%category, "all source directories are missing, leaving repository untouched");
        report.warnings.push(PathError::AllSourcesMissing { category });
        return Ok(report);
    }

    let mut desired = FileMap::new();
    for source in usable {
        let tree = scan_tree(source)?;
        report.warnings.extend(tree.symlink_warnings(source));
        for (relative, file) in tree.files {
            if let Some(previous) = desired.insert(relative.clone(), file.clone()) {
                warn!(
                    relative = %relative.display(),
                    winner = %file.display(),
                    shadowed = %previous.display(),
                    "profile exists in several source directories, using the last"
                );
                report.collisions.push(Collision {
                    relative,
                    winner: file,
                    shadowed: previous,
                });
            }
        }
    }

    let target = repo_root.join(category.subtree());
    std::fs::create_dir_all(&target).map_err(mirror_err(&target))?;
    let keep = target.join(KEEP_FILE);
    if !keep.exists() {
        std::fs::write(&keep, "").map_err(mirror_err(&keep))?;
    }
    reconcile(&desired, &target, &mut report)?;

    info!(
        %category,
        added = report.added.len(),
        changed = report.changed.len(),
        removed = report.removed.len(),
        "mirrored profiles into repository"
    );
    Ok(report)
}

/// Mirror the `category` subtree of `repo_root` out to every destination.
///
/// If the repository has no such subtree the destinations are left alone.
/// Destinations that do not exist yet are created.
pub fn mirror_out(
    destinations: &[PathBuf],
    repo_root: &Path,
    category: Category,
) -> Result<MirrorReport, SyncError> {
    let mut report = MirrorReport::default();
    let source = repo_root.join(category.subtree());
    if !source.is_dir() {
        debug!(%category, "repository has no subtree for category, skipping");
        return Ok(report);
    }

    let tree = scan_tree(&source)?;
    report.warnings.extend(tree.symlink_warnings(&source));
    let desired = tree.files;

    for destination in destinations {
        if destination.exists() && !destination.is_dir() {
            warn!(path = %destination.display(), "destination path is not a directory");
            report.warnings.push(PathError::NotADirectory {
                path: destination.clone(),
            });
            continue;
        }
        std::fs::create_dir_all(destination).map_err(mirror_err(destination))?;
        reconcile(&desired, destination, &mut report)?;
    }

    info!(
        %category,
        destinations = destinations.len(),
        added = report.added.len(),
        changed = report.changed.len(),
        removed = report.removed.len(),
        "mirrored profiles out of repository"
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// Tree scanning
// ---------------------------------------------------------------------------

/// Regular files and symbolic links found under a root, keyed by relative
/// path. Links are recorded but never followed.
#[derive(Debug, Default)]
struct TreeScan {
    files: FileMap,
    symlinks: Vec<PathBuf>,
}

impl TreeScan {
    fn symlink_warnings(&self, root: &Path) -> Vec<PathError> {
        self.symlinks
            .iter()
            .map(|relative| {
                let path = root.join(relative);
                warn!(path = %path.display(), "skipping symbolic link");
                PathError::Symlink { path }
            })
            .collect()
    }

    /// True when `relative` is a link or lies beneath one.
    fn crosses_symlink(&self, relative: &Path) -> bool {
        self.symlinks.iter().any(|link| relative.starts_with(link))
    }

    /// Links strictly beneath directory `relative`.
    fn has_symlink_under(&self, relative: &Path) -> bool {
        self.symlinks
            .iter()
            .any(|link| link != relative && link.starts_with(relative))
    }
}

/// Walk `root` without following links. The keep marker and any staging
/// directory at the root are not collected.
fn scan_tree(root: &Path) -> Result<TreeScan, SyncError> {
    let mut scan = TreeScan::default();
    if !root.is_dir() {
        return Ok(scan);
    }

    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            !(e.depth() == 1 && e.file_name().to_string_lossy().starts_with(STAGING_PREFIX))
        });
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            SyncError::Mirror {
                path,
                source: e.into(),
            }
        })?;
        if entry.depth() == 1 && entry.file_name() == KEEP_FILE {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            scan.symlinks.push(relative.to_path_buf());
        } else if file_type.is_file() {
            scan.files
                .insert(relative.to_path_buf(), entry.path().to_path_buf());
        } else if !file_type.is_dir() {
            debug!(path = %entry.path().display(), "skipping special file");
        }
    }
    Ok(scan)
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

struct PlannedWrite<'a> {
    source: &'a Path,
    destination: PathBuf,
    added: bool,
    /// A real directory sits where the file goes.
    replaces_dir: bool,
}

/// Everything a reconcile pass will do, computed before touching `target`.
struct Plan<'a> {
    writes: Vec<PlannedWrite<'a>>,
    /// Stale files standing in the way of a write.
    obstructions: Vec<PathBuf>,
    removals: Vec<PathBuf>,
}

fn build_plan<'a>(
    desired: &'a FileMap,
    target: &Path,
    existing: &TreeScan,
    report: &mut MirrorReport,
) -> Result<Plan<'a>, SyncError> {
    let mut writes = Vec::new();
    let mut obstructing = BTreeSet::new();

    for (relative, source) in desired {
        let destination = target.join(relative);
        if existing.crosses_symlink(relative) {
            debug!(path = %destination.display(), "destination crosses a symbolic link, not written");
            continue;
        }
        if let Some(current) = existing.files.get(relative) {
            if same_contents(source, current).map_err(mirror_err(current))? {
                continue;
            }
            writes.push(PlannedWrite {
                source,
                destination,
                added: false,
                replaces_dir: false,
            });
            continue;
        }

        let replaces_dir = destination.is_dir();
        if replaces_dir && existing.has_symlink_under(relative) {
            warn!(path = %destination.display(), "directory holds symbolic links, not replaced");
            report.warnings.push(PathError::Symlink { path: destination });
            continue;
        }
        for stale in existing.files.keys() {
            let blocks = relative.starts_with(stale) || (replaces_dir && stale.starts_with(relative));
            if blocks && !desired.contains_key(stale) {
                obstructing.insert(stale.clone());
            }
        }
        writes.push(PlannedWrite {
            source,
            destination,
            added: true,
            replaces_dir,
        });
    }

    let mut obstructions = Vec::new();
    let mut removals = Vec::new();
    for relative in existing.files.keys().filter(|r| !desired.contains_key(*r)) {
        let path = target.join(relative);
        if obstructing.contains(relative) {
            obstructions.push(path);
        } else {
            removals.push(path);
        }
    }

    Ok(Plan {
        writes,
        obstructions,
        removals,
    })
}

/// Make `target` hold exactly the files in `desired`.
///
/// The whole pass is planned first and every new or changed file is copied
/// into a staging directory inside `target`. Only then is `target` touched:
/// stale files in the way of a write go first, each staged file is renamed
/// into place, and the remaining stale files are deleted last. Symbolic
/// links in `target` are left alone.
fn reconcile(desired: &FileMap, target: &Path, report: &mut MirrorReport) -> Result<(), SyncError> {
    let existing = scan_tree(target)?;
    report.warnings.extend(existing.symlink_warnings(target));
    let plan = build_plan(desired, target, &existing, report)?;

    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(target)
        .map_err(mirror_err(target))?;
    let mut staged = Vec::with_capacity(plan.writes.len());
    for (index, write) in plan.writes.iter().enumerate() {
        let path = staging.path().join(index.to_string());
        std::fs::copy(write.source, &path).map_err(mirror_err(write.source))?;
        staged.push(path);
    }

    for path in &plan.obstructions {
        remove_stale(path, target, report)?;
    }

    for (write, staged_path) in plan.writes.iter().zip(&staged) {
        let destination = &write.destination;
        if write.replaces_dir && destination.is_dir() {
            std::fs::remove_dir_all(destination).map_err(mirror_err(destination))?;
        }
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).map_err(mirror_err(parent))?;
        }
        std::fs::rename(staged_path, destination).map_err(mirror_err(destination))?;
        if write.added {
            debug!(path = %destination.display(), "added file");
            report.added.push(destination.clone());
        } else {
            debug!(path = %destination.display(), "updated file");
            report.changed.push(destination.clone());
        }
    }

    for path in &plan.removals {
        remove_stale(path, target, report)?;
    }

    staging.close().map_err(mirror_err(target))?;
    Ok(())
}

fn remove_stale(path: &Path, target: &Path, report: &mut MirrorReport) -> Result<(), SyncError> {
    std::fs::remove_file(path).map_err(mirror_err(path))?;
    debug!(path = %path.display(), "removed stale file");
    report.removed.push(path.to_path_buf());
    prune_empty_parents(path, target)
}

/// Remove now-empty directories between `file` and `stop` (exclusive).
fn prune_empty_parents(file: &Path, stop: &Path) -> Result<(), SyncError> {
    let mut current = file.parent();
    while let Some(dir) = current {
        if dir == stop || !dir.starts_with(stop) {
            break;
        }
        let is_empty = std::fs::read_dir(dir)
            .map_err(mirror_err(dir))?
            .next()
            .is_none();
        if !is_empty {
            break;
        }
        std::fs::remove_dir(dir).map_err(mirror_err(dir))?;
        debug!(path = %dir.display(), "pruned empty directory");
        current = dir.parent();
    }
    Ok(())
}

fn same_contents(a: &Path, b: &Path) -> io::Result<bool> {
    if std::fs::metadata(a)?.len() != std::fs::metadata(b)?.len() {
        return Ok(false);
    }
    Ok(std::fs::read(a)? == std::fs::read(b)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, contents: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[test]
    fn test_category_subtree() {
        assert_eq!(Category::User.subtree(), PathBuf::from("profiles/user"));
        assert_eq!(Category::System.subtree(), PathBuf::from("profiles/system"));
    }

    #[test]
    fn test_mirror_into_copies_nested_files() {
        let src = tempfile::tempdir().unwrap();
        let repo = tempfile::tempdir().unwrap();
        write(&src.path().join("filament/PLA.json"), "{\"temp\": 210}");
        write(&src.path().join("printer.json"), "{}");

        let report = mirror_into(&[src.path().to_path_buf()], repo.path(), Category::User).unwrap();
        assert_eq!(report.added.len(), 2);
        assert_eq!(
            read(&repo.path().join("profiles/user/filament/PLA.json")),
            "{\"temp\": 210}"
        );
        assert!(repo.path().join("profiles/user/printer.json").is_file());
    }

    #[test]
    fn test_mirror_into_is_idempotent() {
        let src = tempfile::tempdir().unwrap();
        let repo = tempfile::tempdir().unwrap();
        write(&src.path().join("a.json"), "a");
        let sources = [src.path().to_path_buf()];

        mirror_into(&sources, repo.path(), Category::User).unwrap();
        let second = mirror_into(&sources, repo.path(), Category::User).unwrap();
        assert!(second.is_unchanged());
    }

    #[test]
    fn test_mirror_into_updates_and_deletes() {
        let src = tempfile::tempdir().unwrap();
        let repo = tempfile::tempdir().unwrap();
        write(&src.path().join("keep.json"), "v1");
        write(&src.path().join("deep/gone.json"), "x");
        let sources = [src.path().to_path_buf()];
        mirror_into(&sources, repo.path(), Category::User).unwrap();

        write(&src.path().join("keep.json"), "v2");
        std::fs::remove_dir_all(src.path().join("deep")).unwrap();
        let report = mirror_into(&sources, repo.path(), Category::User).unwrap();

        assert_eq!(report.changed.len(), 1);
        assert_eq!(report.removed.len(), 1);
        assert_eq!(read(&repo.path().join("profiles/user/keep.json")), "v2");
        assert!(!repo.path().join("profiles/user/deep").exists());
        assert!(repo.path().join("profiles/user").is_dir());
    }

    #[test]
    fn test_mirror_into_never_touches_other_subtrees() {
        let src = tempfile::tempdir().unwrap();
        let repo = tempfile::tempdir().unwrap();
        write(&repo.path().join("README.md"), "# readme");
        write(&repo.path().join("profiles/system/vendor.json"), "{}");
        write(&src.path().join("a.json"), "a");

        mirror_into(&[src.path().to_path_buf()], repo.path(), Category::User).unwrap();
        assert!(repo.path().join("README.md").is_file());
        assert!(repo.path().join("profiles/system/vendor.json").is_file());
    }

    #[test]
    fn test_emptied_category_still_mirrors_out() {
        let src = tempfile::tempdir().unwrap();
        let repo = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        write(&src.path().join("only.json"), "x");
        let sources = [src.path().to_path_buf()];
        mirror_into(&sources, repo.path(), Category::User).unwrap();
        assert!(repo.path().join("profiles/user").join(KEEP_FILE).is_file());

        std::fs::remove_file(src.path().join("only.json")).unwrap();
        let report = mirror_into(&sources, repo.path(), Category::User).unwrap();
        assert_eq!(report.removed.len(), 1);

        write(&dest.path().join("only.json"), "x");
        let report = mirror_out(&[dest.path().to_path_buf()], repo.path(), Category::User).unwrap();
        assert_eq!(report.removed, vec![dest.path().join("only.json")]);
        assert!(!dest.path().join(KEEP_FILE).exists());
    }

    #[test]
    fn test_mirror_into_last_source_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let repo = tempfile::tempdir().unwrap();
        write(&first.path().join("shared.json"), "first");
        write(&first.path().join("only_first.json"), "1");
        write(&second.path().join("shared.json"), "second");

        let report = mirror_into(
            &[first.path().to_path_buf(), second.path().to_path_buf()],
            repo.path(),
            Category::User,
        )
        .unwrap();

        assert_eq!(read(&repo.path().join("profiles/user/shared.json")), "second");
        assert!(repo.path().join("profiles/user/only_first.json").is_file());
        assert_eq!(report.collisions.len(), 1);
        assert_eq!(report.collisions[0].relative, PathBuf::from("shared.json"));
        assert_eq!(report.collisions[0].winner, second.path().join("shared.json"));
    }

    #[test]
    fn test_mirror_into_all_sources_missing_leaves_repo() {
        let repo = tempfile::tempdir().unwrap();
        write(&repo.path().join("profiles/user/a.json"), "a");

        let report = mirror_into(
            &[repo.path().join("nope")],
            repo.path(),
            Category::User,
        )
        .unwrap();

        assert!(report.is_unchanged());
        assert!(report
            .warnings
            .contains(&PathError::AllSourcesMissing { category: Category::User }));
        assert!(repo.path().join("profiles/user/a.json").is_file());
    }

    #[test]
    fn test_mirror_into_partial_missing_warns_and_continues() {
        let src = tempfile::tempdir().unwrap();
        let repo = tempfile::tempdir().unwrap();
        write(&src.path().join("a.json"), "a");
        let missing = src.path().join("missing");

        let report = mirror_into(
            &[missing.clone(), src.path().to_path_buf()],
            repo.path(),
            Category::System,
        )
        .unwrap();

        assert_eq!(report.added.len(), 1);
        assert_eq!(
            report.warnings,
            vec![PathError::SourceMissing {
                category: Category::System,
                path: missing
            }]
        );
    }

    #[test]
    fn test_mirror_into_no_sources_configured() {
        let repo = tempfile::tempdir().unwrap();
        let report = mirror_into(&[], repo.path(), Category::User).unwrap();
        assert_eq!(report, MirrorReport::default());
        assert!(!repo.path().join("profiles").exists());
    }

    #[test]
    fn test_mirror_out_creates_destinations() {
        let repo = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write(&repo.path().join("profiles/user/process/fine.json"), "fine");
        let dest = out.path().join("OrcaSlicer/user");

        let report = mirror_out(&[dest.clone()], repo.path(), Category::User).unwrap();
        assert_eq!(report.added, vec![dest.join("process/fine.json")]);
        assert_eq!(read(&dest.join("process/fine.json")), "fine");
    }

    #[test]
    fn test_mirror_out_deletes_extras_in_every_destination() {
        let repo = tempfile::tempdir().unwrap();
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        write(&repo.path().join("profiles/user/keep.json"), "keep");
        write(&a.path().join("stale.json"), "old");
        write(&b.path().join("nested/stale.json"), "old");

        let report = mirror_out(
            &[a.path().to_path_buf(), b.path().to_path_buf()],
            repo.path(),
            Category::User,
        )
        .unwrap();

        assert_eq!(report.removed.len(), 2);
        assert_eq!(report.added.len(), 2);
        assert!(!a.path().join("stale.json").exists());
        assert!(!b.path().join("nested").exists());
        assert!(b.path().join("keep.json").is_file());
    }

    #[test]
    fn test_mirror_out_without_subtree_leaves_destinations() {
        let repo = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        write(&dest.path().join("local.json"), "mine");

        let report = mirror_out(&[dest.path().to_path_buf()], repo.path(), Category::System).unwrap();
        assert!(report.is_unchanged());
        assert!(dest.path().join("local.json").is_file());
    }

    #[test]
    fn test_mirror_out_skips_file_destination() {
        let repo = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        write(&repo.path().join("profiles/user/a.json"), "a");
        let file_dest = dir.path().join("user");
        write(&file_dest, "i am a file");

        let report = mirror_out(&[file_dest.clone()], repo.path(), Category::User).unwrap();
        assert_eq!(report.warnings, vec![PathError::NotADirectory { path: file_dest.clone() }]);
        assert_eq!(read(&file_dest), "i am a file");
    }

    #[test]
    fn test_file_replaces_directory_of_same_name() {
        let src = tempfile::tempdir().unwrap();
        let repo = tempfile::tempdir().unwrap();
        write(&repo.path().join("profiles/user/thing/inner.json"), "old");
        write(&src.path().join("thing"), "now a file");

        let report = mirror_into(&[src.path().to_path_buf()], repo.path(), Category::User).unwrap();
        assert_eq!(report.removed.len(), 1);
        assert_eq!(read(&repo.path().join("profiles/user/thing")), "now a file");
    }

    #[test]
    fn test_directory_replaces_file_of_same_name() {
        let repo = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        write(&repo.path().join("profiles/user/thing/inner.json"), "new");
        write(&dest.path().join("thing"), "old file");

        let report = mirror_out(&[dest.path().to_path_buf()], repo.path(), Category::User).unwrap();
        assert_eq!(report.removed, vec![dest.path().join("thing")]);
        assert_eq!(read(&dest.path().join("thing/inner.json")), "new");
    }

    #[test]
    fn test_failed_copy_leaves_target_untouched() {
        let src = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        write(&src.path().join("keep.json"), "v2");
        write(&target.path().join("keep.json"), "v1");
        write(&target.path().join("stale.json"), "old");

        let mut desired = FileMap::new();
        desired.insert(PathBuf::from("keep.json"), src.path().join("keep.json"));
        desired.insert(PathBuf::from("new.json"), src.path().join("vanished.json"));

        let mut report = MirrorReport::default();
        let err = reconcile(&desired, target.path(), &mut report).unwrap_err();
        assert!(matches!(err, SyncError::Mirror { .. }));

        assert!(report.is_unchanged());
        assert_eq!(read(&target.path().join("keep.json")), "v1");
        assert_eq!(read(&target.path().join("stale.json")), "old");
        assert!(!target.path().join("new.json").exists());
        let leftovers: Vec<_> = std::fs::read_dir(target.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .filter(|n| n.to_string_lossy().starts_with(STAGING_PREFIX))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_no_staging_directory_left_after_mirror() {
        let src = tempfile::tempdir().unwrap();
        let repo = tempfile::tempdir().unwrap();
        write(&src.path().join("a.json"), "a");

        mirror_into(&[src.path().to_path_buf()], repo.path(), Category::User).unwrap();
        let mut names: Vec<_> = std::fs::read_dir(repo.path().join("profiles/user"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec![KEEP_FILE.to_string(), "a.json".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directory_in_destination_is_not_followed() {
        let repo = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        write(&repo.path().join("profiles/user/a.json"), "a");
        write(&outside.path().join("precious.json"), "keep me");
        let link = dest.path().join("linked");
        std::os::unix::fs::symlink(outside.path(), &link).unwrap();

        let report = mirror_out(&[dest.path().to_path_buf()], repo.path(), Category::User).unwrap();

        assert_eq!(read(&outside.path().join("precious.json")), "keep me");
        assert!(std::fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert!(report.removed.is_empty());
        assert_eq!(report.added, vec![dest.path().join("a.json")]);
        assert!(report.warnings.contains(&PathError::Symlink { path: link }));
    }

    #[cfg(unix)]
    #[test]
    fn test_repository_file_under_destination_symlink_is_skipped() {
        let repo = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        write(&repo.path().join("profiles/user/linked/precious.json"), "from repo");
        write(&outside.path().join("precious.json"), "keep me");
        std::os::unix::fs::symlink(outside.path(), dest.path().join("linked")).unwrap();

        let report = mirror_out(&[dest.path().to_path_buf()], repo.path(), Category::User).unwrap();

        assert!(report.is_unchanged());
        assert_eq!(read(&outside.path().join("precious.json")), "keep me");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_in_source_is_not_mirrored() {
        let src = tempfile::tempdir().unwrap();
        let repo = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        write(&src.path().join("a.json"), "a");
        write(&outside.path().join("elsewhere.json"), "x");
        std::os::unix::fs::symlink(outside.path(), src.path().join("loop")).unwrap();
        std::os::unix::fs::symlink(src.path(), src.path().join("self")).unwrap();

        let report = mirror_into(&[src.path().to_path_buf()], repo.path(), Category::User).unwrap();

        assert_eq!(report.added, vec![repo.path().join("profiles/user/a.json")]);
        assert!(!repo.path().join("profiles/user/loop").exists());
        assert!(!repo.path().join("profiles/user/self").exists());
        assert_eq!(
            report
                .warnings
                .iter()
                .filter(|w| matches!(w, PathError::Symlink { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn test_report_absorb() {
        let mut a = MirrorReport {
            added: vec![PathBuf::from("x")],
            ..Default::default()
        };
        let b = MirrorReport {
            removed: vec![PathBuf::from("y")],
            ..Default::default()
        };
        a.absorb(b);
        assert_eq!(a.total_changes(), 2);
    }
}
