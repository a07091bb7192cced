//! Operation classification: raw change events to catalog operations.
//!
//! A batch of watcher events is reduced to a deduplicated, ordered set of
//! semantic operations targeting version or product directories. Kinds are
//! decided from the event tags, except for file-level events where the
//! parent directory is re-inspected on disk at classification time.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use imgstream_core::error::{Result, StreamError};
use imgstream_core::event::{ChangeEvent, EventTag};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Version directory name pattern, prefix-anchored (`YYYYMMDD_HH:MM`).
static VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{8}_\d{2}:\d{2}").expect("valid version pattern"));

/// Whether a directory name is a version directory name.
pub fn is_version_name(name: &str) -> bool {
    VERSION_RE.is_match(name)
}

/// What an operation does to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationKind {
    /// Rebuild the target version from disk
    AddMod,
    /// Remove the target from the catalog
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::AddMod => write!(f, "ADD_MOD"),
            OperationKind::Delete => write!(f, "DELETE"),
        }
    }
}

/// Derive an operation kind from a set of event tags.
///
/// Returns `None` when no tag is classifiable (such events produce no
/// operation at all).
pub fn kind_from_tags(tags: &[EventTag]) -> Option<OperationKind> {
    for tag in tags {
        match tag {
            EventTag::CloseWrite | EventTag::MovedTo | EventTag::Attrib | EventTag::Create => {
                return Some(OperationKind::AddMod)
            }
            EventTag::Delete | EventTag::MovedFrom => return Some(OperationKind::Delete),
        }
    }
    None
}

/// A semantic catalog operation.
///
/// Equality and hashing cover only `(path, kind)`, so a set of operations
/// deduplicates regardless of how the operation was derived.
#[derive(Debug, Clone)]
pub struct Operation {
    /// Target directory (a version directory, or for root operations the
    /// affected ancestor directory)
    pub path: PathBuf,

    /// Colon-joined product name derived from the root-relative path
    pub name: String,

    /// What to do with the target
    pub kind: OperationKind,

    /// The watched image root the path is relative to
    pub root: PathBuf,

    /// Whether this is a root-level operation on an ancestor directory
    pub is_root: bool,
}

impl Operation {
    /// Create an operation on a version directory.
    ///
    /// The product name is the colon-joined path from the root to the
    /// version directory's parent.
    pub fn new(path: PathBuf, kind: OperationKind, root: &Path) -> Result<Self> {
        let name = product_name(&path, root, false)?;
        Ok(Self {
            path,
            name,
            kind,
            root: root.to_path_buf(),
            is_root: false,
        })
    }

    /// Create a root-level operation on an ancestor directory.
    ///
    /// The product name is the colon-joined path from the root to the
    /// affected directory itself.
    pub fn new_root(path: PathBuf, kind: OperationKind, root: &Path) -> Result<Self> {
        let name = product_name(&path, root, true)?;
        Ok(Self {
            path,
            name,
            kind,
            root: root.to_path_buf(),
            is_root: true,
        })
    }

    /// The target directory's final path segment (the version name for
    /// non-root operations).
    pub fn version_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

impl PartialEq for Operation {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.kind == other.kind
    }
}

impl Eq for Operation {}

impl Hash for Operation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
        self.kind.hash(state);
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[ {}, {} ]", self.path.display(), self.kind)
    }
}

fn product_name(path: &Path, root: &Path, is_root: bool) -> Result<String> {
    let rel = path.strip_prefix(root).map_err(|_| {
        StreamError::CatalogError(format!(
            "Path {} is outside image root {}",
            path.display(),
            root.display()
        ))
    })?;
    let base = if is_root {
        rel
    } else {
        rel.parent().unwrap_or_else(|| Path::new(""))
    };
    Ok(base
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(":"))
}

/// A deduplicated set of operations.
///
/// Backed by an ordered map keyed by `(path, kind)` so iteration order is
/// deterministic. A single directory may carry both a DELETE and an ADD_MOD
/// at once (rename in and out within one batch).
#[derive(Debug, Default)]
pub struct OperationSet {
    ops: BTreeMap<(PathBuf, OperationKind), Operation>,
}

impl OperationSet {
    /// Insert an operation; an existing `(path, kind)` entry is kept.
    pub fn insert(&mut self, op: Operation) {
        self.ops.entry((op.path.clone(), op.kind)).or_insert(op);
    }

    /// Iterate operations in path order.
    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.ops.values()
    }

    /// Whether the set holds an operation for `(path, kind)`.
    pub fn contains(&self, path: &Path, kind: OperationKind) -> bool {
        self.ops.contains_key(&(path.to_path_buf(), kind))
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Classify a batch of raw change events into a set of operations.
///
/// Order-independent: the same batch in any order yields the same set.
pub fn classify(events: &[ChangeEvent], root: &Path) -> OperationSet {
    let mut ops = OperationSet::default();
    let mut candidates = OperationSet::default();

    for event in events {
        if event.is_dir {
            let Some(kind) = kind_from_tags(&event.tags) else {
                continue;
            };
            let path = event.path();

            if is_version_name(&event.name) {
                match Operation::new(path, kind, root) {
                    Ok(op) => ops.insert(op),
                    Err(e) => warn!("Skipping unresolvable event: {}", e),
                }
            } else if event.has_tag(EventTag::MovedFrom) {
                // The subtree no longer exists and cannot be walked; emit a
                // root-level delete on the directory itself.
                match Operation::new_root(path, OperationKind::Delete, root) {
                    Ok(op) => ops.insert(op),
                    Err(e) => warn!("Skipping unresolvable event: {}", e),
                }
            } else {
                // An ancestor level changed; resolve its version
                // directories by walking once all events are staged.
                match Operation::new_root(path, kind, root) {
                    Ok(op) => candidates.insert(op),
                    Err(e) => warn!("Skipping unresolvable event: {}", e),
                }
            }
        } else if event.parent_name().map(is_version_name).unwrap_or(false) {
            // File-level change inside a version directory. The kind is
            // decided from current disk state, not the event tags: a batch
            // can hold several deletions of the same directory's files.
            let kind = if dir_has_regular_files(&event.parent) {
                OperationKind::AddMod
            } else {
                OperationKind::Delete
            };
            match Operation::new(event.parent.clone(), kind, root) {
                Ok(op) => ops.insert(op),
                Err(e) => warn!("Skipping unresolvable event: {}", e),
            }
        }
    }

    for candidate in candidates.iter() {
        walk_version_dirs(&candidate.path, &mut |version_dir| {
            match Operation::new(version_dir.to_path_buf(), candidate.kind, root) {
                Ok(op) => ops.insert(op),
                Err(e) => warn!("Skipping unresolvable directory: {}", e),
            }
        });
    }

    ops
}

/// Whether a directory exists and contains at least one regular file.
fn dir_has_regular_files(dir: &Path) -> bool {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .flatten()
            .any(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false)),
        Err(_) => false,
    }
}

/// Recursively find version directories beneath `dir`.
///
/// Resolution failures are non-fatal per branch: the branch is skipped and
/// the rest of the walk continues. A missing `dir` yields nothing.
pub(crate) fn walk_version_dirs(dir: &Path, emit: &mut dyn FnMut(&Path)) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Skipping unreadable directory {}: {}", dir.display(), e);
            return;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", dir.display(), e);
                continue;
            }
        };
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        let name = entry.file_name();
        if is_version_name(&name.to_string_lossy()) {
            emit(&path);
        } else {
            walk_version_dirs(&path, emit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_version_name_pattern() {
        assert!(is_version_name("20180710_12:00"));
        assert!(is_version_name("20180710_12:00.incoming")); // prefix match
        assert!(!is_version_name("default"));
        assert!(!is_version_name("2018_12:00"));
    }

    #[test]
    fn test_kind_from_tags() {
        assert_eq!(
            kind_from_tags(&[EventTag::CloseWrite]),
            Some(OperationKind::AddMod)
        );
        assert_eq!(
            kind_from_tags(&[EventTag::MovedFrom]),
            Some(OperationKind::Delete)
        );
        assert_eq!(kind_from_tags(&[]), None);
    }

    #[test]
    fn test_equality_covers_path_and_kind_only() {
        let root = Path::new("/images");
        let a = Operation::new(
            PathBuf::from("/images/u/x/a/d/20180710_12:00"),
            OperationKind::AddMod,
            root,
        )
        .unwrap();
        let mut b = a.clone();
        b.name = "something:else".to_string();
        assert_eq!(a, b);

        let c = Operation::new(a.path.clone(), OperationKind::Delete, root).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_product_names() {
        let root = Path::new("/images");
        let op = Operation::new(
            PathBuf::from("/images/ubuntu/xenial/amd64/default/20180710_12:00"),
            OperationKind::AddMod,
            root,
        )
        .unwrap();
        assert_eq!(op.name, "ubuntu:xenial:amd64:default");
        assert_eq!(op.version_name(), Some("20180710_12:00"));

        let op = Operation::new_root(
            PathBuf::from("/images/ubuntu/xenial"),
            OperationKind::Delete,
            root,
        )
        .unwrap();
        assert_eq!(op.name, "ubuntu:xenial");
        assert!(op.is_root);
    }

    #[test]
    fn test_set_dedup_allows_both_kinds() {
        let root = Path::new("/images");
        let path = PathBuf::from("/images/u/x/a/d/20180710_12:00");
        let mut set = OperationSet::default();
        set.insert(Operation::new(path.clone(), OperationKind::AddMod, root).unwrap());
        set.insert(Operation::new(path.clone(), OperationKind::AddMod, root).unwrap());
        set.insert(Operation::new(path.clone(), OperationKind::Delete, root).unwrap());
        assert_eq!(set.len(), 2);
        assert!(set.contains(&path, OperationKind::AddMod));
        assert!(set.contains(&path, OperationKind::Delete));
    }

    #[test]
    fn test_classify_new_version_with_files() {
        // Scenario: version directory created, two artifacts written.
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let version = root.join("iats/xenial/amd64/default/20180710_12:00");
        std::fs::create_dir_all(&version).unwrap();
        touch(&version.join("lxd.tar.xz"));
        touch(&version.join("rootfs.squashfs"));

        let events = vec![
            ChangeEvent::with_tag(
                version.parent().unwrap(),
                "20180710_12:00",
                EventTag::Create,
                true,
            ),
            ChangeEvent::with_tag(&version, "lxd.tar.xz", EventTag::CloseWrite, false),
            ChangeEvent::with_tag(&version, "rootfs.squashfs", EventTag::CloseWrite, false),
        ];

        let ops = classify(&events, root);
        assert_eq!(ops.len(), 1);
        assert!(ops.contains(&version, OperationKind::AddMod));
    }

    #[test]
    fn test_classify_ancestor_attrib_resolves_to_versions() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let version = root.join("iats/xenial/amd64/default/20180710_12:00");
        std::fs::create_dir_all(&version).unwrap();
        touch(&version.join("lxd.tar.xz"));

        let default_dir = version.parent().unwrap();
        let events = vec![ChangeEvent::with_tag(
            default_dir.parent().unwrap(),
            "default",
            EventTag::Attrib,
            true,
        )];

        let ops = classify(&events, root);
        assert_eq!(ops.len(), 1);
        assert!(ops.contains(&version, OperationKind::AddMod));
    }

    #[test]
    fn test_classify_ancestor_without_versions_is_empty() {
        // Scenario: a changed ancestor with no version-pattern descendants.
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let dir = root.join("iats/xenial/amd64/default");
        std::fs::create_dir_all(&dir).unwrap();

        let events = vec![ChangeEvent::with_tag(
            dir.parent().unwrap(),
            "default",
            EventTag::Attrib,
            true,
        )];

        assert!(classify(&events, root).is_empty());
    }

    #[test]
    fn test_classify_rename_produces_delete_and_add() {
        // Scenario: "default" moved away, "other" moved in with the same
        // version directory nested beneath.
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let base = root.join("iats/xenial/amd64");
        let old_dir = base.join("default");
        let new_version = base.join("other/20180710_12:00");
        std::fs::create_dir_all(&new_version).unwrap();
        touch(&new_version.join("lxd.tar.xz"));

        let events = vec![
            ChangeEvent::with_tag(&base, "default", EventTag::MovedFrom, true),
            ChangeEvent::with_tag(&base, "other", EventTag::MovedTo, true),
        ];

        let ops = classify(&events, root);
        assert_eq!(ops.len(), 2);
        assert!(ops.contains(&old_dir, OperationKind::Delete));
        assert!(ops.contains(&new_version, OperationKind::AddMod));

        let root_delete = ops
            .iter()
            .find(|op| op.kind == OperationKind::Delete)
            .unwrap();
        assert!(root_delete.is_root);
        assert_eq!(root_delete.name, "iats:xenial:amd64:default");
    }

    #[test]
    fn test_classify_version_directory_delete() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let parent = root.join("iats/xenial/amd64/default");
        std::fs::create_dir_all(&parent).unwrap();
        let version = parent.join("20180710_12:00");

        let events = vec![
            ChangeEvent::with_tag(&version, "lxd.tar.xz", EventTag::Delete, false),
            ChangeEvent::with_tag(&version, "rootfs.squashfs", EventTag::Delete, false),
            ChangeEvent::with_tag(&parent, "20180710_12:00", EventTag::Delete, true),
        ];

        let ops = classify(&events, root);
        assert_eq!(ops.len(), 1);
        assert!(ops.contains(&version, OperationKind::Delete));
    }

    #[test]
    fn test_classify_file_delete_rechecks_disk() {
        // All files deleted but the version directory survives: the
        // re-inspection downgrades the file events to a DELETE.
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let version = root.join("iats/xenial/amd64/default/20180710_12:00");
        std::fs::create_dir_all(&version).unwrap();

        let events = vec![
            ChangeEvent::with_tag(&version, "lxd.tar.xz", EventTag::Delete, false),
            ChangeEvent::with_tag(&version, "rootfs.squashfs", EventTag::Delete, false),
        ];

        let ops = classify(&events, root);
        assert_eq!(ops.len(), 1);
        assert!(ops.contains(&version, OperationKind::Delete));

        // With one file left on disk the same events become an ADD_MOD.
        touch(&version.join("rootfs.squashfs"));
        let ops = classify(&events, root);
        assert_eq!(ops.len(), 1);
        assert!(ops.contains(&version, OperationKind::AddMod));
    }

    #[test]
    fn test_classify_ignores_files_outside_version_dirs() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let dir = root.join("iats/xenial");
        std::fs::create_dir_all(&dir).unwrap();
        touch(&dir.join("README"));

        let events = vec![ChangeEvent::with_tag(&dir, "README", EventTag::CloseWrite, false)];
        assert!(classify(&events, root).is_empty());
    }

    #[test]
    fn test_classify_ignores_untagged_events() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let events = vec![ChangeEvent::new(root, "20180710_12:00", vec![], true)];
        assert!(classify(&events, root).is_empty());
    }
}
