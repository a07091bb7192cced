use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A single raw filesystem change notification.
///
/// Mirrors what the tree watcher reports: the parent directory the change
/// happened in, the entry name, the set of change tags, and whether the
/// entry is (or was) a directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Directory containing the changed entry
    pub parent: PathBuf,

    /// Name of the changed entry
    pub name: String,

    /// Change tags reported for this entry
    pub tags: Vec<EventTag>,

    /// Whether the entry is (or, for removals, was) a directory
    pub is_dir: bool,
}

impl ChangeEvent {
    /// Create a new change event.
    pub fn new(
        parent: impl Into<PathBuf>,
        name: impl Into<String>,
        tags: Vec<EventTag>,
        is_dir: bool,
    ) -> Self {
        Self {
            parent: parent.into(),
            name: name.into(),
            tags,
            is_dir,
        }
    }

    /// Full path of the changed entry.
    pub fn path(&self) -> PathBuf {
        self.parent.join(&self.name)
    }

    /// Whether any of the given tags is present.
    pub fn has_tag(&self, tag: EventTag) -> bool {
        self.tags.contains(&tag)
    }

    /// Name of the parent directory (its final path segment).
    pub fn parent_name(&self) -> Option<&str> {
        self.parent.file_name().and_then(|n| n.to_str())
    }
}

/// Change tags, matching the inotify event classes the classifier cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTag {
    /// Entry was created
    Create,
    /// File opened for writing was closed
    CloseWrite,
    /// Metadata (permissions, timestamps) changed
    Attrib,
    /// Entry was moved into the watched tree
    MovedTo,
    /// Entry was moved out of its directory
    MovedFrom,
    /// Entry was deleted
    Delete,
}

impl ChangeEvent {
    /// Convenience constructor for a single-tag event.
    pub fn with_tag(parent: impl AsRef<Path>, name: &str, tag: EventTag, is_dir: bool) -> Self {
        Self::new(parent.as_ref(), name, vec![tag], is_dir)
    }
}
