//! Tree watcher: recursive filesystem notifications over the image root.
//!
//! Raw notify events are flattened into `ChangeEvent` values and pushed onto
//! an unbounded channel; the updater drains and classifies them. For paths
//! that no longer exist the directory/file distinction is inferred from the
//! removal kind or from the version-name pattern.

use std::path::{Path, PathBuf};

use imgstream_core::error::{Result, StreamError};
use imgstream_core::event::{ChangeEvent, EventTag};
use notify::event::{AccessKind, AccessMode, ModifyKind, RemoveKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::operation::is_version_name;

/// Handle keeping the underlying watcher alive. Dropping it stops the
/// notification stream.
pub struct TreeWatcher {
    _watcher: RecommendedWatcher,
}

/// Watch `root` recursively, sending converted events to `tx`.
pub fn spawn(root: &Path, tx: mpsc::UnboundedSender<Vec<ChangeEvent>>) -> Result<TreeWatcher> {
    let mut watcher =
        notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                trace!("Raw watch event: {:?}", event);
                let converted = convert_event(&event);
                if !converted.is_empty() {
                    // Send failure means the updater is gone; shutdown path
                    let _ = tx.send(converted);
                }
            }
            Err(e) => warn!("Watch error: {}", e),
        })
        .map_err(|e| StreamError::WatchError(e.to_string()))?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|e| StreamError::WatchError(format!("{}: {}", root.display(), e)))?;

    Ok(TreeWatcher { _watcher: watcher })
}

/// Flatten one notify event into zero or more change events.
fn convert_event(event: &notify::Event) -> Vec<ChangeEvent> {
    match &event.kind {
        EventKind::Create(_) => tag_paths(&event.paths, EventTag::Create),
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
            tag_paths(&event.paths, EventTag::CloseWrite)
        }
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
            tag_paths(&event.paths, EventTag::CloseWrite)
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => tag_paths(&event.paths, EventTag::Attrib),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => tag_paths(&event.paths, EventTag::MovedFrom),
            RenameMode::To => tag_paths(&event.paths, EventTag::MovedTo),
            RenameMode::Both => {
                let mut events = Vec::new();
                if let Some(from) = event.paths.first() {
                    if let Some(e) = make_event(from, EventTag::MovedFrom, None) {
                        events.push(e);
                    }
                }
                if let Some(to) = event.paths.get(1) {
                    if let Some(e) = make_event(to, EventTag::MovedTo, None) {
                        events.push(e);
                    }
                }
                events
            }
            RenameMode::Any | RenameMode::Other => {
                // Direction unknown; decide per path from disk presence
                event
                    .paths
                    .iter()
                    .filter_map(|p| {
                        let tag = if p.exists() {
                            EventTag::MovedTo
                        } else {
                            EventTag::MovedFrom
                        };
                        make_event(p, tag, None)
                    })
                    .collect()
            }
        },
        EventKind::Remove(kind) => {
            let is_dir = match kind {
                RemoveKind::Folder => Some(true),
                RemoveKind::File => Some(false),
                _ => None,
            };
            event
                .paths
                .iter()
                .filter_map(|p| make_event(p, EventTag::Delete, is_dir))
                .collect()
        }
        _ => Vec::new(),
    }
}

fn tag_paths(paths: &[PathBuf], tag: EventTag) -> Vec<ChangeEvent> {
    paths
        .iter()
        .filter_map(|p| make_event(p, tag, None))
        .collect()
}

fn make_event(path: &Path, tag: EventTag, is_dir: Option<bool>) -> Option<ChangeEvent> {
    let parent = path.parent()?;
    let name = path.file_name()?.to_str()?;
    let is_dir = is_dir.unwrap_or_else(|| entry_is_dir(path, name));
    Some(ChangeEvent::with_tag(parent, name, tag, is_dir))
}

/// Decide whether a path names a directory.
///
/// For live paths a stat answers directly. For gone paths the version-name
/// pattern decides: a version-named entry is a directory, an entry inside a
/// version-named parent is a file, and anything else is treated as a
/// directory (a product-tree level).
fn entry_is_dir(path: &Path, name: &str) -> bool {
    if let Ok(meta) = std::fs::symlink_metadata(path) {
        return meta.is_dir();
    }
    if is_version_name(name) {
        return true;
    }
    let parent_is_version = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .map(is_version_name)
        .unwrap_or(false);
    !parent_is_version
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind};
    use tempfile::TempDir;

    fn single(event: &notify::Event) -> ChangeEvent {
        let converted = convert_event(event);
        assert_eq!(converted.len(), 1);
        converted.into_iter().next().unwrap()
    }

    #[test]
    fn test_create_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("20180710_12:00");
        std::fs::create_dir(&dir).unwrap();

        let raw = notify::Event::new(EventKind::Create(CreateKind::Folder)).add_path(dir.clone());
        let event = single(&raw);
        assert_eq!(event.path(), dir);
        assert!(event.is_dir);
        assert!(event.has_tag(EventTag::Create));
    }

    #[test]
    fn test_close_write_and_modify_map_to_close_write() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("lxd.tar.xz");
        std::fs::write(&file, b"A").unwrap();

        for kind in [
            EventKind::Access(AccessKind::Close(AccessMode::Write)),
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            EventKind::Modify(ModifyKind::Any),
        ] {
            let event = single(&notify::Event::new(kind).add_path(file.clone()));
            assert!(event.has_tag(EventTag::CloseWrite));
            assert!(!event.is_dir);
        }
    }

    #[test]
    fn test_metadata_maps_to_attrib() {
        let tmp = TempDir::new().unwrap();
        let raw = notify::Event::new(EventKind::Modify(ModifyKind::Metadata(
            MetadataKind::Permissions,
        )))
        .add_path(tmp.path().to_path_buf());
        assert!(single(&raw).has_tag(EventTag::Attrib));
    }

    #[test]
    fn test_rename_both_splits_into_from_and_to() {
        let tmp = TempDir::new().unwrap();
        let old = tmp.path().join("default");
        let new = tmp.path().join("other");
        std::fs::create_dir(&new).unwrap();

        let raw = notify::Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(old.clone())
            .add_path(new.clone());
        let events = convert_event(&raw);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].path(), old);
        assert!(events[0].has_tag(EventTag::MovedFrom));
        assert_eq!(events[1].path(), new);
        assert!(events[1].has_tag(EventTag::MovedTo));
    }

    #[test]
    fn test_remove_kind_hints_decide_is_dir() {
        let gone = PathBuf::from("/images/u/x/a/d/20180710_12:00");
        let event = single(
            &notify::Event::new(EventKind::Remove(RemoveKind::Folder)).add_path(gone.clone()),
        );
        assert!(event.is_dir);
        assert!(event.has_tag(EventTag::Delete));

        let event = single(
            &notify::Event::new(EventKind::Remove(RemoveKind::File))
                .add_path(gone.join("lxd.tar.xz")),
        );
        assert!(!event.is_dir);
    }

    #[test]
    fn test_gone_path_heuristics() {
        // Version-named entry: a directory
        assert!(entry_is_dir(
            Path::new("/gone/default/20180710_12:00"),
            "20180710_12:00"
        ));
        // Entry inside a version-named parent: a file
        assert!(!entry_is_dir(
            Path::new("/gone/20180710_12:00/lxd.tar.xz"),
            "lxd.tar.xz"
        ));
        // Anything else: a product-tree directory
        assert!(entry_is_dir(Path::new("/gone/ubuntu/xenial"), "xenial"));
    }

    #[test]
    fn test_unclassified_kinds_are_dropped() {
        let raw = notify::Event::new(EventKind::Access(AccessKind::Read))
            .add_path(PathBuf::from("/images/file"));
        assert!(convert_event(&raw).is_empty());
    }
}
