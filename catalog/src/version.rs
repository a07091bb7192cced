//! Version Builder: hash one version directory into a `Version` record.
//!
//! A touched version is always rebuilt wholesale from disk; nothing inside a
//! version is updated incrementally. Hashes are streamed in fixed-size
//! blocks, and the unfinalized `lxd.tar.xz` digest state is forked to derive
//! the combined digests over companion artifacts.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use imgstream_core::error::{Result, StreamError};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::simplestreams::{Item, Version};

/// Per-version sidecar file, excluded from the artifact list.
pub const METADATA_FILE: &str = "metadata.json";

/// Streaming block size for checksums.
const BLOCK_SIZE: usize = 64 * 1024;

/// The artifact whose digest state seeds the combined hashes.
const LXD_TARBALL: &str = "lxd.tar.xz";

/// The rootfs tarball companion, producing the rootxz combined digest.
const ROOT_TARBALL: &str = "root.tar.xz";

/// Classify an artifact filename into its simplestreams ftype.
pub fn file_type(name: &str) -> String {
    if name.contains("vcdiff") {
        "squashfs.vcdiff".to_string()
    } else if name.contains("squashfs") {
        "squashfs".to_string()
    } else {
        name.to_string()
    }
}

/// Build a `Version` record from a version directory.
///
/// Returns `Ok(None)` when the directory contains no regular files;
/// callers must treat that as a deletion, never as an empty version.
/// A read failure while hashing is a hard error: the whole build aborts.
pub fn build_version(version_dir: &Path, root: &Path) -> Result<Option<Version>> {
    let names = list_artifacts(version_dir)?;
    if names.is_empty() {
        return Ok(None);
    }

    let rel = version_dir.strip_prefix(root).map_err(|_| {
        StreamError::CatalogError(format!(
            "Version directory {} is outside image root {}",
            version_dir.display(),
            root.display()
        ))
    })?;
    let rel_posix = posix_path(rel);

    let mut items = BTreeMap::new();
    let mut lxd_state: Option<Sha256> = None;

    for name in &names {
        let path = version_dir.join(name);
        let mut hasher = Sha256::new();
        let size = stream_file(&mut hasher, &path)?;
        if name == LXD_TARBALL {
            lxd_state = Some(hasher.clone());
        }
        items.insert(
            name.clone(),
            Item {
                ftype: file_type(name),
                sha256: hex::encode(hasher.finalize()),
                size,
                path: format!("images/{}/{}", rel_posix, name),
                combined_sha256: None,
                combined_squashfs_sha256: None,
                combined_rootxz_sha256: None,
            },
        );
    }

    if let Some(state) = lxd_state {
        let mut combined_squashfs = None;
        let mut combined_rootxz = None;

        for name in &names {
            if name == LXD_TARBALL {
                continue;
            }
            if file_type(name) == "squashfs" {
                let mut hasher = state.clone();
                stream_file(&mut hasher, &version_dir.join(name))?;
                combined_squashfs = Some(hex::encode(hasher.finalize()));
            } else if name == ROOT_TARBALL {
                let mut hasher = state.clone();
                stream_file(&mut hasher, &version_dir.join(name))?;
                combined_rootxz = Some(hex::encode(hasher.finalize()));
            }
        }

        if let Some(item) = items.get_mut(LXD_TARBALL) {
            item.combined_squashfs_sha256 = combined_squashfs;
            // The legacy combined_sha256 aliases the rootxz digest
            item.combined_sha256 = combined_rootxz.clone();
            item.combined_rootxz_sha256 = combined_rootxz;
        }
    }

    Ok(Some(Version { items }))
}

/// Enumerate the regular files directly in a version directory, sorted,
/// excluding the metadata sidecar.
fn list_artifacts(version_dir: &Path) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(version_dir).map_err(|e| {
        StreamError::VersionBuildError {
            path: version_dir.display().to_string(),
            message: e.to_string(),
        }
    })?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StreamError::VersionBuildError {
            path: version_dir.display().to_string(),
            message: e.to_string(),
        })?;
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => {
                if name != METADATA_FILE {
                    names.push(name);
                }
            }
            Err(name) => {
                warn!("Skipping non-UTF8 artifact name {:?}", name);
            }
        }
    }

    names.sort();
    Ok(names)
}

/// Stream a file into a hasher in fixed-size blocks; returns the byte count.
fn stream_file(hasher: &mut Sha256, path: &Path) -> Result<u64> {
    let mut file = std::fs::File::open(path).map_err(|e| StreamError::VersionBuildError {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let mut buf = vec![0u8; BLOCK_SIZE];
    let mut total = 0u64;
    loop {
        let n = file.read(&mut buf).map_err(|e| StreamError::VersionBuildError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok(total)
}

/// Join path components with forward slashes regardless of platform.
fn posix_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
