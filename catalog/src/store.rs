//! Catalog Store: load, update, and persist the document pair.
//!
//! Holds the in-memory `images.json`/`index.json` documents, applies a set
//! of operations against them (invoking the Version Builder as needed), and
//! rewrites both documents in full with atomic temp-file + rename writes.

use std::io::Write;
use std::path::{Path, PathBuf};

use imgstream_core::error::{Result, StreamError};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::operation::{Operation, OperationKind, OperationSet};
use crate::simplestreams::{ImagesDoc, IndexDoc, Product};
use crate::version::{self, METADATA_FILE};

/// Filename of the products document.
pub const IMAGES_FILE: &str = "images.json";

/// Filename of the index document.
pub const INDEX_FILE: &str = "index.json";

/// Recognized keys of the per-version `metadata.json` sidecar.
#[derive(Debug, Default, Deserialize)]
struct SidecarMetadata {
    os: Option<String>,
    release_title: Option<String>,
    aliases: Option<String>,
}

/// The catalog: both documents plus the paths they live at.
pub struct CatalogStore {
    streams_dir: PathBuf,
    image_root: PathBuf,
    images: ImagesDoc,
    index: IndexDoc,
}

impl CatalogStore {
    /// Load the catalog from `streams_dir`.
    ///
    /// Starts from an empty state when `rebuild` is set or no prior images
    /// document exists. The index product set is always derived from the
    /// loaded images document, which keeps the two in lock-step from the
    /// first reachable state on.
    pub fn load(streams_dir: &Path, image_root: &Path, rebuild: bool) -> Result<Self> {
        let images_path = streams_dir.join(IMAGES_FILE);
        let images = if rebuild || !images_path.exists() {
            ImagesDoc::new()
        } else {
            let data = std::fs::read_to_string(&images_path).map_err(|e| {
                StreamError::CatalogError(format!(
                    "Failed to read {}: {}",
                    images_path.display(),
                    e
                ))
            })?;
            serde_json::from_str(&data).map_err(|e| {
                StreamError::CatalogError(format!(
                    "Failed to parse {}: {}",
                    images_path.display(),
                    e
                ))
            })?
        };

        let mut index = IndexDoc::new();
        for (name, product) in &images.products {
            if !product.versions.is_empty() {
                index.add(name);
            }
        }

        Ok(Self {
            streams_dir: streams_dir.to_path_buf(),
            image_root: image_root.to_path_buf(),
            images,
            index,
        })
    }

    /// The watched image root this catalog describes.
    pub fn image_root(&self) -> &Path {
        &self.image_root
    }

    /// The directory both documents are persisted to.
    pub fn streams_dir(&self) -> &Path {
        &self.streams_dir
    }

    /// The in-memory images document.
    pub fn images(&self) -> &ImagesDoc {
        &self.images
    }

    /// The in-memory index document.
    pub fn index(&self) -> &IndexDoc {
        &self.index
    }

    /// Apply a set of operations.
    ///
    /// Operations are independent; targets are disjoint in practice. On the
    /// first hard error (a failed version build) the update aborts with
    /// `Err`, and callers must not `save()` for that batch.
    pub fn update(&mut self, ops: &OperationSet) -> Result<()> {
        for op in ops.iter() {
            self.apply(op)?;
        }
        Ok(())
    }

    fn apply(&mut self, op: &Operation) -> Result<()> {
        if op.is_root {
            // Root-level deletion matches product keys by substring, not by
            // exact path prefix: documented legacy behavior.
            let doomed: Vec<String> = self
                .images
                .products
                .keys()
                .filter(|key| key.contains(&op.name))
                .cloned()
                .collect();
            for key in doomed {
                debug!("Removing product {}", key);
                self.images.products.remove(&key);
                self.index.delete(&key);
            }
            return Ok(());
        }

        let version_name = match op.version_name() {
            Some(name) => name.to_string(),
            None => {
                warn!("Skipping operation without a version name: {}", op);
                return Ok(());
            }
        };

        // Always drop the targeted version first; ADD_MOD re-adds it below.
        if let Some(product) = self.images.products.get_mut(&op.name) {
            product.versions.remove(&version_name);
            if product.versions.is_empty() {
                debug!("Removing emptied product {}", op.name);
                self.images.products.remove(&op.name);
                self.index.delete(&op.name);
            }
        }

        if op.kind == OperationKind::AddMod {
            if !op.path.exists() {
                // Already handled by the deletion above
                return Ok(());
            }
            let Some(version) = version::build_version(&op.path, &op.root)? else {
                return Ok(());
            };

            if !self.images.products.contains_key(&op.name) {
                let product = new_product(&op.name, &op.path);
                self.images.products.insert(op.name.clone(), product);
            }
            if let Some(product) = self.images.products.get_mut(&op.name) {
                product.versions.insert(version_name, version);
            }
            self.index.add(&op.name);
        }

        Ok(())
    }

    /// Persist both documents, stamping a fresh `last_update`.
    ///
    /// Each document is rewritten in full through a temp file in the target
    /// directory followed by a rename, so a crash leaves either the old or
    /// the new complete document, never a truncated one.
    pub fn save(&mut self) -> Result<()> {
        std::fs::create_dir_all(&self.streams_dir)?;

        self.images.last_update = Some(unix_now());

        let images_data = serde_json::to_vec(&self.images)?;
        write_atomic(&self.streams_dir.join(IMAGES_FILE), &images_data)?;

        let index_data = serde_json::to_vec(&self.index)?;
        write_atomic(&self.streams_dir.join(INDEX_FILE), &index_data)?;

        Ok(())
    }
}

/// Build a new product record for its first version.
///
/// Splits the key into its fields, overlays a parseable sidecar if one sits
/// in the version directory, and guarantees the default alias is present.
fn new_product(key: &str, version_dir: &Path) -> Product {
    let mut product = Product::from_key(key);

    if let Some(meta) = read_sidecar(version_dir) {
        if let Some(os) = meta.os {
            product.os = os;
        }
        if let Some(release_title) = meta.release_title {
            product.release_title = release_title;
        }
        if let Some(aliases) = meta.aliases {
            product.aliases = aliases;
        }
    }

    let default_alias = Product::default_alias(key);
    if !product.has_alias(&default_alias) {
        product.push_alias(&default_alias);
    }

    product
}

/// Read the sidecar from a version directory. Missing, unreadable, or
/// malformed sidecars yield `None`; the failure is never fatal.
fn read_sidecar(version_dir: &Path) -> Option<SidecarMetadata> {
    let path = version_dir.join(METADATA_FILE);
    if !path.exists() {
        return None;
    }
    let data = match std::fs::read_to_string(&path) {
        Ok(data) => data,
        Err(e) => {
            warn!("Ignoring unreadable sidecar {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str(&data) {
        Ok(meta) => Some(meta),
        Err(e) => {
            warn!("Ignoring malformed sidecar {}: {}", path.display(), e);
            None
        }
    }
}

/// Current Unix time in fractional seconds.
fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Write a file atomically: temp file in the same directory, then rename.
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path.parent().ok_or_else(|| {
        StreamError::CatalogError(format!("Path {} has no parent directory", path.display()))
    })?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| {
        StreamError::CatalogError(format!("Failed to persist {}: {}", path.display(), e))
    })?;
    Ok(())
}
