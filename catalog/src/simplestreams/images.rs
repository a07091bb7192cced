//! The `images.json` document: products, versions, and artifact items.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{DATATYPE, PRODUCTS_FORMAT};

/// One artifact file within a version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Classified artifact type (e.g., "squashfs", "lxd.tar.xz")
    pub ftype: String,

    /// SHA256 of the file contents, hex encoded
    pub sha256: String,

    /// File size in bytes
    pub size: u64,

    /// Root-relative download path, "images/" prefixed
    pub path: String,

    /// Legacy combined digest (identical to `combined_rootxz_sha256`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combined_sha256: Option<String>,

    /// Digest of lxd.tar.xz followed by the squashfs companion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combined_squashfs_sha256: Option<String>,

    /// Digest of lxd.tar.xz followed by the root.tar.xz companion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combined_rootxz_sha256: Option<String>,
}

/// A timestamp-named snapshot of artifacts for a product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Version {
    /// Map of artifact filename to item record
    pub items: BTreeMap<String, Item>,
}

/// A unique (os, release, arch, variant) image family.
///
/// The variant appears only in the product key and the default alias; the
/// serialized fields follow the simplestreams products schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub os: String,
    pub release: String,
    pub release_title: String,
    pub arch: String,
    /// Comma-separated alias list
    pub aliases: String,
    /// Map of version name to version record
    pub versions: BTreeMap<String, Version>,
}

impl Product {
    /// Build a product skeleton from its colon-joined key.
    ///
    /// The key has the shape `os:release:arch:variant`; `release_title`
    /// defaults to the release and the alias list to the slash-joined key.
    pub fn from_key(key: &str) -> Self {
        let fields: Vec<&str> = key.split(':').collect();
        let field = |i: usize| fields.get(i).copied().unwrap_or("").to_string();

        Self {
            os: field(0),
            release: field(1),
            release_title: field(1),
            arch: field(2),
            aliases: fields.join("/"),
            versions: BTreeMap::new(),
        }
    }

    /// The default alias for a product key: the slash-joined key fields.
    pub fn default_alias(key: &str) -> String {
        key.replace(':', "/")
    }

    /// Whether the comma-separated alias list contains the given alias.
    pub fn has_alias(&self, alias: &str) -> bool {
        self.aliases.split(',').any(|a| a == alias)
    }

    /// Append an alias to the comma-separated list.
    pub fn push_alias(&mut self, alias: &str) {
        if self.aliases.is_empty() {
            self.aliases = alias.to_string();
        } else {
            self.aliases.push(',');
            self.aliases.push_str(alias);
        }
    }
}

/// The `images.json` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagesDoc {
    pub format: String,
    pub datatype: String,
    pub content_id: String,
    /// Map of product key to product record
    pub products: BTreeMap<String, Product>,
    /// Unix timestamp (fractional seconds) of the last save
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<f64>,
}

impl ImagesDoc {
    /// Create an empty images document.
    pub fn new() -> Self {
        Self {
            format: PRODUCTS_FORMAT.to_string(),
            datatype: DATATYPE.to_string(),
            content_id: "images".to_string(),
            products: BTreeMap::new(),
            last_update: None,
        }
    }
}

impl Default for ImagesDoc {
    fn default() -> Self {
        Self::new()
    }
}
