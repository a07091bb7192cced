//! The `index.json` document: the product-name index.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{DATATYPE, IMAGES_DOC_PATH, INDEX_FORMAT, PRODUCTS_FORMAT};

/// The `index.json` document.
///
/// Carries a single `images` entry pointing at the images document plus the
/// set of product names it contains. The set is kept in lock-step with
/// product existence in the images document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDoc {
    pub format: String,
    index: Entries,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Entries {
    images: Entry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Entry {
    datatype: String,
    path: String,
    format: String,
    products: BTreeSet<String>,
}

impl IndexDoc {
    /// Create an empty index document.
    pub fn new() -> Self {
        Self {
            format: INDEX_FORMAT.to_string(),
            index: Entries {
                images: Entry {
                    datatype: DATATYPE.to_string(),
                    path: IMAGES_DOC_PATH.to_string(),
                    format: PRODUCTS_FORMAT.to_string(),
                    products: BTreeSet::new(),
                },
            },
        }
    }

    /// Add a product name. Adding an existing name is a no-op.
    pub fn add(&mut self, product: &str) {
        self.index.images.products.insert(product.to_string());
    }

    /// Remove a product name. Removing an absent name is a no-op.
    pub fn delete(&mut self, product: &str) {
        self.index.images.products.remove(product);
    }

    /// Whether the index contains the product name.
    pub fn contains(&self, product: &str) -> bool {
        self.index.images.products.contains(product)
    }

    /// The set of indexed product names.
    pub fn products(&self) -> &BTreeSet<String> {
        &self.index.images.products
    }
}

impl Default for IndexDoc {
    fn default() -> Self {
        Self::new()
    }
}
