//! imgstream Catalog - Simplestreams consistency engine.
//!
//! This crate turns raw filesystem change events into catalog operations and
//! keeps the persisted `images.json`/`index.json` document pair consistent
//! with the image tree: event classification, per-version artifact hashing,
//! document persistence, mirror synchronization, and the watcher/updater
//! pipeline that ties them together.

pub mod mirror;
pub mod operation;
pub mod reload;
pub mod simplestreams;
pub mod store;
pub mod updater;
pub mod version;
pub mod watcher;

// Re-export common types
pub use operation::{classify, is_version_name, Operation, OperationKind, OperationSet};
pub use simplestreams::{ImagesDoc, IndexDoc, Item, Product, Version};
pub use store::CatalogStore;
pub use updater::Updater;
pub use version::build_version;

/// imgstream Catalog version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
