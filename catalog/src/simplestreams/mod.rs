//! Simplestreams document model.
//!
//! The catalog is persisted as a document pair: `images.json` (products,
//! versions, and artifact items) and `index.json` (the product-name index
//! pointing at the images document).

mod images;
mod index;

pub use images::{ImagesDoc, Item, Product, Version};
pub use index::IndexDoc;

/// Format tag of the products document.
pub const PRODUCTS_FORMAT: &str = "products:1.0";

/// Format tag of the index document.
pub const INDEX_FORMAT: &str = "index:1.0";

/// Datatype advertised for the image download catalog.
pub const DATATYPE: &str = "image-downloads";

/// Root-relative location of the images document, as published in the index.
pub const IMAGES_DOC_PATH: &str = "streams/v1/images.json";
