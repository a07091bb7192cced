//! imgstream Core - Foundational Types
//!
//! This module provides the configuration, error, and raw-event types
//! shared across the imgstream crates.

pub mod config;
pub mod error;
pub mod event;

// Re-export commonly used types
pub use config::{MirrorConfig, ServerConfig};
pub use error::{Result, StreamError};
pub use event::{ChangeEvent, EventTag};

/// imgstream version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
