use thiserror::Error;

/// imgstream error types
#[derive(Error, Debug)]
pub enum StreamError {
    /// Configuration file missing, unreadable or invalid
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Catalog document inconsistency or persistence failure
    #[error("Catalog error: {0}")]
    CatalogError(String),

    /// A version directory could not be hashed into a Version record
    #[error("Version build failed: {path}: {message}")]
    VersionBuildError { path: String, message: String },

    /// Filesystem watcher setup or delivery error
    #[error("Watch error: {0}")]
    WatchError(String),

    /// Mirror synchronization error
    #[error("Mirror error: {name} - {message}")]
    MirrorError { name: String, message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::SerializationError(err.to_string())
    }
}

impl From<toml::de::Error> for StreamError {
    fn from(err: toml::de::Error) -> Self {
        StreamError::ConfigError(err.to_string())
    }
}

/// Result type alias for imgstream operations
pub type Result<T> = std::result::Result<T, StreamError>;
