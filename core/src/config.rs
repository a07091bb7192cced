use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Result, StreamError};

/// Default location of the daemon configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/imgstream/config.toml";

/// Server configuration, loaded from a TOML file.
///
/// The configuration is treated as an immutable snapshot: the daemon never
/// mutates a loaded `ServerConfig` in place. Reloads produce a fresh value
/// that is published to the running units as a whole.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Root of the watched image tree
    #[serde(default = "default_image_dir")]
    pub image_dir: PathBuf,

    /// Directory holding the persisted images.json/index.json pair
    #[serde(default = "default_streams_dir")]
    pub streams_dir: PathBuf,

    /// Mirror targets to synchronize after each successful save
    #[serde(default)]
    pub mirrors: BTreeMap<String, MirrorConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            image_dir: default_image_dir(),
            streams_dir: default_streams_dir(),
            mirrors: BTreeMap::new(),
        }
    }
}

impl ServerConfig {
    /// Load the configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            StreamError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: ServerConfig = toml::from_str(&data)?;
        Ok(config)
    }

    /// Load the configuration, falling back to defaults if the file is absent.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// A single mirror target.
///
/// Mirrors are synchronized with rsync over ssh, one at a time, after each
/// successful catalog save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Remote ssh user
    pub user: String,

    /// Path to the ssh identity file
    pub key_path: PathBuf,

    /// Mirror URL; the host part is the rsync destination
    pub url: String,
}

fn default_image_dir() -> PathBuf {
    PathBuf::from("/var/www/simplestreams/images")
}

fn default_streams_dir() -> PathBuf {
    PathBuf::from("/var/www/simplestreams/streams/v1")
}
