//! Config hot-reload: republish an immutable snapshot when the file changes.
//!
//! The config file's parent directory is watched so editor rename-into-place
//! saves are caught. Every successful parse publishes a fresh
//! `Arc<ServerConfig>` on a watch channel; consumers pick it up at their
//! next batch boundary. A snapshot in use is never mutated.

use std::path::Path;
use std::sync::Arc;

use imgstream_core::config::ServerConfig;
use imgstream_core::error::{Result, StreamError};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::watch;
use tracing::{info, warn};

/// Handle keeping the config watcher alive.
pub struct ConfigReloader {
    _watcher: RecommendedWatcher,
}

/// Watch `config_path` for changes, starting from the `initial` snapshot.
///
/// Returns the receiving side of the snapshot channel plus the reloader
/// handle. A malformed rewrite is logged and the previous snapshot stays
/// current.
pub fn spawn(
    config_path: &Path,
    initial: ServerConfig,
) -> Result<(watch::Receiver<Arc<ServerConfig>>, ConfigReloader)> {
    let parent = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| {
            StreamError::ConfigError(format!(
                "Config path {} has no parent directory",
                config_path.display()
            ))
        })?
        .to_path_buf();

    let file_name = config_path
        .file_name()
        .map(|n| n.to_os_string())
        .ok_or_else(|| {
            StreamError::ConfigError(format!(
                "Config path {} has no file name",
                config_path.display()
            ))
        })?;

    let (tx, rx) = watch::channel(Arc::new(initial));
    let reload_path = config_path.to_path_buf();

    let mut watcher =
        notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                let relevant = matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_)
                ) && event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == Some(file_name.as_os_str()));
                if !relevant {
                    return;
                }
                match ServerConfig::load(&reload_path) {
                    Ok(config) => {
                        info!("Configuration reloaded from {}", reload_path.display());
                        let _ = tx.send(Arc::new(config));
                    }
                    Err(e) => {
                        warn!(
                            "Ignoring invalid configuration {}: {}",
                            reload_path.display(),
                            e
                        );
                    }
                }
            }
            Err(e) => warn!("Config watch error: {}", e),
        })
        .map_err(|e| StreamError::WatchError(e.to_string()))?;

    watcher
        .watch(&parent, RecursiveMode::NonRecursive)
        .map_err(|e| StreamError::WatchError(format!("{}: {}", parent.display(), e)))?;

    Ok((rx, ConfigReloader { _watcher: watcher }))
}
