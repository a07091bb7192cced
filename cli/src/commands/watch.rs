//! `imgstream watch`: the long-running catalog daemon.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use tokio::sync::mpsc;
use tracing::{info, warn};

use imgstream_catalog::{reload, updater, watcher, CatalogStore, Updater};
use imgstream_core::config::{ServerConfig, DEFAULT_CONFIG_PATH};

/// Arguments for the `watch` command.
#[derive(Args)]
pub struct WatchArgs {
    /// Override the configured image root
    pub img_dir: Option<PathBuf>,

    /// Override the configured streams directory
    pub streams_dir: Option<PathBuf>,

    /// Path to the configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Rebuild the catalog from a full scan before watching
    #[arg(long)]
    pub rebuild: bool,
}

/// Run the watcher/updater pipeline until interrupted.
pub async fn execute(args: WatchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ServerConfig::load_or_default(&args.config)?;
    if let Some(dir) = args.img_dir {
        config.image_dir = dir;
    }
    if let Some(dir) = args.streams_dir {
        config.streams_dir = dir;
    }

    // Command-line overrides apply to this run only; a reload republishes
    // the file as written. The directories are bound at startup anyway,
    // only the mirror set follows reloads.
    let (config_rx, _reloader, _static_tx) = match reload::spawn(&args.config, config.clone()) {
        Ok((rx, handle)) => (rx, Some(handle), None),
        Err(e) => {
            warn!("Config reload disabled: {}", e);
            let (tx, rx) = tokio::sync::watch::channel(Arc::new(config.clone()));
            (rx, None, Some(tx))
        }
    };

    let mut store = CatalogStore::load(&config.streams_dir, &config.image_dir, args.rebuild)?;
    if args.rebuild {
        updater::rebuild(&mut store, &config.mirrors).await?;
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let _watcher = watcher::spawn(&config.image_dir, tx)?;
    info!("Watching {}", config.image_dir.display());

    let mut updater = Updater::new(store, config_rx, rx);
    tokio::select! {
        _ = updater.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    Ok(())
}
