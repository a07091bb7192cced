//! `imgstream update`: one-shot catalog rebuild.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Args;
use tracing::info;

use imgstream_catalog::{updater, CatalogStore};

/// Arguments for the `update` command.
#[derive(Args)]
pub struct UpdateArgs {
    /// Root of the image tree
    #[arg(default_value = "/var/www/simplestreams/images")]
    pub img_dir: PathBuf,

    /// Directory the stream documents are written to
    #[arg(default_value = "/var/www/simplestreams/streams/v1")]
    pub streams_dir: PathBuf,
}

/// Rebuild both documents from a full scan, discarding any prior state.
pub async fn execute(args: UpdateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = CatalogStore::load(&args.streams_dir, &args.img_dir, true)?;
    updater::rebuild(&mut store, &BTreeMap::new()).await?;
    info!(
        "Catalog updated: {} products",
        store.images().products.len()
    );
    Ok(())
}
