//! Updater: the single consumer of the watcher event stream.
//!
//! Batches are drained after a short settle delay, classified into
//! operations, applied to the store, persisted, and finally pushed to the
//! mirrors. All catalog mutation happens here, on one task, so no locking
//! is needed around the documents.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use imgstream_core::config::{MirrorConfig, ServerConfig};
use imgstream_core::error::{Result, StreamError};
use imgstream_core::event::ChangeEvent;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

use crate::mirror;
use crate::operation::{self, classify, Operation, OperationKind, OperationSet};
use crate::store::CatalogStore;

/// How long to wait after the first event of a batch before draining the
/// channel, so a burst of related events lands in one classification pass.
const SETTLE: Duration = Duration::from_millis(500);

/// The catalog update loop.
///
/// Owns the store; the config receiver supplies the current snapshot at
/// each batch boundary. Image and streams directories are fixed at startup,
/// only the mirror set follows reloads.
pub struct Updater {
    store: CatalogStore,
    config: watch::Receiver<Arc<ServerConfig>>,
    rx: mpsc::UnboundedReceiver<Vec<ChangeEvent>>,
}

impl Updater {
    pub fn new(
        store: CatalogStore,
        config: watch::Receiver<Arc<ServerConfig>>,
        rx: mpsc::UnboundedReceiver<Vec<ChangeEvent>>,
    ) -> Self {
        Self { store, config, rx }
    }

    /// The current catalog state.
    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    /// Consume event batches until the sending side closes.
    pub async fn run(&mut self) {
        while let Some(first) = self.rx.recv().await {
            tokio::time::sleep(SETTLE).await;

            let mut events = first;
            while let Ok(more) = self.rx.try_recv() {
                events.extend(more);
            }

            self.process(&events).await;
        }
    }

    async fn process(&mut self, events: &[ChangeEvent]) {
        let ops = classify(events, self.store.image_root());
        if ops.is_empty() {
            return;
        }

        for op in ops.iter() {
            info!("Operation: {}", op);
        }

        let result = self.store.update(&ops).and_then(|_| self.store.save());
        if let Err(e) = result {
            error!("Catalog update failed, reverting to saved state: {}", e);
            self.revert();
            return;
        }

        let config = self.config.borrow().clone();
        mirror::sync_all(&config.mirrors, self.store.image_root()).await;
    }

    /// Replace the in-memory state with the last persisted documents.
    fn revert(&mut self) {
        let streams_dir = self.store.streams_dir().to_path_buf();
        let image_root = self.store.image_root().to_path_buf();
        match CatalogStore::load(&streams_dir, &image_root, false) {
            Ok(store) => self.store = store,
            Err(e) => error!("Failed to reload catalog from disk: {}", e),
        }
    }
}

/// Enumerate every version directory under `root` as an ADD_MOD operation.
pub fn rebuild_operations(root: &Path) -> Result<OperationSet> {
    if !root.is_dir() {
        return Err(StreamError::CatalogError(format!(
            "Image root {} is not a directory",
            root.display()
        )));
    }

    let mut ops = OperationSet::default();
    let mut failed = None;
    operation::walk_version_dirs(root, &mut |version_dir| {
        match Operation::new(version_dir.to_path_buf(), OperationKind::AddMod, root) {
            Ok(op) => ops.insert(op),
            Err(e) => failed = Some(e),
        }
    });
    if let Some(e) = failed {
        return Err(e);
    }
    Ok(ops)
}

/// Rebuild the catalog from a full scan of the image tree, persist it, and
/// synchronize the mirrors.
pub async fn rebuild(
    store: &mut CatalogStore,
    mirrors: &BTreeMap<String, MirrorConfig>,
) -> Result<()> {
    let ops = rebuild_operations(store.image_root())?;
    info!(
        "Rebuilding catalog from {} ({} versions)",
        store.image_root().display(),
        ops.len()
    );
    store.update(&ops)?;
    store.save()?;
    mirror::sync_all(mirrors, store.image_root()).await;
    Ok(())
}
