//! Mirror synchronization: push the image tree to remote mirrors via rsync.
//!
//! Mirrors are best-effort: one failing mirror is logged and the rest are
//! still synchronized. The catalog itself never depends on mirror state.

use std::collections::BTreeMap;
use std::path::Path;

use imgstream_core::config::MirrorConfig;
use imgstream_core::error::{Result, StreamError};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

static HOST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://([\w.-]+)").expect("valid host pattern"));

/// Synchronize the image tree to every configured mirror.
pub async fn sync_all(mirrors: &BTreeMap<String, MirrorConfig>, image_dir: &Path) {
    for (name, mirror) in mirrors {
        if let Err(e) = sync_one(name, mirror, image_dir).await {
            warn!("Mirror sync failed: {}", e);
        }
    }
}

async fn sync_one(name: &str, mirror: &MirrorConfig, image_dir: &Path) -> Result<()> {
    let host = host_from_url(&mirror.url).ok_or_else(|| StreamError::MirrorError {
        name: name.to_string(),
        message: format!("Cannot extract host from url {}", mirror.url),
    })?;

    // The tree is pushed into the remote parent so the directory name is
    // preserved on the mirror side.
    let remote_parent = image_dir
        .parent()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "/".to_string());

    info!("Syncing mirror {} ({})", name, host);

    let status = tokio::process::Command::new("rsync")
        .arg("-azh")
        .arg("-e")
        .arg(format!(
            "ssh -i {} -l {}",
            mirror.key_path.display(),
            mirror.user
        ))
        .arg(image_dir)
        .arg(format!("{}:{}", host, remote_parent))
        .arg("--delete")
        .status()
        .await
        .map_err(|e| StreamError::MirrorError {
            name: name.to_string(),
            message: format!("Failed to run rsync: {}", e),
        })?;

    if !status.success() {
        return Err(StreamError::MirrorError {
            name: name.to_string(),
            message: format!("rsync exited with {}", status),
        });
    }

    info!("Mirror {} synced", name);
    Ok(())
}

/// Extract the bare hostname from a mirror url.
fn host_from_url(url: &str) -> Option<&str> {
    HOST_RE.captures(url).map(|c| c.get(1).map_or("", |m| m.as_str()))
}
