//! # Deletion Sets
//!
//! Remote assets replaced by better local copies and local files already
//! safe on the server are only queued while workers run. Both queues are
//! drained once, after stacks and albums are flushed.
//!
//! - Remote: one batched `delete_assets` call with every queued id. A failure
//!   is recorded and local deletion is skipped for the run.
//! - Local: removed one by one through the source; each failure is recorded
//!   and the next file is tried.

use bridge_traits::{AssetSource, LocalAssetFile, RemoteCatalog};
use core_async::sync::{mpsc, Mutex};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::report::{DeferredFailure, FailureKind};

/// Everything queued during a run, deduplicated.
#[derive(Debug, Default, Clone)]
pub struct DrainedDeletions {
    /// Remote ids in first-queued order
    pub remote: Vec<String>,
    /// Local files in first-queued order, keyed by file name
    pub local: Vec<LocalAssetFile>,
}

impl DrainedDeletions {
    pub fn remote_ids(&self) -> HashSet<String> {
        self.remote.iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.remote.is_empty() && self.local.is_empty()
    }
}

/// Summary of the deletion phase.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeletionStats {
    pub remote_deleted: usize,
    pub local_deleted: usize,
    pub failures: Vec<DeferredFailure>,
}

#[derive(Debug)]
pub struct DeletionSets {
    remote_tx: mpsc::UnboundedSender<String>,
    remote_rx: Mutex<mpsc::UnboundedReceiver<String>>,
    local_tx: mpsc::UnboundedSender<LocalAssetFile>,
    local_rx: Mutex<mpsc::UnboundedReceiver<LocalAssetFile>>,
}

impl Default for DeletionSets {
    fn default() -> Self {
        Self::new()
    }
}

impl DeletionSets {
    pub fn new() -> Self {
        let (remote_tx, remote_rx) = mpsc::unbounded_channel();
        let (local_tx, local_rx) = mpsc::unbounded_channel();
        Self {
            remote_tx,
            remote_rx: Mutex::new(remote_rx),
            local_tx,
            local_rx: Mutex::new(local_rx),
        }
    }

    /// Queues a remote asset for deletion.
    pub fn push_remote(&self, id: impl Into<String>) {
        // Both halves are owned by `self`; sending cannot fail.
        let _ = self.remote_tx.send(id.into());
    }

    /// Queues a local file for deletion.
    pub fn push_local(&self, file: LocalAssetFile) {
        let _ = self.local_tx.send(file);
    }

    /// Takes everything queued so far. Repeated pushes of the same id or
    /// file name collapse into one entry.
    pub async fn drain(&self) -> DrainedDeletions {
        let mut drained = DrainedDeletions::default();

        let mut seen = HashSet::new();
        let mut remote_rx = self.remote_rx.lock().await;
        while let Ok(id) = remote_rx.try_recv() {
            if seen.insert(id.clone()) {
                drained.remote.push(id);
            }
        }

        let mut seen = HashSet::new();
        let mut local_rx = self.local_rx.lock().await;
        while let Ok(file) = local_rx.try_recv() {
            if seen.insert(file.file_name.clone()) {
                drained.local.push(file);
            }
        }

        debug!(
            "Drained {} remote and {} local deletions",
            drained.remote.len(),
            drained.local.len()
        );
        drained
    }
}

/// Applies a drained deletion set: remote batch first, then local files.
pub async fn apply_deletions(
    deletions: DrainedDeletions,
    catalog: &dyn RemoteCatalog,
    source: &dyn AssetSource,
    dry_run: bool,
) -> DeletionStats {
    let mut stats = DeletionStats::default();

    if !deletions.remote.is_empty() {
        if dry_run {
            info!(
                "{} remote assets would be deleted (dry run)",
                deletions.remote.len()
            );
            stats.remote_deleted = deletions.remote.len();
        } else {
            match catalog.delete_assets(&deletions.remote, false).await {
                Ok(()) => {
                    info!("{} remote assets deleted", deletions.remote.len());
                    stats.remote_deleted = deletions.remote.len();
                }
                Err(e) => {
                    warn!(
                        "Can't delete {} remote assets, local deletion skipped: {}",
                        deletions.remote.len(),
                        e
                    );
                    stats.failures.push(DeferredFailure::new(
                        FailureKind::RemoteDeletion,
                        "remote",
                        e.to_string(),
                    ));
                    return stats;
                }
            }
        }
    }

    for file in &deletions.local {
        if dry_run {
            info!("{} would be deleted (dry run)", file.file_name);
            stats.local_deleted += 1;
            continue;
        }

        match source.remove(file).await {
            Ok(()) => {
                debug!("Deleted local file {}", file.file_name);
                stats.local_deleted += 1;
            }
            Err(e) => {
                warn!("Can't delete local file {}: {}", file.file_name, e);
                stats.failures.push(DeferredFailure::new(
                    FailureKind::LocalDeletion,
                    &file.file_name,
                    e.to_string(),
                ));
            }
        }
    }

    if !deletions.local.is_empty() {
        info!("{} local files deleted", stats.local_deleted);
    }
    stats
}
