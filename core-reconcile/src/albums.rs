//! # Album Reconciler
//!
//! Accumulates, per album name, the asset ids that must belong to it, and
//! applies the whole map in one pass after the workers are done.
//!
//! ## Flush
//!
//! 1. List the remote albums once.
//! 2. For every accumulated album, in name order:
//!    - albums with that name exist: append to each of them only the ids it
//!      does not already list, in one call; per-asset `duplicate` answers are
//!      fine
//!    - otherwise: create it with the full id set
//! 3. Every album that fails is recorded and the next one is tried.

use bridge_traits::{RemoteAlbum, RemoteCatalog};
use core_async::sync::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::report::{DeferredFailure, FailureKind};

/// Summary of an album flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlbumFlushStats {
    pub created: usize,
    pub updated: usize,
    /// Assets newly placed into existing albums.
    pub assets_added: usize,
    pub failures: Vec<DeferredFailure>,
}

/// Album name → asset ids, shared by all workers.
#[derive(Debug, Default)]
pub struct AlbumReconciler {
    pending: Mutex<BTreeMap<String, BTreeSet<String>>>,
}

impl AlbumReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `asset_id` belongs in `album`. Blank names are ignored.
    pub async fn add(&self, album: &str, asset_id: &str) {
        if album.trim().is_empty() {
            return;
        }
        self.pending
            .lock()
            .await
            .entry(album.to_string())
            .or_default()
            .insert(asset_id.to_string());
    }

    /// Snapshot of the accumulated membership.
    pub async fn pending(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.pending.lock().await.clone()
    }

    /// Applies the accumulated membership to the catalog and empties it.
    ///
    /// Ids in `excluded` (assets queued for remote deletion) are never
    /// appended or used to create an album. In a dry run the remote list is
    /// still read but nothing is written.
    pub async fn flush(
        &self,
        catalog: &dyn RemoteCatalog,
        excluded: &HashSet<String>,
        dry_run: bool,
    ) -> AlbumFlushStats {
        let pending = std::mem::take(&mut *self.pending.lock().await);
        let mut stats = AlbumFlushStats::default();
        if pending.is_empty() {
            return stats;
        }

        let remote_albums = match catalog.list_albums().await {
            Ok(albums) => albums,
            Err(e) => {
                warn!("Can't list remote albums, {} albums left untouched: {}", pending.len(), e);
                stats.failures.extend(pending.keys().map(|name| {
                    DeferredFailure::new(
                        FailureKind::Album,
                        name,
                        format!("listing albums failed: {}", e),
                    )
                }));
                return stats;
            }
        };
        let mut by_name: HashMap<&str, Vec<&RemoteAlbum>> = HashMap::new();
        for album in &remote_albums {
            by_name.entry(album.name.as_str()).or_default().push(album);
        }

        for (name, ids) in pending {
            let ids: Vec<String> = ids.into_iter().filter(|id| !excluded.contains(id)).collect();
            if ids.is_empty() {
                continue;
            }

            match by_name.get(name.as_str()) {
                Some(albums) => {
                    for album in albums {
                        self.append(catalog, album, &name, ids.clone(), dry_run, &mut stats)
                            .await;
                    }
                }
                None => self.create(catalog, &name, ids, dry_run, &mut stats).await,
            }
        }

        info!(
            "Albums reconciled: {} created, {} updated, {} failed",
            stats.created,
            stats.updated,
            stats.failures.len()
        );
        stats
    }

    async fn append(
        &self,
        catalog: &dyn RemoteCatalog,
        album: &RemoteAlbum,
        name: &str,
        ids: Vec<String>,
        dry_run: bool,
        stats: &mut AlbumFlushStats,
    ) {
        let existing: HashSet<&str> = album.asset_ids.iter().map(String::as_str).collect();
        let new_ids: Vec<String> = ids
            .into_iter()
            .filter(|id| !existing.contains(id.as_str()))
            .collect();
        if new_ids.is_empty() {
            debug!("Album {:?} already up to date", name);
            return;
        }

        if dry_run {
            info!("Album {:?}: {} assets would be added (dry run)", name, new_ids.len());
            stats.updated += 1;
            return;
        }

        match catalog.add_to_album(&album.id, &new_ids).await {
            Ok(results) => {
                let mut added = 0;
                let mut rejected = Vec::new();
                for result in &results {
                    if result.success {
                        added += 1;
                    } else if !result.is_duplicate() {
                        rejected.push(format!(
                            "{} ({})",
                            result.id,
                            result.error.as_deref().unwrap_or("unknown error")
                        ));
                    }
                }
                info!("Album {:?}: {} assets added", name, added);
                stats.updated += 1;
                stats.assets_added += added;
                if !rejected.is_empty() {
                    warn!("Album {:?}: {} assets rejected", name, rejected.len());
                    stats.failures.push(DeferredFailure::new(
                        FailureKind::Album,
                        name,
                        format!("assets rejected: {}", rejected.join(", ")),
                    ));
                }
            }
            Err(e) => {
                warn!("Can't add assets to album {:?}: {}", name, e);
                stats
                    .failures
                    .push(DeferredFailure::new(FailureKind::Album, name, e.to_string()));
            }
        }
    }

    async fn create(
        &self,
        catalog: &dyn RemoteCatalog,
        name: &str,
        ids: Vec<String>,
        dry_run: bool,
        stats: &mut AlbumFlushStats,
    ) {
        if dry_run {
            info!("Album {:?} would be created with {} assets (dry run)", name, ids.len());
            stats.created += 1;
            return;
        }

        match catalog.create_album(name, &ids).await {
            Ok(album) => {
                info!("Album {:?} created ({}) with {} assets", name, album.id, ids.len());
                stats.created += 1;
            }
            Err(e) => {
                warn!("Can't create album {:?}: {}", name, e);
                stats
                    .failures
                    .push(DeferredFailure::new(FailureKind::Album, name, e.to_string()));
            }
        }
    }
}
