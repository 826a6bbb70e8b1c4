//! # Asset Index
//!
//! In-memory view of the remote catalog, built once per run.
//!
//! ## Overview
//!
//! The index answers three questions for the advice engine:
//! - which remote asset was uploaded with this device-scoped id
//! - which remote asset has this id
//! - which remote assets share this display name (collisions are kept, in
//!   listing order)
//!
//! Display names are normalized with [`normalize_name`] so that `IMG_1.JPG`
//! and `IMG_1.jpg` meet in the same bucket.
//!
//! The only mutation after [`AssetIndex::build`] is
//! [`AssetIndex::add_local_asset`], called by a worker right after a
//! successful upload. Reads and that single mutator share one `RwLock`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let index = AssetIndex::build(catalog.as_ref()).await?;
//! if let Some(remote) = index.find_by_device_id(&file.device_asset_id()) {
//!     println!("{} already on server as {}", file.title, remote.id);
//! }
//! ```

use bridge_traits::source::normalize_name;
use bridge_traits::{LocalAssetFile, RemoteAsset, RemoteCatalog};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, info};

use crate::error::Result;

#[derive(Debug, Default)]
struct IndexMaps {
    by_device_id: HashMap<String, Arc<RemoteAsset>>,
    by_id: HashMap<String, Arc<RemoteAsset>>,
    by_name: HashMap<String, Vec<Arc<RemoteAsset>>>,
}

impl IndexMaps {
    fn insert(&mut self, asset: RemoteAsset) -> bool {
        if self.by_id.contains_key(&asset.id) {
            return false;
        }
        let asset = Arc::new(asset);
        self.by_device_id
            .entry(asset.device_asset_id.clone())
            .or_insert_with(|| Arc::clone(&asset));
        self.by_name
            .entry(normalize_name(&asset.original_file_name))
            .or_default()
            .push(Arc::clone(&asset));
        self.by_id.insert(asset.id.clone(), asset);
        true
    }
}

/// Lookup structure over the remote catalog's non-trashed assets.
#[derive(Debug, Default)]
pub struct AssetIndex {
    maps: RwLock<IndexMaps>,
}

impl AssetIndex {
    /// Builds an index from already-fetched assets. Trashed assets are
    /// dropped; a repeated id keeps its first occurrence.
    pub fn from_assets(assets: impl IntoIterator<Item = RemoteAsset>) -> Self {
        let mut maps = IndexMaps::default();
        for asset in assets.into_iter().filter(|a| !a.is_trashed) {
            maps.insert(asset);
        }
        Self {
            maps: RwLock::new(maps),
        }
    }

    /// Pages through the whole catalog and indexes every non-trashed asset.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ReconcileError::Catalog`] if any page fails; a
    /// partial index would turn known assets into uploads.
    pub async fn build(catalog: &dyn RemoteCatalog) -> Result<Self> {
        let mut assets = Vec::new();
        let mut cursor = None;
        let mut page_count = 0usize;
        let mut trashed = 0usize;

        loop {
            page_count += 1;
            debug!("Fetching asset page {} (cursor: {:?})", page_count, cursor);

            let page = match catalog.list_assets(cursor.take()).await {
                Ok(page) => page,
                Err(e) => {
                    error!("Listing asset page {} failed: {}", page_count, e);
                    return Err(e.into());
                }
            };

            for asset in page.assets {
                if asset.is_trashed {
                    trashed += 1;
                } else {
                    assets.push(asset);
                }
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        info!(
            "Indexed {} remote assets from {} pages ({} trashed skipped)",
            assets.len(),
            page_count,
            trashed
        );

        Ok(Self::from_assets(assets))
    }

    pub fn len(&self) -> usize {
        self.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find_by_device_id(&self, device_asset_id: &str) -> Option<Arc<RemoteAsset>> {
        self.read().by_device_id.get(device_asset_id).cloned()
    }

    pub fn find_by_id(&self, id: &str) -> Option<Arc<RemoteAsset>> {
        self.read().by_id.get(id).cloned()
    }

    /// Assets whose normalized display name equals that of `name`, in
    /// insertion order.
    pub fn find_by_name(&self, name: &str) -> Vec<Arc<RemoteAsset>> {
        self.read()
            .by_name
            .get(&normalize_name(name))
            .cloned()
            .unwrap_or_default()
    }

    /// Records a file uploaded during this run under `id`.
    ///
    /// The synthesized entry carries `just_uploaded = true`. Returns `false`
    /// if `id` is already indexed, in which case nothing changes.
    pub fn add_local_asset(&self, file: &LocalAssetFile, id: &str) -> bool {
        let asset = RemoteAsset {
            id: id.to_string(),
            device_asset_id: file.device_asset_id(),
            original_file_name: file.display_name(),
            file_created_at: file.date_taken,
            file_size: file.size,
            is_trashed: false,
            albums: file.albums.iter().map(|a| a.name.clone()).collect(),
            just_uploaded: true,
        };

        self.maps
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(asset)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, IndexMaps> {
        self.maps.read().unwrap_or_else(PoisonError::into_inner)
    }
}
