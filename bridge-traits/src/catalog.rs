//! Remote Asset Catalog
//!
//! The operations the reconciliation engine needs from the remote media
//! server. The wire protocol belongs to the implementation; the engine only
//! sees these types.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::source::LocalAssetFile;

/// Error text the catalog reports when an asset is already in an album.
pub const DUPLICATE_MEMBERSHIP: &str = "duplicate";

/// An asset stored in the remote catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteAsset {
    pub id: String,
    /// Identifier the asset was uploaded with.
    pub device_asset_id: String,
    pub original_file_name: String,
    pub file_created_at: Option<DateTime<Utc>>,
    pub file_size: u64,
    pub is_trashed: bool,
    /// Names of the albums this asset belongs to.
    #[serde(default)]
    pub albums: Vec<String>,
    /// Set on entries inserted during the current run.
    #[serde(skip)]
    pub just_uploaded: bool,
}

/// One page of a catalog listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetPage {
    pub assets: Vec<RemoteAsset>,
    /// Cursor for the next page; `None` on the last page.
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub id: String,
    /// The catalog already had identical content and did not store a copy.
    pub duplicate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAlbum {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub asset_ids: Vec<String>,
}

/// Per-asset outcome of an album append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumAddResult {
    pub id: String,
    pub success: bool,
    pub error: Option<String>,
}

impl AlbumAddResult {
    /// The asset was already a member; not a failure.
    pub fn is_duplicate(&self) -> bool {
        self.error.as_deref() == Some(DUPLICATE_MEMBERSHIP)
    }
}

/// Bulk asset update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetUpdate {
    pub archived: Option<bool>,
    pub favorite: Option<bool>,
    pub remove_parent: bool,
    pub stack_parent_id: Option<String>,
}

impl AssetUpdate {
    /// Update that puts the assets in a stack under `cover_id`.
    pub fn stack_under(cover_id: impl Into<String>) -> Self {
        Self {
            stack_parent_id: Some(cover_id.into()),
            ..Self::default()
        }
    }
}

/// Remote media catalog.
///
/// Every mutation is attempted at most once by the engine; implementations
/// should not retry internally either, so that a failure surfaces exactly
/// once in the run report.
#[async_trait::async_trait]
pub trait RemoteCatalog: Send + Sync {
    /// Fetch one page of assets, starting at `cursor` (`None` for the first).
    async fn list_assets(&self, cursor: Option<String>) -> Result<AssetPage>;

    /// Upload one file (and its sidecar, when attached).
    async fn upload(&self, file: &LocalAssetFile, content: Bytes) -> Result<UploadResponse>;

    /// Delete assets in one request.
    async fn delete_assets(&self, ids: &[String], permanent: bool) -> Result<()>;

    async fn list_albums(&self) -> Result<Vec<RemoteAlbum>>;

    async fn create_album(&self, name: &str, asset_ids: &[String]) -> Result<RemoteAlbum>;

    async fn add_to_album(&self, album_id: &str, asset_ids: &[String])
        -> Result<Vec<AlbumAddResult>>;

    async fn update_assets(&self, ids: &[String], update: &AssetUpdate) -> Result<()>;
}
