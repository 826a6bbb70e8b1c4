//! Integration tests for complete upload runs
//!
//! These tests drive `UploadCoordinator::run` against an in-memory catalog
//! and source and verify:
//! - Dispositions and their side effects (upload, replace, album reuse)
//! - Batched album create-or-append
//! - Remote deletion batching and local deletion
//! - Dry-run idempotence
//! - Cancellation

use async_trait::async_trait;
use bridge_traits::{
    AlbumAddResult, AssetPage, AssetSource, AssetUpdate, BridgeError, LocalAlbum,
    LocalAssetFile, RemoteAlbum, RemoteAsset, RemoteCatalog, UploadResponse,
    DUPLICATE_MEMBERSHIP,
};
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use core_async::sync::CancellationToken;
use core_reconcile::{FailureKind, ReconcileError, UploadCoordinator};
use core_runtime::events::{CoreEvent, EventBus, EventStream, UploadEvent};
use core_runtime::UploadConfig;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
struct CatalogState {
    assets: Vec<RemoteAsset>,
    albums: Vec<RemoteAlbum>,
    uploads: Vec<String>,
    deleted: Vec<Vec<String>>,
    created: Vec<(String, Vec<String>)>,
    appended: Vec<(String, Vec<String>)>,
    stacked: Vec<(Vec<String>, String)>,
    next_id: usize,
}

/// In-memory catalog recording every mutation.
#[derive(Default)]
struct FakeCatalog {
    state: Mutex<CatalogState>,
    /// Ids that `add_to_album` reports as already present.
    duplicate_members: HashSet<String>,
    fail_deletes: bool,
    /// Cancelled on the first upload, when set.
    cancel_on_upload: Option<CancellationToken>,
}

impl FakeCatalog {
    fn with_assets(assets: Vec<RemoteAsset>) -> Self {
        let catalog = Self::default();
        catalog.state.lock().unwrap().assets = assets;
        catalog
    }

    fn with_album(self, album: RemoteAlbum) -> Self {
        self.state.lock().unwrap().albums.push(album);
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl RemoteCatalog for FakeCatalog {
    async fn list_assets(&self, cursor: Option<String>) -> bridge_traits::Result<AssetPage> {
        const PAGE: usize = 2;
        let start: usize = cursor.map(|c| c.parse().unwrap()).unwrap_or(0);
        let state = self.state();
        let end = (start + PAGE).min(state.assets.len());
        Ok(AssetPage {
            assets: state.assets[start..end].to_vec(),
            next_cursor: (end < state.assets.len()).then(|| end.to_string()),
        })
    }

    async fn upload(&self, file: &LocalAssetFile, content: Bytes) -> bridge_traits::Result<UploadResponse> {
        assert_eq!(content.len() as u64, file.size);
        if let Some(token) = &self.cancel_on_upload {
            token.cancel();
        }
        let mut state = self.state();
        state.next_id += 1;
        let id = format!("new-{}", state.next_id);
        state.uploads.push(file.file_name.clone());
        Ok(UploadResponse {
            id,
            duplicate: false,
        })
    }

    async fn delete_assets(&self, ids: &[String], permanent: bool) -> bridge_traits::Result<()> {
        assert!(!permanent);
        if self.fail_deletes {
            return Err(BridgeError::Remote {
                status: 500,
                message: "delete refused".into(),
            });
        }
        self.state().deleted.push(ids.to_vec());
        Ok(())
    }

    async fn list_albums(&self) -> bridge_traits::Result<Vec<RemoteAlbum>> {
        Ok(self.state().albums.clone())
    }

    async fn create_album(&self, name: &str, asset_ids: &[String]) -> bridge_traits::Result<RemoteAlbum> {
        let mut state = self.state();
        state.created.push((name.to_string(), asset_ids.to_vec()));
        Ok(RemoteAlbum {
            id: format!("album-{}", state.created.len()),
            name: name.to_string(),
            asset_ids: asset_ids.to_vec(),
        })
    }

    async fn add_to_album(
        &self,
        album_id: &str,
        asset_ids: &[String],
    ) -> bridge_traits::Result<Vec<AlbumAddResult>> {
        self.state()
            .appended
            .push((album_id.to_string(), asset_ids.to_vec()));
        Ok(asset_ids
            .iter()
            .map(|id| {
                let duplicate = self.duplicate_members.contains(id);
                AlbumAddResult {
                    id: id.clone(),
                    success: !duplicate,
                    error: duplicate.then(|| DUPLICATE_MEMBERSHIP.to_string()),
                }
            })
            .collect())
    }

    async fn update_assets(&self, ids: &[String], update: &AssetUpdate) -> bridge_traits::Result<()> {
        let cover = update.stack_parent_id.clone().unwrap_or_default();
        self.state().stacked.push((ids.to_vec(), cover));
        Ok(())
    }
}

/// Serves a fixed list of files.
#[derive(Default)]
struct VecSource {
    files: Vec<LocalAssetFile>,
    removed: Mutex<Vec<String>>,
    released: AtomicUsize,
}

impl VecSource {
    fn new(files: Vec<LocalAssetFile>) -> Self {
        Self {
            files,
            ..Default::default()
        }
    }
}

#[async_trait]
impl AssetSource for VecSource {
    fn browse(&self, cancel: CancellationToken) -> BoxStream<'static, LocalAssetFile> {
        stream::iter(self.files.clone())
            .take_until(cancel.cancelled_owned())
            .boxed()
    }

    async fn read(&self, file: &LocalAssetFile) -> bridge_traits::Result<Bytes> {
        Ok(Bytes::from(vec![0u8; file.size as usize]))
    }

    async fn remove(&self, file: &LocalAssetFile) -> bridge_traits::Result<()> {
        self.removed.lock().unwrap().push(file.file_name.clone());
        Ok(())
    }

    fn release(&self, _file: &LocalAssetFile) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn taken() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 8, 2, 14, 30, 0).unwrap()
}

fn remote(id: &str, name: &str, size: u64, date: DateTime<Utc>) -> RemoteAsset {
    RemoteAsset {
        id: id.to_string(),
        device_asset_id: format!("{}-elsewhere", id),
        original_file_name: name.to_string(),
        file_created_at: Some(date),
        file_size: size,
        is_trashed: false,
        albums: Vec::new(),
        just_uploaded: false,
    }
}

fn config() -> core_runtime::UploadConfigBuilder {
    UploadConfig::builder().worker_count(4)
}

async fn coordinator(
    config: UploadConfig,
    catalog: Arc<FakeCatalog>,
) -> (UploadCoordinator, EventStream) {
    let bus = EventBus::default();
    let events = EventStream::new(bus.subscribe());
    let coordinator = UploadCoordinator::new(config, catalog, bus).await.unwrap();
    (coordinator, events)
}

fn classifications(events: &mut EventStream) -> Vec<(String, String)> {
    let mut found: Vec<(String, String)> = events
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            CoreEvent::Upload(UploadEvent::AssetClassified {
                file_name, advice, ..
            }) => Some((file_name, advice)),
            _ => None,
        })
        .collect();
    found.sort();
    found
}

// ============================================================================
// Tests
// ============================================================================

#[core_async::test]
async fn test_smaller_on_server_is_replaced() {
    let catalog = Arc::new(FakeCatalog::with_assets(vec![remote(
        "old",
        "IMG_0001.JPG",
        1_500_000,
        taken(),
    )]));
    let (coordinator, mut events) = coordinator(config().build().unwrap(), catalog.clone()).await;
    let source = Arc::new(VecSource::new(vec![
        LocalAssetFile::new("IMG_0001.JPG", 2_000_000).with_date_taken(taken()),
    ]));

    let report = coordinator
        .run(source.clone(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        classifications(&mut events),
        vec![("IMG_0001.JPG".to_string(), "SmallerOnServer".to_string())]
    );
    assert_eq!(report.files_uploaded, 1);
    assert_eq!(report.remote_deleted, 1);
    assert_eq!(catalog.state().deleted, vec![vec!["old".to_string()]]);
    assert!(source.removed.lock().unwrap().is_empty());
    assert!(report.is_clean());
}

#[core_async::test]
async fn test_new_asset_is_indexed_after_upload() {
    let catalog = Arc::new(FakeCatalog::with_assets(vec![remote(
        "r1",
        "OTHER.JPG",
        10,
        taken(),
    )]));
    let (coordinator, mut events) = coordinator(config().build().unwrap(), catalog.clone()).await;
    let file = LocalAssetFile::new("2023/IMG_0002.JPG", 64).with_date_taken(taken());
    let source = Arc::new(VecSource::new(vec![file.clone()]));

    let report = coordinator
        .run(source.clone(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.files_scanned, 1);
    assert_eq!(report.files_uploaded, 1);
    assert_eq!(classifications(&mut events)[0].1, "NotOnServer");

    let indexed = coordinator.index().find_by_id("new-1").unwrap();
    assert!(indexed.just_uploaded);
    assert_eq!(
        coordinator
            .index()
            .find_by_device_id(&file.device_asset_id())
            .unwrap()
            .id,
        "new-1"
    );
    assert_eq!(source.released.load(Ordering::SeqCst), 1);
}

#[core_async::test]
async fn test_album_created_once_with_every_upload() {
    let catalog = Arc::new(FakeCatalog::default());
    let (coordinator, _events) =
        coordinator(config().google_photos(true).build().unwrap(), catalog.clone()).await;
    let files = (1..=3)
        .map(|n| {
            LocalAssetFile::new(format!("trip/IMG_{}.JPG", n), 100 + n)
                .with_date_taken(taken() + chrono::Duration::hours(n as i64))
                .with_album(LocalAlbum::new("trip", "Vacation"))
        })
        .collect();

    let report = coordinator
        .run(Arc::new(VecSource::new(files)), CancellationToken::new())
        .await
        .unwrap();

    let state = catalog.state();
    assert_eq!(state.created.len(), 1);
    assert!(state.appended.is_empty());
    let (name, ids) = &state.created[0];
    assert_eq!(name, "Vacation");
    let mut ids = ids.clone();
    ids.sort();
    assert_eq!(ids, vec!["new-1", "new-2", "new-3"]);
    assert_eq!(report.albums_created, 1);
}

#[core_async::test]
async fn test_default_folder_run_leaves_albums_alone() {
    let catalog = Arc::new(FakeCatalog::default());
    let config = config().build().unwrap();
    assert!(!config.create_album_after_folder);
    let (coordinator, _events) = coordinator(config, catalog.clone()).await;
    // Same shape as a FolderSource descriptor: the parent folder is the hint.
    let file = LocalAssetFile::new("2023/Holidays/IMG_1.JPG", 8)
        .with_date_taken(taken())
        .with_album(LocalAlbum::new("2023/Holidays", "Holidays"));

    let report = coordinator
        .run(Arc::new(VecSource::new(vec![file])), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.files_uploaded, 1);
    let state = catalog.state();
    assert!(state.created.is_empty());
    assert!(state.appended.is_empty());
    assert_eq!(report.albums_created, 0);
}

#[core_async::test]
async fn test_folder_run_creates_album_after_folder() {
    let catalog = Arc::new(FakeCatalog::default());
    let (coordinator, _events) = coordinator(
        config().create_album_after_folder(true).build().unwrap(),
        catalog.clone(),
    )
    .await;
    let file = LocalAssetFile::new("2023/Holidays/IMG_1.JPG", 8)
        .with_date_taken(taken())
        .with_album(LocalAlbum::new("2023/Holidays", "Holidays"));

    coordinator
        .run(Arc::new(VecSource::new(vec![file])), CancellationToken::new())
        .await
        .unwrap();

    let state = catalog.state();
    assert_eq!(state.created, vec![("Holidays".to_string(), vec!["new-1".to_string()])]);
}

#[core_async::test]
async fn test_existing_album_appended_with_new_ids_only() {
    let catalog = FakeCatalog::with_assets(vec![remote("m1", "KEEP.JPG", 50, taken())])
        .with_album(RemoteAlbum {
            id: "vac".into(),
            name: "Vacation".into(),
            asset_ids: vec!["m1".into(), "m2".into()],
        });
    let catalog = Arc::new(FakeCatalog {
        duplicate_members: ["new-2".to_string()].into_iter().collect(),
        ..catalog
    });
    let (coordinator, _events) = coordinator(
        config().google_photos(true).worker_count(1).build().unwrap(),
        catalog.clone(),
    )
    .await;
    let hint = LocalAlbum::new("trip", "Vacation");
    let source = Arc::new(VecSource::new(vec![
        LocalAssetFile::new("KEEP.JPG", 50)
            .with_date_taken(taken())
            .with_album(hint.clone()),
        LocalAssetFile::new("a/NEW_1.JPG", 70)
            .with_date_taken(taken())
            .with_album(hint.clone()),
        LocalAssetFile::new("b/NEW_2.JPG", 80)
            .with_date_taken(taken())
            .with_album(hint),
    ]));

    let report = coordinator
        .run(source, CancellationToken::new())
        .await
        .unwrap();

    let state = catalog.state();
    assert!(state.created.is_empty());
    assert_eq!(state.appended.len(), 1);
    let (album_id, ids) = &state.appended[0];
    assert_eq!(album_id, "vac");
    let mut ids = ids.clone();
    ids.sort();
    assert_eq!(ids, vec!["new-1", "new-2"]);
    assert_eq!(report.failures_of(FailureKind::Album).count(), 0);
    assert_eq!(report.albums_updated, 1);
}

#[core_async::test]
async fn test_dry_runs_give_identical_advice() {
    let catalog = Arc::new(FakeCatalog::with_assets(vec![
        remote("r1", "A.JPG", 100, taken()),
        remote("r2", "B.JPG", 100, taken()),
        remote("r3", "C.JPG", 100, taken()),
    ]));
    let files = vec![
        LocalAssetFile::new("A.JPG", 100).with_date_taken(taken()),
        LocalAssetFile::new("B.JPG", 200).with_date_taken(taken()),
        LocalAssetFile::new("C.JPG", 50).with_date_taken(taken()),
        LocalAssetFile::new("D.JPG", 10).with_date_taken(taken()),
    ];

    let mut runs = Vec::new();
    for _ in 0..2 {
        let (coordinator, mut events) =
            coordinator(config().dry_run(true).build().unwrap(), catalog.clone()).await;
        coordinator
            .run(Arc::new(VecSource::new(files.clone())), CancellationToken::new())
            .await
            .unwrap();
        runs.push(classifications(&mut events));
    }

    assert_eq!(runs[0], runs[1]);
    assert_eq!(
        runs[0].iter().map(|(_, a)| a.as_str()).collect::<Vec<_>>(),
        vec!["SameOnServer", "SmallerOnServer", "BetterOnServer", "NotOnServer"]
    );

    let state = catalog.state();
    assert!(state.uploads.is_empty());
    assert!(state.deleted.is_empty());
    assert!(state.created.is_empty());
}

#[core_async::test]
async fn test_local_deletion_and_remote_failure() {
    let catalog = Arc::new(FakeCatalog {
        fail_deletes: true,
        ..FakeCatalog::with_assets(vec![remote("old", "X.JPG", 1, taken())])
    });
    let (coordinator, _events) =
        coordinator(config().delete_local(true).build().unwrap(), catalog.clone()).await;
    let source = Arc::new(VecSource::new(vec![
        LocalAssetFile::new("X.JPG", 5).with_date_taken(taken()),
        LocalAssetFile::new("Y.JPG", 5).with_date_taken(taken()),
    ]));

    let report = coordinator
        .run(source.clone(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.files_uploaded, 2);
    assert_eq!(report.failures_of(FailureKind::RemoteDeletion).count(), 1);
    assert_eq!(report.local_deleted, 0);
    assert!(source.removed.lock().unwrap().is_empty());
}

#[core_async::test]
async fn test_local_files_deleted_after_upload() {
    let catalog = Arc::new(FakeCatalog::with_assets(vec![remote("same", "S.JPG", 5, taken())]));
    let (coordinator, _events) =
        coordinator(config().delete_local(true).build().unwrap(), catalog.clone()).await;
    let source = Arc::new(VecSource::new(vec![
        LocalAssetFile::new("S.JPG", 5).with_date_taken(taken()),
        LocalAssetFile::new("N.JPG", 5).with_date_taken(taken()),
        LocalAssetFile::new("notes.txt", 5),
    ]));

    let report = coordinator
        .run(source.clone(), CancellationToken::new())
        .await
        .unwrap();

    let mut removed = source.removed.lock().unwrap().clone();
    removed.sort();
    assert_eq!(removed, vec!["N.JPG", "S.JPG"]);
    assert_eq!(report.local_deleted, 2);
    assert_eq!(report.files_scanned, 3);
    assert_eq!(source.released.load(Ordering::SeqCst), 3);
}

#[core_async::test]
async fn test_raw_and_jpeg_uploads_are_stacked() {
    let catalog = Arc::new(FakeCatalog::default());
    let (coordinator, _events) = coordinator(config().worker_count(1).build().unwrap(), catalog.clone()).await;
    let source = Arc::new(VecSource::new(vec![
        LocalAssetFile::new("shoot/DSC_0042.NEF", 30).with_date_taken(taken()),
        LocalAssetFile::new("shoot/DSC_0042.JPG", 10).with_date_taken(taken()),
    ]));

    let report = coordinator
        .run(source, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.stacks_created, 1);
    assert_eq!(
        catalog.state().stacked,
        vec![(vec!["new-1".to_string()], "new-2".to_string())]
    );
}

#[core_async::test]
async fn test_cancellation_skips_flush_phases() {
    let cancel = CancellationToken::new();
    let catalog = Arc::new(FakeCatalog {
        cancel_on_upload: Some(cancel.clone()),
        ..FakeCatalog::default()
    });
    let (coordinator, mut events) =
        coordinator(config().worker_count(1).build().unwrap(), catalog.clone()).await;
    let files = (0..50)
        .map(|n| {
            LocalAssetFile::new(format!("f/IMG_{}.JPG", n), 10)
                .with_album(LocalAlbum::new("f", "Album"))
        })
        .collect();

    let result = coordinator.run(Arc::new(VecSource::new(files)), cancel).await;

    assert!(matches!(result, Err(ReconcileError::Cancelled)));
    let state = catalog.state();
    assert_eq!(state.uploads.len(), 1);
    assert!(state.created.is_empty());
    assert!(state.stacked.is_empty());
    assert!(events.drain().iter().any(|event| matches!(
        event,
        CoreEvent::Upload(UploadEvent::Cancelled { .. })
    )));
}
