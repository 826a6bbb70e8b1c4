//! # Upload Coordinator
//!
//! Reconciles a local media source against the remote catalog and drives
//! uploads, stacking, album membership and deletions.
//!
//! ## Overview
//!
//! `UploadCoordinator` owns the run configuration, the remote catalog client
//! and the [`AssetIndex`] built when the coordinator is created. Each call to
//! [`UploadCoordinator::run`] creates a fresh `RunState` shared by the
//! workers: counters, the failure log and the three accumulators
//! ([`StackBuilder`], [`AlbumReconciler`], [`DeletionSets`]).
//!
//! ## Workflow
//!
//! 1. Browse the source and classify every file on the worker pool
//!    - guards (extension, partner, trash, album and date filters)
//!    - advice against the index
//!    - upload when the advice says so, then accumulate stacks, albums and
//!      deletions
//! 2. Wait for every worker
//! 3. Flush stacks
//! 4. Drain the deletion sets, then reconcile albums without the assets about
//!    to be deleted
//! 5. Apply the deletions: remote batch first, then local files
//!
//! Cancellation stops dispatch, skips the flush phases and fails the run with
//! [`ReconcileError::Cancelled`]. Every other failure is collected in the
//! [`UploadReport`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_reconcile::UploadCoordinator;
//! use core_runtime::{EventBus, UploadConfig};
//!
//! let config = UploadConfig::builder().create_album_after_folder(true).build()?;
//! let coordinator = UploadCoordinator::new(config, catalog, EventBus::default()).await?;
//! let report = coordinator.run(source, CancellationToken::new()).await?;
//! println!("{} uploaded, {} failures", report.files_uploaded, report.failures.len());
//! ```

use bridge_traits::source::base_name;
use bridge_traits::{
    AssetSource, AssetUpdate, Clock, LocalAlbum, LocalAssetFile, RemoteCatalog, SideCar,
    SystemClock,
};
use core_async::sync::CancellationToken;
use core_runtime::events::{CoreEvent, EventBus, UploadEvent};
use core_runtime::logging::strip_path;
use core_runtime::UploadConfig;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    advice::{should_upload, AdviceCode},
    albums::AlbumReconciler,
    asset_index::AssetIndex,
    deletion::{apply_deletions, DeletionSets},
    media::media_kind,
    pipeline::WorkerPool,
    report::{DeferredFailure, FailureKind, FailureLog, RunCounters, RunId, UploadReport},
    stacking::StackBuilder,
    ReconcileError, Result,
};

/// A progress event is emitted every this many scanned files.
pub const PROGRESS_INTERVAL: u64 = 50;

pub struct UploadCoordinator {
    config: Arc<UploadConfig>,
    catalog: Arc<dyn RemoteCatalog>,
    event_bus: EventBus,
    index: Arc<AssetIndex>,
    clock: Arc<dyn Clock>,
}

impl UploadCoordinator {
    /// Validates `config` and indexes the whole remote catalog.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::Config`] if the options are inconsistent
    /// - [`ReconcileError::Catalog`] if any listing page fails
    #[instrument(skip_all)]
    pub async fn new(
        config: UploadConfig,
        catalog: Arc<dyn RemoteCatalog>,
        event_bus: EventBus,
    ) -> Result<Self> {
        config.validate()?;
        let index = AssetIndex::build(catalog.as_ref()).await?;

        Ok(Self {
            config: Arc::new(config),
            catalog,
            event_bus,
            index: Arc::new(index),
            clock: Arc::new(SystemClock),
        })
    }

    /// Replaces the clock used for report timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// The remote index, including assets uploaded by earlier runs of this
    /// coordinator.
    pub fn index(&self) -> &AssetIndex {
        &self.index
    }

    /// Processes every file of `source` and applies the deferred mutations.
    #[instrument(skip(self, source, cancel), fields(dry_run = self.config.dry_run))]
    pub async fn run(
        &self,
        source: Arc<dyn AssetSource>,
        cancel: CancellationToken,
    ) -> Result<UploadReport> {
        let run_id = RunId::new();
        let started_at = self.clock.now();
        let state = Arc::new(RunState {
            run_id,
            config: Arc::clone(&self.config),
            catalog: Arc::clone(&self.catalog),
            source: Arc::clone(&source),
            index: Arc::clone(&self.index),
            event_bus: self.event_bus.clone(),
            cancel: cancel.clone(),
            counters: RunCounters::default(),
            failures: FailureLog::default(),
            stacks: StackBuilder::new(self.config.burst_window_ms),
            albums: AlbumReconciler::new(),
            deletions: DeletionSets::new(),
        });

        let pool = WorkerPool::new(self.config.worker_count);
        info!(
            "Starting run {} with {} workers against {} indexed assets",
            run_id,
            pool.workers(),
            self.index.len()
        );
        self.emit(UploadEvent::Started {
            run_id: run_id.to_string(),
            worker_count: pool.workers(),
            dry_run: self.config.dry_run,
            indexed_assets: self.index.len(),
        });

        // Phase 1: Classify and upload
        info!("Phase 1: Classifying local files");
        let worker_state = Arc::clone(&state);
        let outcome = pool
            .run(source.browse(cancel.clone()), &cancel, move |file| {
                let state = Arc::clone(&worker_state);
                async move { state.handle_file(file).await }
            })
            .await;

        if outcome.cancelled || cancel.is_cancelled() {
            let scanned = state.counters.scanned();
            warn!("Run {} cancelled after {} files", run_id, scanned);
            self.emit(UploadEvent::Cancelled {
                run_id: run_id.to_string(),
                files_scanned: scanned,
            });
            return Err(ReconcileError::Cancelled);
        }

        if outcome.panicked > 0 {
            state.failures.record(DeferredFailure::new(
                FailureKind::Upload,
                "worker",
                format!("{} workers panicked", outcome.panicked),
            ));
        }

        // Phase 2: Stacks
        info!("Phase 2: Building stacks");
        self.emit_phase(run_id, "stacks");
        let stacks_created = state.flush_stacks().await;

        // Phase 3: Albums, skipping assets queued for remote deletion
        info!("Phase 3: Reconciling albums");
        self.emit_phase(run_id, "albums");
        let deletions = state.deletions.drain().await;
        let album_stats = state
            .albums
            .flush(
                self.catalog.as_ref(),
                &deletions.remote_ids(),
                self.config.dry_run,
            )
            .await;
        state.failures.extend(album_stats.failures);

        // Phase 4: Deletions
        info!("Phase 4: Applying deletions");
        self.emit_phase(run_id, "deletions");
        let deletion_stats = apply_deletions(
            deletions,
            self.catalog.as_ref(),
            source.as_ref(),
            self.config.dry_run,
        )
        .await;
        state.failures.extend(deletion_stats.failures);

        let report = UploadReport {
            run_id,
            started_at,
            finished_at: self.clock.now(),
            files_scanned: state.counters.scanned(),
            files_uploaded: state.counters.uploaded(),
            stacks_created,
            albums_created: album_stats.created,
            albums_updated: album_stats.updated,
            remote_deleted: deletion_stats.remote_deleted,
            local_deleted: deletion_stats.local_deleted,
            failures: state.failures.take(),
        };

        info!(
            "{} media scanned, {} uploaded.",
            report.files_scanned, report.files_uploaded
        );
        if !report.is_clean() {
            warn!("Run {} finished with {} failures", run_id, report.failures.len());
        }

        self.emit(UploadEvent::Completed {
            run_id: run_id.to_string(),
            files_scanned: report.files_scanned,
            files_uploaded: report.files_uploaded,
            failures: report.failures.len(),
            duration_secs: report.duration_secs(),
        });

        Ok(report)
    }

    fn emit(&self, event: UploadEvent) {
        self.event_bus.emit(CoreEvent::Upload(event)).ok();
    }

    fn emit_phase(&self, run_id: RunId, phase: &str) {
        self.emit(UploadEvent::PhaseStarted {
            run_id: run_id.to_string(),
            phase: phase.to_string(),
        });
    }
}

// ============================================================================
// Run State
// ============================================================================

/// Everything one run shares between its workers.
struct RunState {
    run_id: RunId,
    config: Arc<UploadConfig>,
    catalog: Arc<dyn RemoteCatalog>,
    source: Arc<dyn AssetSource>,
    index: Arc<AssetIndex>,
    event_bus: EventBus,
    cancel: CancellationToken,
    counters: RunCounters,
    failures: FailureLog,
    stacks: StackBuilder,
    albums: AlbumReconciler,
    deletions: DeletionSets,
}

impl RunState {
    async fn handle_file(&self, file: LocalAssetFile) {
        let scanned = self.counters.record_scanned();
        if scanned % PROGRESS_INTERVAL == 0 {
            info!("{} media scanned...", scanned);
            self.emit(UploadEvent::Progress {
                run_id: self.run_id.to_string(),
                files_scanned: scanned,
                files_uploaded: self.counters.uploaded(),
            });
        }

        self.process(&file).await;
        self.source.release(&file);
    }

    async fn process(&self, file: &LocalAssetFile) {
        if self.cancel.is_cancelled() {
            return;
        }

        let file = match self.admit(file) {
            Ok(file) => file,
            Err(reason) => {
                debug!("{} skipped: {}", file.file_name, reason);
                self.emit(UploadEvent::AssetSkipped {
                    file_name: file.file_name.clone(),
                    reason,
                });
                return;
            }
        };

        let advice = should_upload(&self.index, &file);
        info!("{}: {}", file.title, advice.message);
        self.emit(UploadEvent::AssetClassified {
            file_name: file.file_name.clone(),
            advice: advice.code.to_string(),
            message: advice.message.clone(),
        });

        match (advice.code, advice.server_asset) {
            (AdviceCode::SmallerOnServer, Some(remote)) => {
                if let Some(id) = self.upload(&file).await {
                    self.deletions.push_remote(remote.id.clone());
                    // The better copy inherits the albums of the one it replaces.
                    self.add_to_albums(&file, &id, &remote.albums).await;
                    if self.config.delete_local {
                        self.deletions.push_local(file);
                    }
                }
            }
            (AdviceCode::SameOnServer, Some(remote)) => {
                self.add_to_albums(&file, &remote.id, &[]).await;
                if self.config.delete_local && !remote.just_uploaded {
                    self.deletions.push_local(file);
                }
            }
            (AdviceCode::BetterOnServer, Some(remote)) => {
                self.add_to_albums(&file, &remote.id, &[]).await;
            }
            _ => {
                if let Some(id) = self.upload(&file).await {
                    self.add_to_albums(&file, &id, &[]).await;
                    if self.config.delete_local {
                        self.deletions.push_local(file);
                    }
                }
            }
        }
    }

    /// Applies the per-file filters. Returns the file with its album hints
    /// trimmed, or the reason it was skipped.
    fn admit(&self, file: &LocalAssetFile) -> std::result::Result<LocalAssetFile, String> {
        let config = &self.config;

        if let Some(err) = &file.error {
            warn!("Metadata error on {}: {}", file.file_name, err);
            return Err(format!("metadata error: {}", err));
        }

        let ext = file.extension().unwrap_or_default();
        if media_kind(&ext).is_none() {
            return Err("not a supported media type".to_string());
        }
        if !config.accepts_extension(&ext) {
            return Err(format!("extension {:?} filtered out", ext));
        }

        if file.from_partner && !config.keep_partner {
            return Err("partner file".to_string());
        }

        if file.trashed && !config.keep_trashed {
            return Err("trashed file".to_string());
        }

        if let Some(album) = &config.from_album {
            let in_album = file
                .albums
                .iter()
                .any(|hint| self.album_name(hint).as_deref() == Some(album.as_str()));
            if !in_album {
                return Err(format!("not in album {:?}", album));
            }
        }

        if let Some(range) = &config.date_range {
            match file.date_taken {
                None => {
                    error!(
                        "Can't get capture date of the file. File {:?} skipped",
                        file.file_name
                    );
                    return Err("unknown capture date".to_string());
                }
                Some(date) if !range.contains(date) => {
                    return Err(format!("captured outside {}", range));
                }
                Some(_) => {}
            }
        }

        let mut file = file.clone();
        if !config.keep_untitled_albums {
            file.albums.retain(|hint| !hint.name.is_empty());
        }
        Ok(file)
    }

    /// Album name for a hint; `None` when the hint has no usable name.
    fn album_name(&self, hint: &LocalAlbum) -> Option<String> {
        let config = &self.config;
        let mut name = hint.name.as_str();
        if config.is_google_photos()
            && (config.use_folder_as_album_name
                || (config.keep_untitled_albums && name.is_empty()))
        {
            name = hint.path.as_str();
        }
        (!name.trim().is_empty()).then(|| name.to_string())
    }

    /// Albums `file` must belong to after this run. Source album hints only
    /// count for Google Photos takeouts; a plain folder becomes an album
    /// through `create_album_after_folder`.
    fn album_targets(&self, file: &LocalAssetFile) -> Vec<String> {
        let config = &self.config;
        if let Some(album) = &config.import_into_album {
            return vec![album.clone()];
        }

        let mut targets = Vec::new();
        if config.is_google_photos() && config.create_albums {
            targets.extend(file.albums.iter().filter_map(|hint| self.album_name(hint)));
        }
        if !config.is_google_photos() && config.create_album_after_folder {
            let folder = base_name(file.parent_dir());
            if !folder.is_empty() && folder != "." {
                targets.push(folder.to_string());
            }
        }
        if file.from_partner {
            if let Some(album) = &config.partner_album {
                targets.push(album.clone());
            }
        }

        targets.sort();
        targets.dedup();
        targets
    }

    /// Queues `id` for every album of `file`, plus `inherited` albums of a
    /// replaced asset.
    async fn add_to_albums(&self, file: &LocalAssetFile, id: &str, inherited: &[String]) {
        if !self.config.manages_albums() {
            return;
        }
        for album in self.album_targets(file).into_iter().chain(inherited.iter().cloned()) {
            debug!("{} goes to album {:?}", file.file_name, album);
            self.albums.add(&album, id).await;
        }
    }

    /// Uploads `file` and records it everywhere it must appear. Returns the
    /// new asset id, or `None` if nothing was uploaded.
    async fn upload(&self, file: &LocalAssetFile) -> Option<String> {
        if self.cancel.is_cancelled() {
            return None;
        }

        let mut file = file.clone();
        if self.config.force_sidecar {
            file.sidecar = Some(SideCar {
                file_name: format!("{}.xmp", file.file_name),
                date_taken: file.date_taken,
                latitude: file.latitude,
                longitude: file.longitude,
                elevation: file.altitude,
            });
        }

        let id = if self.config.dry_run {
            info!(file = %strip_path(&file.file_name), "Upload skipped, dry run mode");
            Uuid::new_v4().to_string()
        } else {
            let content = match self.source.read(&file).await {
                Ok(content) => content,
                Err(e) => {
                    error!("Can't read {}: {}", file.file_name, e);
                    self.failures.record(DeferredFailure::new(
                        FailureKind::Upload,
                        &file.file_name,
                        e.to_string(),
                    ));
                    return None;
                }
            };

            if self.cancel.is_cancelled() {
                return None;
            }

            match self.catalog.upload(&file, content).await {
                Ok(response) if response.duplicate => {
                    warn!(file = %strip_path(&file.file_name), "Already exists on the server");
                    return None;
                }
                Ok(response) => {
                    info!(file = %strip_path(&file.file_name), id = %response.id, "Uploaded");
                    response.id
                }
                Err(e) => {
                    error!("Upload of {:?} failed: {}", file.file_name, e);
                    self.failures.record(DeferredFailure::new(
                        FailureKind::Upload,
                        &file.file_name,
                        e.to_string(),
                    ));
                    return None;
                }
            }
        };

        self.index.add_local_asset(&file, &id);
        self.counters.record_uploaded();
        self.emit(UploadEvent::AssetUploaded {
            file_name: file.file_name.clone(),
            asset_id: id.clone(),
        });

        if self.config.create_stacks {
            self.stacks.add(&id, &file);
        }
        Some(id)
    }

    /// Groups this run's uploads and stacks each group under its cover.
    async fn flush_stacks(&self) -> usize {
        if !self.config.create_stacks {
            return 0;
        }

        let mut created = 0;
        for stack in self.stacks.build_stacks().await {
            if self.config.dry_run {
                info!("Stack {} would be created (dry run)", stack.names.join(", "));
                created += 1;
                continue;
            }

            let update = AssetUpdate::stack_under(stack.cover_id.clone());
            match self.catalog.update_assets(&stack.ids, &update).await {
                Ok(()) => {
                    info!("Stacked {}", stack.names.join(", "));
                    created += 1;
                }
                Err(e) => {
                    warn!("Can't stack {}: {}", stack.names.join(", "), e);
                    self.failures.record(DeferredFailure::new(
                        FailureKind::Stack,
                        stack.cover_id.as_str(),
                        e.to_string(),
                    ));
                }
            }
        }
        created
    }

    fn emit(&self, event: UploadEvent) {
        self.event_bus.emit(CoreEvent::Upload(event)).ok();
    }
}
