//! # Reconciliation Engine
//!
//! Decides, for every file of a local media source, what the remote catalog
//! already holds, and applies the resulting uploads, stacks, album changes
//! and deletions.
//!
//! ## Overview
//!
//! - [`asset_index`] - In-memory view of the remote catalog
//! - [`advice`] - Pure classification of one local file against the index
//! - [`pipeline`] - Bounded worker pool with a single dispatcher
//! - [`stacking`] - Burst and RAW+JPEG grouping of this run's uploads
//! - [`albums`] - Deferred, batched album membership
//! - [`deletion`] - Deferred remote and local deletions
//! - [`coordinator`] - Runs all of the above in order
//!
//! Side effects that are only safe once the whole corpus has been seen
//! (stacks, albums, deletions) are accumulated by the workers and flushed
//! after the pool has drained.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_reconcile::UploadCoordinator;
//! use core_runtime::{EventBus, UploadConfig};
//!
//! let coordinator = UploadCoordinator::new(UploadConfig::default(), catalog, EventBus::default()).await?;
//! let report = coordinator.run(source, cancel).await?;
//! ```

pub mod advice;
pub mod albums;
pub mod asset_index;
pub mod coordinator;
pub mod deletion;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod report;
pub mod stacking;

pub use advice::{should_upload, Advice, AdviceCode};
pub use albums::{AlbumFlushStats, AlbumReconciler};
pub use asset_index::AssetIndex;
pub use coordinator::UploadCoordinator;
pub use deletion::{apply_deletions, DeletionSets, DeletionStats, DrainedDeletions};
pub use error::{ReconcileError, Result};
pub use pipeline::{PoolOutcome, WorkerPool};
pub use report::{DeferredFailure, FailureKind, RunId, UploadReport};
pub use stacking::{Stack, StackBuilder};
