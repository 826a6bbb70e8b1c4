//! # Run Report
//!
//! Run identifiers, live counters shared by the workers, and the report a
//! finished run hands back.
//!
//! Failures are never fatal to a run. Each one becomes a [`DeferredFailure`]
//! that names what failed (a file, an album, a stack cover, or the batched
//! remote deletion) so the caller can decide what to retry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// Type-safe run identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which step a deferred failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Reading or uploading one file
    Upload,
    /// Grouping uploaded assets into a stack
    Stack,
    /// Listing, creating or appending to an album
    Album,
    /// The batched remote deletion
    RemoteDeletion,
    /// Removing one local file
    LocalDeletion,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Upload => "upload",
            FailureKind::Stack => "stack",
            FailureKind::Album => "album",
            FailureKind::RemoteDeletion => "remote_deletion",
            FailureKind::LocalDeletion => "local_deletion",
        }
    }
}

/// A failure collected during the run instead of aborting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredFailure {
    pub kind: FailureKind,
    /// File name, album name, stack cover id or `"remote"`.
    pub subject: String,
    pub message: String,
}

impl DeferredFailure {
    pub fn new(kind: FailureKind, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for DeferredFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.kind.as_str(), self.subject, self.message)
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadReport {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub files_scanned: u64,
    pub files_uploaded: u64,
    pub stacks_created: usize,
    pub albums_created: usize,
    pub albums_updated: usize,
    pub remote_deleted: usize,
    pub local_deleted: usize,
    pub failures: Vec<DeferredFailure>,
}

impl UploadReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures_of(&self, kind: FailureKind) -> impl Iterator<Item = &DeferredFailure> {
        self.failures.iter().filter(move |f| f.kind == kind)
    }

    pub fn duration_secs(&self) -> u64 {
        (self.finished_at - self.started_at).num_seconds().max(0) as u64
    }
}

/// Scanned/uploaded counters updated by every worker.
#[derive(Debug, Default)]
pub struct RunCounters {
    scanned: AtomicU64,
    uploaded: AtomicU64,
}

impl RunCounters {
    /// Counts one more scanned file and returns the new total.
    pub fn record_scanned(&self) -> u64 {
        self.scanned.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_uploaded(&self) {
        self.uploaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn scanned(&self) -> u64 {
        self.scanned.load(Ordering::Relaxed)
    }

    pub fn uploaded(&self) -> u64 {
        self.uploaded.load(Ordering::Relaxed)
    }
}

/// Append-only failure list shared by workers and flush phases.
#[derive(Debug, Default)]
pub struct FailureLog {
    failures: Mutex<Vec<DeferredFailure>>,
}

impl FailureLog {
    pub fn record(&self, failure: DeferredFailure) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(failure);
    }

    pub fn extend(&self, failures: impl IntoIterator<Item = DeferredFailure>) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(failures);
    }

    pub fn take(&self) -> Vec<DeferredFailure> {
        std::mem::take(&mut *self.failures.lock().unwrap_or_else(PoisonError::into_inner))
    }
}
