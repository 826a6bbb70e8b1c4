//! # Event Bus System
//!
//! Typed progress events for reconciliation runs, published over a
//! `broadcast` channel.
//!
//! ## Overview
//!
//! The coordinator emits an event when a run starts, for every classified or
//! skipped file, at each flush phase, and when the run ends. Front ends
//! subscribe to drive progress bars; tests subscribe to assert on the advice
//! given to each file. Emission never fails a run: with no subscribers the
//! event is simply dropped.
//!
//! ```text
//! ┌─────────────┐     emit      ┌───────────┐     subscribe    ┌────────────┐
//! │ Coordinator ├──────────────>│ EventBus  ├─────────────────>│ Subscriber │
//! └─────────────┘               │ (broadcast│                  └────────────┘
//! ┌─────────────┐     emit      │  channel) │     subscribe    ┌────────────┐
//! │   Workers   ├──────────────>│           ├─────────────────>│ Subscriber │
//! └─────────────┘               └───────────┘                  └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, UploadEvent};
//!
//! let event_bus = EventBus::new(100);
//! let mut receiver = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Upload(UploadEvent::PhaseStarted {
//!         run_id: "run-1".to_string(),
//!         phase: "albums".to_string(),
//!     }))
//!     .ok();
//!
//! assert!(receiver.try_recv().is_ok());
//! ```

use core_async::sync::broadcast::{
    self,
    error::{RecvError, SendError},
    Receiver,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default buffer size for the event bus.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 1024;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Reconciliation/upload run events
    Upload(UploadEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Upload(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Upload(UploadEvent::Completed { failures, .. }) if *failures > 0 => {
                EventSeverity::Warning
            }
            CoreEvent::Upload(UploadEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Upload(UploadEvent::Cancelled { .. }) => EventSeverity::Warning,
            CoreEvent::Upload(UploadEvent::Started { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Upload Events
// ============================================================================

/// Events describing one reconciliation/upload run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum UploadEvent {
    /// The remote index is built and workers are about to start.
    Started {
        run_id: String,
        worker_count: usize,
        dry_run: bool,
        /// Assets known to the remote catalog.
        indexed_assets: usize,
    },
    /// A file was filtered out before classification.
    AssetSkipped { file_name: String, reason: String },
    /// A file received its disposition.
    AssetClassified {
        file_name: String,
        /// `NotOnServer`, `SmallerOnServer`, `BetterOnServer` or `SameOnServer`.
        advice: String,
        message: String,
    },
    /// A file was stored remotely under `asset_id`.
    AssetUploaded { file_name: String, asset_id: String },
    /// Periodic counters while workers run.
    Progress {
        run_id: String,
        files_scanned: u64,
        files_uploaded: u64,
    },
    /// A flush phase began (`stacks`, `albums`, `deletions`).
    PhaseStarted { run_id: String, phase: String },
    /// The run finished, possibly with deferred failures.
    Completed {
        run_id: String,
        files_scanned: u64,
        files_uploaded: u64,
        failures: usize,
        duration_secs: u64,
    },
    /// The run was cancelled before the flush phases.
    Cancelled { run_id: String, files_scanned: u64 },
}

impl UploadEvent {
    fn description(&self) -> &str {
        match self {
            UploadEvent::Started { .. } => "Upload started",
            UploadEvent::AssetSkipped { .. } => "Asset skipped",
            UploadEvent::AssetClassified { .. } => "Asset classified",
            UploadEvent::AssetUploaded { .. } => "Asset uploaded",
            UploadEvent::Progress { .. } => "Upload in progress",
            UploadEvent::PhaseStarted { .. } => "Flush phase started",
            UploadEvent::Completed { .. } => "Upload completed",
            UploadEvent::Cancelled { .. } => "Upload cancelled",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus over a `broadcast` channel.
///
/// Cloning is cheap; all clones publish to the same subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    ///   When a subscriber falls behind by more than this amount, it will
    ///   receive a `RecvError::Lagged` error.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are none. Callers on the hot path use `.ok()`.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional filter.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream, UploadEvent};
///
/// let event_bus = EventBus::new(100);
/// let uploads_only = EventStream::new(event_bus.subscribe()).filter(|event| {
///     matches!(event, CoreEvent::Upload(UploadEvent::AssetUploaded { .. }))
/// });
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` will be returned.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Drains every buffered event that passes the filter without waiting.
    ///
    /// Lagged gaps are skipped; the drain stops at the first empty or
    /// closed read.
    pub fn drain(&mut self) -> Vec<CoreEvent> {
        let mut events = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        events.push(event);
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return events,
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn classified(name: &str) -> CoreEvent {
        CoreEvent::Upload(UploadEvent::AssetClassified {
            file_name: name.to_string(),
            advice: "NotOnServer".to_string(),
            message: "This a new asset, upload it.".to_string(),
        })
    }

    #[test]
    fn test_emit_without_subscribers_is_error() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus.emit(classified("a.jpg")).is_err());
    }

    #[core_async::test]
    async fn test_event_delivery() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        assert_eq!(bus.emit(classified("a.jpg")).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), classified("a.jpg"));
        assert_eq!(sub2.recv().await.unwrap(), classified("a.jpg"));
    }

    #[core_async::test]
    async fn test_stream_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe()).filter(|event| {
            matches!(event, CoreEvent::Upload(UploadEvent::AssetUploaded { .. }))
        });

        bus.emit(classified("a.jpg")).ok();
        bus.emit(CoreEvent::Upload(UploadEvent::AssetUploaded {
            file_name: "a.jpg".to_string(),
            asset_id: "r1".to_string(),
        }))
        .ok();

        match stream.recv().await.unwrap() {
            CoreEvent::Upload(UploadEvent::AssetUploaded { asset_id, .. }) => {
                assert_eq!(asset_id, "r1")
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_drain_collects_buffered_events() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe());

        bus.emit(classified("a.jpg")).ok();
        bus.emit(classified("b.jpg")).ok();

        assert_eq!(stream.drain().len(), 2);
        assert!(stream.drain().is_empty());
    }

    #[test]
    fn test_severity() {
        let clean = CoreEvent::Upload(UploadEvent::Completed {
            run_id: "r".into(),
            files_scanned: 3,
            files_uploaded: 2,
            failures: 0,
            duration_secs: 1,
        });
        let with_failures = CoreEvent::Upload(UploadEvent::Completed {
            run_id: "r".into(),
            files_scanned: 3,
            files_uploaded: 2,
            failures: 1,
            duration_secs: 1,
        });

        assert_eq!(clean.severity(), EventSeverity::Info);
        assert_eq!(with_failures.severity(), EventSeverity::Warning);
        assert_eq!(classified("a").severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(classified("a.jpg")).unwrap();
        assert_eq!(json["type"], "Upload");
        assert_eq!(json["payload"]["event"], "AssetClassified");
        assert_eq!(json["payload"]["advice"], "NotOnServer");
    }
}
