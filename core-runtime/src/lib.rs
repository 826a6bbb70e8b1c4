//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the media reconciliation core:
//! - Logging and tracing infrastructure
//! - Run configuration
//! - Event bus system
//!
//! ## Overview
//!
//! Nothing in here knows how files are classified or uploaded. The engine in
//! `core-reconcile` takes an [`UploadConfig`](config::UploadConfig) and an
//! [`EventBus`](events::EventBus) from this crate and reports through
//! `tracing`, whose subscriber is installed by [`logging::init_logging`].

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{DateRange, SourceKind, UploadConfig, UploadConfigBuilder};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, EventStream, UploadEvent};
