//! # Host Bridge Traits
//!
//! The seams between the reconciliation core and the outside world.
//!
//! ## Overview
//!
//! The core never talks to a media server or a disk directly. Instead it is
//! handed two collaborators:
//!
//! - [`RemoteCatalog`](catalog::RemoteCatalog) - lists, uploads, deletes and
//!   groups assets on the remote media server
//! - [`AssetSource`](source::AssetSource) - streams local media files out of a
//!   folder tree or an export archive, and deletes them on request
//!
//! plus two utilities:
//!
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to the host
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type.
//! Implementations should convert transport failures into it and keep the
//! remote message intact, since it ends up verbatim in the run report.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync`: the worker pool calls them from
//! many tasks at once.
//!
//! ## Example
//!
//! ```ignore
//! use bridge_traits::catalog::RemoteCatalog;
//!
//! async fn count_remote(catalog: &dyn RemoteCatalog) -> bridge_traits::Result<usize> {
//!     let mut total = 0;
//!     let mut cursor = None;
//!     loop {
//!         let page = catalog.list_assets(cursor).await?;
//!         total += page.assets.len();
//!         match page.next_cursor {
//!             Some(next) => cursor = Some(next),
//!             None => return Ok(total),
//!         }
//!     }
//! }
//! ```

pub mod catalog;
pub mod error;
pub mod source;
pub mod time;

pub use catalog::{
    AlbumAddResult, AssetPage, AssetUpdate, RemoteAlbum, RemoteAsset, RemoteCatalog,
    UploadResponse, DUPLICATE_MEMBERSHIP,
};
pub use error::{BridgeError, Result};
pub use source::{AssetSource, LocalAlbum, LocalAssetFile, SideCar};
pub use time::{Clock, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
