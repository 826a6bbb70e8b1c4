//! # Desktop Bridge Implementations
//!
//! Desktop implementations of the bridge traits (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `AssetSource` over a local folder tree, using `tokio::fs`
//!
//! The remote catalog client lives with the host, which plugs its own
//! `RemoteCatalog` into the coordinator.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::FolderSource;
//! use std::sync::Arc;
//!
//! #[core_async::main]
//! async fn main() {
//!     let source = Arc::new(FolderSource::new("/home/me/Pictures"));
//!     let report = coordinator.run(source, CancellationToken::new()).await?;
//! }
//! ```

mod folder_source;

pub use folder_source::FolderSource;
