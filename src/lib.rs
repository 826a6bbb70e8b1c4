//! Workspace facade crate.
//!
//! Re-exports the engine and its bridges so host applications can depend on
//! `mrc-workspace` alone. The `desktop` feature (default) adds the folder
//! tree source from `bridge-desktop`.

pub use bridge_traits;
pub use core_reconcile;
pub use core_runtime;

#[cfg(feature = "desktop")]
pub use bridge_desktop;

pub use core_reconcile::{UploadCoordinator, UploadReport};
pub use core_runtime::{EventBus, UploadConfig};
