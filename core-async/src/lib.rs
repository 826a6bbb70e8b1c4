//! Async runtime facade for the media reconciliation core.
//!
//! Every other crate in the workspace goes through this crate instead of
//! depending on Tokio directly. Keeping the runtime behind one seam means the
//! reconciliation engine only names the primitives it actually relies on:
//! task spawning and join sets, async locks and channels, cancellation
//! tokens, timers and the `#[core_async::test]` entry point.
//!
//! # Modules
//!
//! - `task`: Task spawning, join sets and join errors
//! - `time`: Sleep, timeouts, durations and instants
//! - `sync`: Mutex, RwLock, Semaphore, channels and `CancellationToken`
//! - `runtime`: `block_on` for synchronous entry points
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let handle = task::spawn(async {
//!         sleep(Duration::from_millis(10)).await;
//!         42
//!     });
//!     assert_eq!(handle.await.unwrap(), 42);
//! }
//! ```

// Re-export the async entry-point/test macros so downstream crates never need
// direct Tokio dependencies.
pub use core_async_macros::{main, test};

pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

/// Waits on multiple concurrent branches, returning when the first completes.
pub use tokio::select;

pub use task::spawn;
pub use time::{sleep, Duration, Instant};
