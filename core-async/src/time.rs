//! Time-related abstractions.
//!
//! `Instant` is monotonic and suitable for measuring elapsed time; `sleep`
//! and `timeout` integrate with Tokio's timer wheel.

pub use tokio::time::{interval, sleep, sleep_until, timeout, Interval, Sleep, Timeout};

pub use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
