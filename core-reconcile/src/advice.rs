//! # Advice Engine
//!
//! Decides, for one local file, what the remote catalog already holds.
//!
//! ## Decision order
//!
//! 1. A remote asset uploaded with the same device-scoped id is
//!    [`AdviceCode::SameOnServer`], whatever its name, size or date.
//! 2. Otherwise every remote asset with the same normalized display name is
//!    compared in listing order. Capture times within five minutes of each
//!    other count as equal; the first candidate with an equal time decides:
//!    equal size is `SameOnServer`, a smaller remote copy is
//!    `SmallerOnServer`, a bigger one is `BetterOnServer`.
//! 3. Nothing matched: `NotOnServer`.
//!
//! The engine reads the index and never writes it, so the same index state
//! always yields the same advice.

use bridge_traits::{LocalAssetFile, RemoteAsset};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::asset_index::AssetIndex;

/// Capture times closer than this are considered the same moment.
pub const DATE_TOLERANCE_MINUTES: i64 = 5;

/// Disposition of a local file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdviceCode {
    /// Nothing comparable on the server: upload.
    NotOnServer,
    /// The server copy is smaller: upload and replace it.
    SmallerOnServer,
    /// The server copy is bigger: keep it.
    BetterOnServer,
    /// The server already has this file.
    SameOnServer,
}

impl AdviceCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdviceCode::NotOnServer => "NotOnServer",
            AdviceCode::SmallerOnServer => "SmallerOnServer",
            AdviceCode::BetterOnServer => "BetterOnServer",
            AdviceCode::SameOnServer => "SameOnServer",
        }
    }
}

impl fmt::Display for AdviceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification outcome for one local file.
#[derive(Debug, Clone, PartialEq)]
pub struct Advice {
    pub code: AdviceCode,
    /// The matching remote asset; `None` only for `NotOnServer`.
    pub server_asset: Option<Arc<RemoteAsset>>,
    pub message: String,
}

/// Classifies `file` against the remote index.
pub fn should_upload(index: &AssetIndex, file: &LocalAssetFile) -> Advice {
    let display_name = file.display_name();

    if let Some(remote) = index.find_by_device_id(&file.device_asset_id()) {
        return same_on_server(&display_name, file, remote);
    }

    for remote in index.find_by_name(&display_name) {
        if compare_dates(file.date_taken, remote.file_created_at) != Some(Ordering::Equal) {
            continue;
        }

        return match file.size.cmp(&remote.file_size) {
            Ordering::Equal => same_on_server(&display_name, file, remote),
            Ordering::Greater => Advice {
                code: AdviceCode::SmallerOnServer,
                message: format!(
                    "An asset with the same name:{:?} and date:{:?} but with smaller size:{} exists on the server. Replace it.",
                    display_name,
                    format_date(file.date_taken),
                    format_bytes(remote.file_size),
                ),
                server_asset: Some(remote),
            },
            Ordering::Less => Advice {
                code: AdviceCode::BetterOnServer,
                message: format!(
                    "An asset with the same name:{:?} and date:{:?} but with bigger size:{} exists on the server. No need to upload.",
                    display_name,
                    format_date(file.date_taken),
                    format_bytes(remote.file_size),
                ),
                server_asset: Some(remote),
            },
        };
    }

    Advice {
        code: AdviceCode::NotOnServer,
        server_asset: None,
        message: "This is a new asset, upload it.".to_string(),
    }
}

fn same_on_server(display_name: &str, file: &LocalAssetFile, remote: Arc<RemoteAsset>) -> Advice {
    Advice {
        code: AdviceCode::SameOnServer,
        message: format!(
            "An asset with the same name:{:?}, date:{:?} and size:{} exists on the server. No need to upload.",
            display_name,
            format_date(file.date_taken),
            format_bytes(remote.file_size),
        ),
        server_asset: Some(remote),
    }
}

/// Compares two capture times with a five minute tolerance.
///
/// `local - remote < -5min` is `Less`, `>= 5min` is `Greater`, anything in
/// between is `Equal`. Two unknown dates are `Equal`; one unknown date is
/// not comparable (`None`).
pub fn compare_dates(
    local: Option<DateTime<Utc>>,
    remote: Option<DateTime<Utc>>,
) -> Option<Ordering> {
    match (local, remote) {
        (Some(local), Some(remote)) => {
            let diff = local - remote;
            let tolerance = Duration::minutes(DATE_TOLERANCE_MINUTES);
            if diff < -tolerance {
                Some(Ordering::Less)
            } else if diff >= tolerance {
                Some(Ordering::Greater)
            } else {
                Some(Ordering::Equal)
            }
        }
        (None, None) => Some(Ordering::Equal),
        _ => None,
    }
}

fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Human-readable byte count, base 1024, one decimal above a kilobyte.
///
/// ```rust
/// use core_reconcile::advice::format_bytes;
///
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(2_000_000), "1.9 MB");
/// ```
pub fn format_bytes(size: u64) -> String {
    const SUFFIXES: [&str; 4] = ["B", "KB", "MB", "GB"];
    const BASE: f64 = 1024.0;

    let mut value = size as f64;
    if value < BASE {
        return format!("{} {}", size, SUFFIXES[0]);
    }

    let mut exp = 0;
    while value >= BASE && exp < SUFFIXES.len() - 1 {
        value /= BASE;
        exp += 1;
    }
    let rounded = (value * 10.0).round() / 10.0;
    format!("{:.1} {}", rounded, SUFFIXES[exp])
}
