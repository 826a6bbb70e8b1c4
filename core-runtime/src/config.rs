//! # Upload Configuration Module
//!
//! Run options for a reconciliation/upload run.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct an
//! [`UploadConfig`]. `build()` validates eagerly, so contradictory options
//! (for instance selecting and excluding extensions at the same time) are
//! reported before any catalog call is made.
//!
//! Two source kinds are supported. A `Folder` run treats every file as a
//! standalone upload and can derive album names from parent folders. A
//! `GooglePhotos` run carries album hints from the export metadata, knows
//! about partner-shared and trashed items, and never deletes local files.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{DateRange, UploadConfig};
//!
//! let config = UploadConfig::builder()
//!     .google_photos(true)
//!     .partner_album("Shared with Sam")
//!     .date_range("2019-06".parse::<DateRange>()?)
//!     .worker_count(4)
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::UploadConfig;
//!
//! let config = UploadConfig::builder()
//!     .worker_count(0)
//!     .build()
//!     .expect("Should fail - a run needs at least one worker");
//! ```

use crate::error::{Error, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Default window inside which consecutive shots form a burst.
pub const DEFAULT_BURST_WINDOW_MS: i64 = 1_000;

/// Where local files come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceKind {
    /// A plain folder tree.
    #[default]
    Folder,
    /// A Google Photos takeout export.
    GooglePhotos,
}

/// Half-open capture-date interval `[after, before)`.
///
/// Parsed from `YYYY`, `YYYY-MM`, `YYYY-MM-DD`, or two of those separated by
/// a comma; the end of a two-part range is inclusive of its whole period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub after: DateTime<Utc>,
    pub before: DateTime<Utc>,
}

impl DateRange {
    pub fn contains(&self, date: DateTime<Utc>) -> bool {
        date >= self.after && date < self.before
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last_day = self.before - Duration::days(1);
        write!(
            f,
            "{},{}",
            self.after.format("%Y-%m-%d"),
            last_day.format("%Y-%m-%d")
        )
    }
}

impl FromStr for DateRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some((start, end)) = s.split_once(',') {
            let (after, _) = parse_period(start.trim())?;
            let (_, before) = parse_period(end.trim())?;
            if before <= after {
                return Err(Error::Config(format!(
                    "Date range '{}' ends before it starts",
                    s
                )));
            }
            return Ok(Self { after, before });
        }
        let (after, before) = parse_period(s)?;
        Ok(Self { after, before })
    }
}

/// Parses a single `YYYY`, `YYYY-MM` or `YYYY-MM-DD` period into its bounds.
fn parse_period(s: &str) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let invalid = || Error::Config(format!("Invalid date '{}', expected YYYY[-MM[-DD]]", s));
    let parts: Vec<&str> = s.split('-').collect();
    let numbers = parts
        .iter()
        .map(|p| p.parse::<u32>().map_err(|_| invalid()))
        .collect::<Result<Vec<u32>>>()?;

    let (start, end) = match numbers.as_slice() {
        [year] => {
            let year = *year as i32;
            (
                NaiveDate::from_ymd_opt(year, 1, 1),
                NaiveDate::from_ymd_opt(year + 1, 1, 1),
            )
        }
        [year, month] => {
            let start = NaiveDate::from_ymd_opt(*year as i32, *month, 1);
            let end = start.and_then(|d| {
                if d.month() == 12 {
                    NaiveDate::from_ymd_opt(d.year() + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(d.year(), d.month() + 1, 1)
                }
            });
            (start, end)
        }
        [year, month, day] => {
            let start = NaiveDate::from_ymd_opt(*year as i32, *month, *day);
            (start, start.and_then(|d| d.succ_opt()))
        }
        _ => return Err(invalid()),
    };

    match (start, end) {
        (Some(start), Some(end)) => Ok((midnight_utc(start)?, midnight_utc(end)?)),
        _ => Err(invalid()),
    }
}

fn midnight_utc(date: NaiveDate) -> Result<DateTime<Utc>> {
    let naive = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| Error::Config(format!("Invalid date {}", date)))?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// Options for one reconciliation/upload run.
///
/// Use [`UploadConfig::builder`] to construct instances.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadConfig {
    pub source_kind: SourceKind,

    /// Classify and log without mutating the catalog or deleting local files
    pub dry_run: bool,

    /// Delete local files once their content is known to be on the server
    pub delete_local: bool,

    /// Put every uploaded or matched asset into this album
    pub import_into_album: Option<String>,

    /// Mirror the takeout's album hints remotely (Google Photos mode)
    pub create_albums: bool,

    /// In folder mode, name an album after each file's parent folder
    pub create_album_after_folder: bool,

    /// Use the album path instead of its title (Google Photos)
    pub use_folder_as_album_name: bool,

    /// Keep albums whose title is empty, named after their path
    pub keep_untitled_albums: bool,

    /// Only process files that belong to this album
    pub from_album: Option<String>,

    /// Album collecting everything shared by a partner
    pub partner_album: Option<String>,

    /// Process files shared by a partner
    pub keep_partner: bool,

    /// Process files the source marks as trashed
    pub keep_trashed: bool,

    /// Only process files captured inside this range
    pub date_range: Option<DateRange>,

    /// Attach a metadata sidecar to every upload
    pub force_sidecar: bool,

    /// Group bursts and RAW+JPEG pairs into stacks after the run
    pub create_stacks: bool,

    /// Window for burst detection, in milliseconds
    pub burst_window_ms: i64,

    /// Number of concurrent workers
    pub worker_count: usize,

    /// When non-empty, only these extensions (lower case, no dot) are processed
    pub select_extensions: BTreeSet<String>,

    /// Extensions (lower case, no dot) that are never processed
    pub exclude_extensions: BTreeSet<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            source_kind: SourceKind::Folder,
            dry_run: false,
            delete_local: false,
            import_into_album: None,
            create_albums: true,
            create_album_after_folder: false,
            use_folder_as_album_name: false,
            keep_untitled_albums: false,
            from_album: None,
            partner_album: None,
            keep_partner: true,
            keep_trashed: false,
            date_range: None,
            force_sidecar: false,
            create_stacks: true,
            burst_window_ms: DEFAULT_BURST_WINDOW_MS,
            worker_count: core_async::runtime::available_parallelism(),
            select_extensions: BTreeSet::new(),
            exclude_extensions: BTreeSet::new(),
        }
    }
}

impl UploadConfig {
    pub fn builder() -> UploadConfigBuilder {
        UploadConfigBuilder::default()
    }

    pub fn is_google_photos(&self) -> bool {
        self.source_kind == SourceKind::GooglePhotos
    }

    /// True when any option asks for remote album membership.
    pub fn manages_albums(&self) -> bool {
        self.create_albums
            || self.create_album_after_folder
            || self.import_into_album.is_some()
            || self.partner_album.is_some()
    }

    /// Applies the select/exclude extension lists. `ext` is lower case.
    pub fn accepts_extension(&self, ext: &str) -> bool {
        if !self.select_extensions.is_empty() {
            return self.select_extensions.contains(ext);
        }
        !self.exclude_extensions.contains(ext)
    }

    /// Validates option combinations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending option.
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(Error::Config(
                "Worker count must be at least 1".to_string(),
            ));
        }

        if !self.select_extensions.is_empty() && !self.exclude_extensions.is_empty() {
            return Err(Error::Config(
                "Extensions cannot be selected and excluded at the same time".to_string(),
            ));
        }

        if self.burst_window_ms < 0 {
            return Err(Error::Config(
                "Burst window cannot be negative".to_string(),
            ));
        }

        if self.partner_album.is_some() && !self.keep_partner {
            return Err(Error::Config(
                "A partner album requires partner files to be kept".to_string(),
            ));
        }

        if self.delete_local && self.is_google_photos() {
            return Err(Error::Config(
                "Local deletion is not available for Google Photos exports".to_string(),
            ));
        }

        for name in [&self.import_into_album, &self.partner_album, &self.from_album]
            .into_iter()
            .flatten()
        {
            if name.trim().is_empty() {
                return Err(Error::Config("Album names cannot be blank".to_string()));
            }
        }

        Ok(())
    }
}

/// Builder for [`UploadConfig`].
#[derive(Debug, Default)]
pub struct UploadConfigBuilder {
    config: UploadConfig,
}

impl UploadConfigBuilder {
    /// Switches between a plain folder tree and a Google Photos export.
    ///
    /// Local deletion is always disabled for exports.
    pub fn google_photos(mut self, enabled: bool) -> Self {
        self.config.source_kind = if enabled {
            SourceKind::GooglePhotos
        } else {
            SourceKind::Folder
        };
        self
    }

    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.config.dry_run = enabled;
        self
    }

    pub fn delete_local(mut self, enabled: bool) -> Self {
        self.config.delete_local = enabled;
        self
    }

    pub fn import_into_album(mut self, album: impl Into<String>) -> Self {
        self.config.import_into_album = Some(album.into());
        self
    }

    pub fn create_albums(mut self, enabled: bool) -> Self {
        self.config.create_albums = enabled;
        self
    }

    pub fn create_album_after_folder(mut self, enabled: bool) -> Self {
        self.config.create_album_after_folder = enabled;
        self
    }

    pub fn use_folder_as_album_name(mut self, enabled: bool) -> Self {
        self.config.use_folder_as_album_name = enabled;
        self
    }

    pub fn keep_untitled_albums(mut self, enabled: bool) -> Self {
        self.config.keep_untitled_albums = enabled;
        self
    }

    pub fn from_album(mut self, album: impl Into<String>) -> Self {
        self.config.from_album = Some(album.into());
        self
    }

    pub fn partner_album(mut self, album: impl Into<String>) -> Self {
        self.config.partner_album = Some(album.into());
        self
    }

    pub fn keep_partner(mut self, enabled: bool) -> Self {
        self.config.keep_partner = enabled;
        self
    }

    pub fn keep_trashed(mut self, enabled: bool) -> Self {
        self.config.keep_trashed = enabled;
        self
    }

    pub fn date_range(mut self, range: DateRange) -> Self {
        self.config.date_range = Some(range);
        self
    }

    pub fn force_sidecar(mut self, enabled: bool) -> Self {
        self.config.force_sidecar = enabled;
        self
    }

    pub fn create_stacks(mut self, enabled: bool) -> Self {
        self.config.create_stacks = enabled;
        self
    }

    pub fn burst_window_ms(mut self, window_ms: i64) -> Self {
        self.config.burst_window_ms = window_ms;
        self
    }

    pub fn worker_count(mut self, count: usize) -> Self {
        self.config.worker_count = count;
        self
    }

    /// Restricts processing to these extensions (case-insensitive, leading
    /// dot optional).
    pub fn select_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.select_extensions = normalize_extensions(extensions);
        self
    }

    /// Excludes these extensions (case-insensitive, leading dot optional).
    pub fn exclude_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.exclude_extensions = normalize_extensions(extensions);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when options contradict each other. See
    /// [`UploadConfig::validate`].
    pub fn build(self) -> Result<UploadConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

fn normalize_extensions<I, S>(extensions: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    extensions
        .into_iter()
        .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}
