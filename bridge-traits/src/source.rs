//! Local Asset Sources
//!
//! A source turns a folder tree or an export archive into a lazy stream of
//! [`LocalAssetFile`] descriptors. The reconciliation engine pulls from the
//! stream through a single dispatcher, so implementations never see
//! concurrent calls to [`AssetSource::browse`]; `read`, `remove` and
//! `release` are called concurrently from workers.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use core_async::sync::CancellationToken;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Album membership hint carried by a local file.
///
/// `path` is where the album lives in the source (a folder, or an archive
/// directory); `name` is the human title, which may be empty for untitled
/// albums.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalAlbum {
    pub path: String,
    pub name: String,
}

impl LocalAlbum {
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
        }
    }
}

/// Metadata sidecar to upload next to the media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideCar {
    pub file_name: String,
    pub date_taken: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub elevation: Option<f64>,
}

/// One media file discovered by a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalAssetFile {
    /// Source-relative path, `/` separated.
    pub file_name: String,
    /// Display name; may lack the extension (takeout titles often do).
    pub title: String,
    pub date_taken: Option<DateTime<Utc>>,
    pub size: u64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub albums: Vec<LocalAlbum>,
    pub from_partner: bool,
    pub trashed: bool,
    /// Metadata extraction failure, if the source could not fully read the file.
    pub error: Option<String>,
    pub sidecar: Option<SideCar>,
}

impl LocalAssetFile {
    /// Creates a descriptor whose title is the base name of `file_name`.
    pub fn new(file_name: impl Into<String>, size: u64) -> Self {
        let file_name = file_name.into();
        let title = base_name(&file_name).to_string();
        Self {
            file_name,
            title,
            date_taken: None,
            size,
            latitude: None,
            longitude: None,
            altitude: None,
            albums: Vec::new(),
            from_partner: false,
            trashed: false,
            error: None,
            sidecar: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_date_taken(mut self, date: DateTime<Utc>) -> Self {
        self.date_taken = Some(date);
        self
    }

    pub fn with_album(mut self, album: LocalAlbum) -> Self {
        self.albums.push(album);
        self
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64, altitude: Option<f64>) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self.altitude = altitude;
        self
    }

    pub fn from_partner(mut self) -> Self {
        self.from_partner = true;
        self
    }

    pub fn trashed(mut self) -> Self {
        self.trashed = true;
        self
    }

    /// Name the file is known by remotely: the title, completed with the
    /// extension of `file_name` when the title has none.
    pub fn display_name(&self) -> String {
        let title = base_name(&self.title);
        if extension(title).is_some() {
            return title.to_string();
        }
        match extension(&self.file_name) {
            Some(ext) => format!("{title}.{ext}"),
            None => title.to_string(),
        }
    }

    /// Lower-cased extension of the underlying file, without the dot.
    pub fn extension(&self) -> Option<String> {
        extension(&self.file_name).map(|ext| ext.to_ascii_lowercase())
    }

    /// Parent directory of `file_name` (empty at the source root).
    pub fn parent_dir(&self) -> &str {
        match self.file_name.rfind('/') {
            Some(idx) => &self.file_name[..idx],
            None => "",
        }
    }

    /// Deterministic device-scoped identifier: normalized name, size and
    /// capture time (seconds since the epoch, `0` when unknown).
    pub fn device_asset_id(&self) -> String {
        let ts = self.date_taken.map(|d| d.timestamp()).unwrap_or(0);
        format!("{}-{}-{}", normalize_name(&self.display_name()), self.size, ts)
    }
}

/// Final path component of a `/` separated name.
pub fn base_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Extension of the final path component, if any. Leading-dot names such as
/// `.hidden` have no extension.
pub fn extension(name: &str) -> Option<&str> {
    let base = base_name(name);
    match base.rfind('.') {
        Some(0) | None => None,
        Some(idx) if idx + 1 < base.len() => Some(&base[idx + 1..]),
        Some(_) => None,
    }
}

/// Lookup key for display names: base name with a lower-cased extension.
///
/// `IMG_0001.JPG`, `dir/IMG_0001.jpg` and `IMG_0001.Jpg` all normalize to
/// `IMG_0001.jpg`; the stem keeps its case.
pub fn normalize_name(name: &str) -> String {
    let base = base_name(name);
    match extension(base) {
        Some(ext) => {
            let stem = &base[..base.len() - ext.len() - 1];
            format!("{stem}.{}", ext.to_ascii_lowercase())
        }
        None => base.to_string(),
    }
}

/// Produces local media files for reconciliation.
#[async_trait::async_trait]
pub trait AssetSource: Send + Sync {
    /// Lazily enumerate every media file. The stream ends early once `cancel`
    /// fires.
    fn browse(&self, cancel: CancellationToken) -> BoxStream<'static, LocalAssetFile>;

    /// Read the file's content for upload.
    async fn read(&self, file: &LocalAssetFile) -> Result<Bytes>;

    /// Delete the file from the source.
    async fn remove(&self, file: &LocalAssetFile) -> Result<()>;

    /// Called once a worker is done with a descriptor, whatever the outcome.
    fn release(&self, _file: &LocalAssetFile) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_display_name_completes_missing_extension() {
        let file = LocalAssetFile::new("Takeout/Photos/IMG_0001.JPG", 10).with_title("IMG_0001");
        assert_eq!(file.display_name(), "IMG_0001.JPG");

        let titled = LocalAssetFile::new("a/b.heic", 10).with_title("holiday.heic");
        assert_eq!(titled.display_name(), "holiday.heic");
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("IMG_0001.JPG"), "IMG_0001.jpg");
        assert_eq!(normalize_name("dir/sub/IMG_0001.Jpg"), "IMG_0001.jpg");
        assert_eq!(normalize_name("README"), "README");
        assert_eq!(normalize_name(".hidden"), ".hidden");
    }

    #[test]
    fn test_extension_and_parent() {
        let file = LocalAssetFile::new("2023/trip/DSC_1.NEF", 1);
        assert_eq!(file.extension().as_deref(), Some("nef"));
        assert_eq!(file.parent_dir(), "2023/trip");
        assert_eq!(LocalAssetFile::new("root.jpg", 1).parent_dir(), "");
        assert_eq!(extension("trailing."), None);
    }

    #[test]
    fn test_device_asset_id_is_deterministic() {
        let date = Utc.with_ymd_and_hms(2023, 7, 1, 10, 0, 0).unwrap();
        let a = LocalAssetFile::new("x/IMG_0001.JPG", 2_000_000).with_date_taken(date);
        let b = LocalAssetFile::new("y/IMG_0001.jpg", 2_000_000).with_date_taken(date);

        assert_eq!(a.device_asset_id(), b.device_asset_id());
        assert_eq!(
            a.device_asset_id(),
            format!("IMG_0001.jpg-2000000-{}", date.timestamp())
        );
        assert_eq!(
            LocalAssetFile::new("IMG_0001.JPG", 5).device_asset_id(),
            "IMG_0001.jpg-5-0"
        );
    }
}
