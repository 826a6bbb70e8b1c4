//! Media type detection by file extension.

/// Broad class of a media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Processed image (JPEG, HEIC, PNG, ...)
    Image,
    /// Camera raw image
    Raw,
    Video,
}

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "jpe", "png", "heic", "heif", "gif", "webp", "bmp", "tif", "tiff", "avif",
    "jxl", "psd", "svg",
];

const RAW_EXTENSIONS: &[&str] = &[
    "3fr", "ari", "arw", "cap", "cin", "cr2", "cr3", "crw", "dcr", "dng", "erf", "fff", "iiq",
    "k25", "kdc", "mrw", "nef", "nrw", "orf", "ori", "pef", "raf", "raw", "rw2", "rwl", "sr2",
    "srf", "srw", "x3f",
];

const VIDEO_EXTENSIONS: &[&str] = &[
    "3gp", "avi", "flv", "insv", "m2ts", "m4v", "mkv", "mov", "mp4", "mpe", "mpeg", "mpg", "mts",
    "webm", "wmv",
];

/// Classifies a lower-case extension (no dot). `None` for anything that is
/// not a supported media type.
pub fn media_kind(ext: &str) -> Option<MediaKind> {
    if IMAGE_EXTENSIONS.contains(&ext) {
        Some(MediaKind::Image)
    } else if RAW_EXTENSIONS.contains(&ext) {
        Some(MediaKind::Raw)
    } else if VIDEO_EXTENSIONS.contains(&ext) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

pub fn is_jpeg(ext: &str) -> bool {
    matches!(ext, "jpg" | "jpeg" | "jpe")
}
