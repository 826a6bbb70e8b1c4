//! Folder tree source using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    source::{base_name, AssetSource, LocalAlbum, LocalAssetFile},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use core_async::sync::CancellationToken;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Media source backed by a local folder tree.
///
/// Every regular file under the root becomes one [`LocalAssetFile`]:
/// - `file_name`: path relative to the root, `/` separated
/// - `date_taken`: the file's modification time
/// - album hint: the parent folder, when the file is not at the root
///
/// Hidden entries (leading dot) are skipped. Files are not filtered by
/// extension here; the engine decides what it can handle.
#[derive(Debug, Clone)]
pub struct FolderSource {
    root: PathBuf,
}

impl FolderSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, file: &LocalAssetFile) -> PathBuf {
        file.file_name
            .split('/')
            .fold(self.root.clone(), |path, part| path.join(part))
    }
}

#[async_trait]
impl AssetSource for FolderSource {
    fn browse(&self, cancel: CancellationToken) -> BoxStream<'static, LocalAssetFile> {
        let walker = Walker::new(self.root.clone());
        stream::unfold(walker, |mut walker| async move {
            walker.next_file().await.map(|file| (file, walker))
        })
        .take_until(cancel.cancelled_owned())
        .boxed()
    }

    async fn read(&self, file: &LocalAssetFile) -> Result<Bytes> {
        let path = self.resolve(file);
        let data = fs::read(&path).await?;
        debug!(path = ?path, size = data.len(), "Read file");
        Ok(Bytes::from(data))
    }

    async fn remove(&self, file: &LocalAssetFile) -> Result<()> {
        let path = self.resolve(file);
        fs::remove_file(&path).await?;
        debug!(path = ?path, "Deleted file");
        Ok(())
    }
}

/// Depth-first, lazy directory walk.
struct Walker {
    root: PathBuf,
    pending: Vec<PathBuf>,
    current: Option<fs::ReadDir>,
}

impl Walker {
    fn new(root: PathBuf) -> Self {
        Self {
            pending: vec![root.clone()],
            root,
            current: None,
        }
    }

    async fn next_file(&mut self) -> Option<LocalAssetFile> {
        loop {
            if self.current.is_none() {
                let dir = self.pending.pop()?;
                match fs::read_dir(&dir).await {
                    Ok(entries) => self.current = Some(entries),
                    Err(e) => warn!(path = ?dir, "Can't read folder: {}", e),
                }
                continue;
            }

            let next = match self.current.as_mut() {
                Some(entries) => entries.next_entry().await,
                None => continue,
            };
            let entry = match next {
                Ok(Some(entry)) => entry,
                Ok(None) => {
                    self.current = None;
                    continue;
                }
                Err(e) => {
                    warn!("Folder listing interrupted: {}", e);
                    self.current = None;
                    continue;
                }
            };

            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }

            let path = entry.path();
            let file_type = match entry.file_type().await {
                Ok(file_type) => file_type,
                Err(e) => {
                    warn!(path = ?path, "Can't stat entry: {}", e);
                    continue;
                }
            };

            if file_type.is_dir() {
                self.pending.push(path);
            } else if file_type.is_file() {
                if let Some(file) = describe(&self.root, &path).await {
                    return Some(file);
                }
            }
        }
    }
}

/// Builds the descriptor for one regular file.
async fn describe(root: &Path, path: &Path) -> Option<LocalAssetFile> {
    let relative = relative_name(root, path)?;

    let mut file = match fs::metadata(path).await {
        Ok(metadata) => {
            let mut file = LocalAssetFile::new(relative, metadata.len());
            file.date_taken = metadata.modified().ok().map(DateTime::<Utc>::from);
            file
        }
        Err(e) => {
            // Keep the file so the engine reports the skip.
            let mut file = LocalAssetFile::new(relative, 0);
            file.error = Some(e.to_string());
            file
        }
    };

    let parent = file.parent_dir();
    if !parent.is_empty() {
        let album = LocalAlbum::new(parent, base_name(parent));
        file.albums.push(album);
    }
    Some(file)
}

/// `path` relative to `root`, with `/` separators. `None` for anything that
/// is not valid UTF-8 or not under `root`.
fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use uuid::Uuid;

    async fn scratch_tree() -> PathBuf {
        let root = env::temp_dir().join(format!("bridge-desktop-test-{}", Uuid::new_v4()));
        fs::create_dir_all(root.join("2023/Holidays")).await.unwrap();
        fs::write(root.join("top.jpg"), b"top").await.unwrap();
        fs::write(root.join("2023/Holidays/IMG_1.JPG"), b"holiday!").await.unwrap();
        fs::write(root.join(".hidden.jpg"), b"x").await.unwrap();
        root
    }

    #[tokio::test]
    async fn test_browse_lists_files_with_album_hints() {
        let root = scratch_tree().await;
        let source = FolderSource::new(&root);

        let mut files: Vec<LocalAssetFile> =
            source.browse(CancellationToken::new()).collect().await;
        files.sort_by(|a, b| a.file_name.cmp(&b.file_name));

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].file_name, "2023/Holidays/IMG_1.JPG");
        assert_eq!(files[0].size, 8);
        assert!(files[0].date_taken.is_some());
        assert_eq!(files[0].albums, vec![LocalAlbum::new("2023/Holidays", "Holidays")]);
        assert_eq!(files[1].file_name, "top.jpg");
        assert!(files[1].albums.is_empty());

        fs::remove_dir_all(&root).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_and_remove() {
        let root = scratch_tree().await;
        let source = FolderSource::new(&root);
        let file = LocalAssetFile::new("2023/Holidays/IMG_1.JPG", 8);

        assert_eq!(source.read(&file).await.unwrap(), Bytes::from_static(b"holiday!"));
        source.remove(&file).await.unwrap();
        assert!(source.read(&file).await.is_err());

        fs::remove_dir_all(&root).await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_browse_is_empty() {
        let root = scratch_tree().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let files: Vec<LocalAssetFile> = FolderSource::new(&root).browse(cancel).collect().await;
        assert!(files.is_empty());

        fs::remove_dir_all(&root).await.unwrap();
    }

    #[test]
    fn test_relative_name() {
        let root = Path::new("/media/photos");
        assert_eq!(
            relative_name(root, Path::new("/media/photos/a/b.jpg")).as_deref(),
            Some("a/b.jpg")
        );
        assert_eq!(relative_name(root, Path::new("/elsewhere/b.jpg")), None);
    }
}
