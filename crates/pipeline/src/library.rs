//! Media library interface.
//!
//! The trickplay subsystem never owns the catalogue; it asks a
//! [`MediaLibrary`] for items. [`InMemoryLibrary`] is handy for embedding
//! and tests, [`DirectoryLibrary`] walks a media root on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use trickplay_core::ffmpeg::{self, FfmpegError};
use trickplay_core::media::{MediaItem, VideoType};
use trickplay_core::types::ItemId;

/// File extensions treated as videos by [`DirectoryLibrary`].
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "3gp", "avi", "flv", "iso", "m2ts", "m4v", "mkv", "mov", "mp4", "mpeg", "mpg", "mts", "ogv",
    "strm", "ts", "vob", "webm", "wmv",
];

#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("probe failed: {0}")]
    Probe(#[from] FfmpegError),
}

#[async_trait]
pub trait MediaLibrary: Send + Sync {
    async fn get_item(&self, id: ItemId) -> Result<Option<MediaItem>, LibraryError>;

    /// Every video the library knows about, eligible or not.
    async fn list_videos(&self) -> Result<Vec<MediaItem>, LibraryError>;
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryLibrary {
    items: RwLock<HashMap<ItemId, MediaItem>>,
}

impl InMemoryLibrary {
    pub fn new(items: impl IntoIterator<Item = MediaItem>) -> Self {
        Self {
            items: RwLock::new(items.into_iter().map(|i| (i.id, i)).collect()),
        }
    }

    pub async fn insert(&self, item: MediaItem) {
        self.items.write().await.insert(item.id, item);
    }

    pub async fn remove(&self, id: ItemId) -> Option<MediaItem> {
        self.items.write().await.remove(&id)
    }
}

#[async_trait]
impl MediaLibrary for InMemoryLibrary {
    async fn get_item(&self, id: ItemId) -> Result<Option<MediaItem>, LibraryError> {
        Ok(self.items.read().await.get(&id).cloned())
    }

    async fn list_videos(&self) -> Result<Vec<MediaItem>, LibraryError> {
        let mut items: Vec<_> = self.items.read().await.values().cloned().collect();
        items.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(items)
    }
}

// ---------------------------------------------------------------------------
// Directory walk
// ---------------------------------------------------------------------------

/// Library backed by a directory tree.
///
/// Ids are derived from the file path, so they survive restarts. Probe
/// results are cached per path and reused until the file's modification
/// time changes.
pub struct DirectoryLibrary {
    root: PathBuf,
    metadata_root: PathBuf,
    ffprobe: PathBuf,
    cache: RwLock<HashMap<ItemId, MediaItem>>,
}

impl DirectoryLibrary {
    pub fn new(root: impl Into<PathBuf>, metadata_root: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            metadata_root: metadata_root.into(),
            ffprobe: ffprobe.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Build (or reuse) the item for one video file.
    async fn describe(&self, path: &Path) -> Result<MediaItem, LibraryError> {
        let id = ItemId::from_path(path);
        let meta = tokio::fs::metadata(path).await?;
        let date_modified: DateTime<Utc> = meta.modified()?.into();

        if let Some(cached) = self.cache.read().await.get(&id) {
            if cached.date_modified == date_modified {
                return Ok(cached.clone());
            }
        }

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        let is_shortcut = extension == "strm";
        let video_type = match extension.as_str() {
            "iso" => VideoType::Iso,
            "vob" if is_dvd_folder(path) => VideoType::Dvd,
            "m2ts" if is_bluray_folder(path) => VideoType::BluRay,
            _ => VideoType::File,
        };

        let (runtime, container) = if video_type == VideoType::File && !is_shortcut {
            match ffmpeg::probe_video(&self.ffprobe, path).await {
                Ok(probe) => (ffmpeg::parse_duration(&probe), probe.format.format_name),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Probe failed");
                    (None, None)
                }
            }
        } else {
            (None, None)
        };

        let item = MediaItem {
            id,
            name: path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: path.to_path_buf(),
            container,
            video_type,
            is_shortcut,
            is_virtual: false,
            runtime,
            date_modified,
            metadata_dir: self.metadata_root.join(id.to_string()),
        };
        self.cache.write().await.insert(id, item.clone());
        Ok(item)
    }

    async fn walk(&self) -> Result<Vec<PathBuf>, LibraryError> {
        let mut found = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let path = entry.path();
                if file_type.is_dir() {
                    // Internal caches and anything else marked as ignorable.
                    if !tokio::fs::try_exists(path.join(".ignore")).await.unwrap_or(false) {
                        pending.push(path);
                    }
                } else if file_type.is_file() && is_video_path(&path) {
                    found.push(path);
                }
            }
        }
        found.sort();
        Ok(found)
    }
}

#[async_trait]
impl MediaLibrary for DirectoryLibrary {
    async fn get_item(&self, id: ItemId) -> Result<Option<MediaItem>, LibraryError> {
        let known = self.cache.read().await.get(&id).map(|i| i.path.clone());
        if let Some(path) = known {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Ok(Some(self.describe(&path).await?));
            }
            self.cache.write().await.remove(&id);
            return Ok(None);
        }
        // Unknown id: rescan in case the file was added since the last walk.
        Ok(self.list_videos().await?.into_iter().find(|i| i.id == id))
    }

    async fn list_videos(&self) -> Result<Vec<MediaItem>, LibraryError> {
        let paths = self.walk().await?;
        let mut items = Vec::with_capacity(paths.len());
        for path in paths {
            match self.describe(&path).await {
                Ok(item) => items.push(item),
                // Vanished between the walk and the stat.
                Err(LibraryError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(items)
    }
}

pub fn is_video_path(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|e| VIDEO_EXTENSIONS.contains(&e.as_str()))
}

fn parent_named(path: &Path, name: &str) -> bool {
    path.parent()
        .and_then(Path::file_name)
        .is_some_and(|n| n.to_string_lossy().eq_ignore_ascii_case(name))
}

fn is_dvd_folder(path: &Path) -> bool {
    parent_named(path, "VIDEO_TS")
}

fn is_bluray_folder(path: &Path) -> bool {
    parent_named(path, "STREAM")
}

/// Convenience for wiring: a shared library handle.
pub type SharedLibrary = Arc<dyn MediaLibrary>;
