//! Library item model and the generation eligibility predicate.
//!
//! The host library owns items; this crate only reads the handful of
//! attributes that decide where an artifact goes and whether one should
//! exist at all.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{Fingerprint, ItemId, Timestamp};

/// Videos shorter than this never get trickplay data.
pub const MIN_RUNTIME: Duration = Duration::from_secs(30);

/// How the source video is packaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoType {
    File,
    Iso,
    Dvd,
    BluRay,
}

/// A video as seen by the trickplay subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: ItemId,
    pub name: String,
    /// Absolute path of the source file.
    pub path: PathBuf,
    /// Container name reported by the prober (e.g. `"matroska,webm"`).
    pub container: Option<String>,
    pub video_type: VideoType,
    pub is_shortcut: bool,
    pub is_virtual: bool,
    pub runtime: Option<Duration>,
    pub date_modified: Timestamp,
    /// Per-item directory for internally stored metadata.
    pub metadata_dir: PathBuf,
}

impl MediaItem {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::from_modified(self.date_modified)
    }

    /// Directory that contains the source file.
    pub fn containing_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }

    /// File name of the source without its extension.
    pub fn file_stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// Why an item was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Ineligible {
    #[error("disc image or disc folder")]
    DiscMedia,
    #[error("shortcut")]
    Shortcut,
    #[error("virtual item")]
    Virtual,
    #[error("runtime unknown or shorter than 30 seconds")]
    TooShort,
    #[error("source file is not present on disk")]
    MissingSource,
}

/// Decide whether `item` qualifies for artifact generation.
///
/// Shared by the scan hook, the serving layer and every bulk task.
pub async fn check_eligibility(item: &MediaItem) -> Result<(), Ineligible> {
    if matches!(
        item.video_type,
        VideoType::Iso | VideoType::Dvd | VideoType::BluRay
    ) {
        return Err(Ineligible::DiscMedia);
    }
    if item.is_shortcut {
        return Err(Ineligible::Shortcut);
    }
    if item.is_virtual {
        return Err(Ineligible::Virtual);
    }
    match item.runtime {
        Some(runtime) if runtime >= MIN_RUNTIME => {}
        _ => return Err(Ineligible::TooShort),
    }
    match tokio::fs::metadata(&item.path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(Ineligible::MissingSource),
    }
}
