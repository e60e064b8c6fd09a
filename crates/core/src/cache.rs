//! Artifact cache resolver.
//!
//! Maps (item, width) to at most one BIF on disk and (item) to at most one
//! manifest. Two layouts exist:
//!
//! ```text
//! co-located   <media dir>/<stem>-<width>.bif
//!              <media dir>/<stem>-manifest.json
//!
//! internal     <metadata dir>/trickplay/<fingerprint>/<width>.bif
//!              <metadata dir>/trickplay/<fingerprint>/manifest.json
//!              <metadata dir>/trickplay/<fingerprint>/.ignore
//! ```
//!
//! The configured policy decides where new artifacts are written. Reads
//! try the configured policy first and then the other one, so switching
//! the setting does not hide what was generated before.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::media::MediaItem;
use crate::types::{Fingerprint, ItemId, Width};

/// Directory name under an item's metadata directory.
pub const INTERNAL_DIR_NAME: &str = "trickplay";

/// Manifest file name inside the internal layout.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Marker telling directory scanners to skip the internal cache folder.
pub const IGNORE_MARKER: &str = ".ignore";

const BIF_EXTENSION: &str = "bif";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoragePolicy {
    /// Next to the source media file.
    CoLocated,
    /// Under the item's metadata directory.
    Internal,
}

impl StoragePolicy {
    pub fn from_save_with_media(save_with_media: bool) -> Self {
        if save_with_media {
            Self::CoLocated
        } else {
            Self::Internal
        }
    }

    pub fn other(self) -> Self {
        match self {
            Self::CoLocated => Self::Internal,
            Self::Internal => Self::CoLocated,
        }
    }
}

/// Identity of one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub item_id: ItemId,
    pub width: Width,
    pub fingerprint: Fingerprint,
}

impl CacheKey {
    pub fn for_item(item: &MediaItem, width: Width) -> Self {
        Self {
            item_id: item.id,
            width,
            fingerprint: item.fingerprint(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.item_id, self.width, self.fingerprint)
    }
}

/// Resolves cache locations for the configured storage policy.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactResolver {
    policy: StoragePolicy,
}

impl ArtifactResolver {
    pub fn new(policy: StoragePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> StoragePolicy {
        self.policy
    }

    // -- path derivation ----------------------------------------------------

    /// Root of everything the internal layout stores for `item`, across
    /// all fingerprints.
    pub fn internal_root(item: &MediaItem) -> PathBuf {
        item.metadata_dir.join(INTERNAL_DIR_NAME)
    }

    /// Directory holding artifacts for `item` under `policy`.
    pub fn artifact_dir(policy: StoragePolicy, item: &MediaItem) -> PathBuf {
        match policy {
            StoragePolicy::CoLocated => item.containing_dir().to_path_buf(),
            StoragePolicy::Internal => {
                Self::internal_root(item).join(item.fingerprint().as_str())
            }
        }
    }

    pub fn artifact_path(policy: StoragePolicy, item: &MediaItem, width: Width) -> PathBuf {
        match policy {
            StoragePolicy::CoLocated => item
                .containing_dir()
                .join(format!("{}-{width}.{BIF_EXTENSION}", item.file_stem())),
            StoragePolicy::Internal => {
                Self::artifact_dir(policy, item).join(format!("{width}.{BIF_EXTENSION}"))
            }
        }
    }

    pub fn manifest_path(policy: StoragePolicy, item: &MediaItem) -> PathBuf {
        match policy {
            StoragePolicy::CoLocated => item
                .containing_dir()
                .join(format!("{}-manifest.json", item.file_stem())),
            StoragePolicy::Internal => Self::artifact_dir(policy, item).join(MANIFEST_FILE_NAME),
        }
    }

    /// Marker file to drop next to internally stored artifacts.
    ///
    /// Co-located artifacts share a folder with media, so they get none.
    pub fn marker_path(policy: StoragePolicy, item: &MediaItem) -> Option<PathBuf> {
        match policy {
            StoragePolicy::CoLocated => None,
            StoragePolicy::Internal => Some(Self::artifact_dir(policy, item).join(IGNORE_MARKER)),
        }
    }

    /// Where a newly generated artifact for `width` is published.
    pub fn target_artifact_path(&self, item: &MediaItem, width: Width) -> PathBuf {
        Self::artifact_path(self.policy, item, width)
    }

    /// Where the manifest for newly generated artifacts is kept.
    pub fn target_manifest_path(&self, item: &MediaItem) -> PathBuf {
        Self::manifest_path(self.policy, item)
    }

    pub fn target_marker_path(&self, item: &MediaItem) -> Option<PathBuf> {
        Self::marker_path(self.policy, item)
    }

    // -- lookups ------------------------------------------------------------

    fn search_order(&self) -> [StoragePolicy; 2] {
        [self.policy, self.policy.other()]
    }

    /// Existing, current artifact for (`item`, `width`), if any.
    pub async fn resolve(&self, item: &MediaItem, width: Width) -> Option<PathBuf> {
        for policy in self.search_order() {
            if let Some(path) = Self::resolve_in(policy, item, width).await {
                return Some(path);
            }
        }
        None
    }

    /// Existing, current artifact under one specific policy.
    pub async fn resolve_in(policy: StoragePolicy, item: &MediaItem, width: Width) -> Option<PathBuf> {
        let path = Self::artifact_path(policy, item, width);
        is_current(policy, item, &path).await.then_some(path)
    }

    /// Existing, current manifest for `item`, if any.
    pub async fn resolve_manifest(&self, item: &MediaItem) -> Option<PathBuf> {
        for policy in self.search_order() {
            if let Some(path) = Self::resolve_manifest_in(policy, item).await {
                return Some(path);
            }
        }
        None
    }

    pub async fn resolve_manifest_in(policy: StoragePolicy, item: &MediaItem) -> Option<PathBuf> {
        let path = Self::manifest_path(policy, item);
        is_current(policy, item, &path).await.then_some(path)
    }

    /// Every artifact present for the item's current fingerprint under
    /// `policy`, sorted by width.
    pub async fn discover(policy: StoragePolicy, item: &MediaItem) -> Vec<(Width, PathBuf)> {
        let dir = Self::artifact_dir(policy, item);
        let prefix = match policy {
            StoragePolicy::CoLocated => format!("{}-", item.file_stem()),
            StoragePolicy::Internal => String::new(),
        };
        let suffix = format!(".{BIF_EXTENSION}");

        let mut found = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
            return found;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            let width = name
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_suffix(suffix.as_str()))
                .and_then(|digits| digits.parse::<Width>().ok());
            if let Some(width) = width {
                found.push((width, entry.path()));
            }
        }
        found.sort();
        found
    }
}

/// Whether `path` exists as a file and still reflects the source.
///
/// Internal paths embed the fingerprint, so existence is enough. Co-located
/// paths do not, so an artifact older than its source is treated as stale.
async fn is_current(policy: StoragePolicy, item: &MediaItem, path: &std::path::Path) -> bool {
    let Ok(meta) = tokio::fs::metadata(path).await else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    match policy {
        StoragePolicy::Internal => true,
        StoragePolicy::CoLocated => match meta.modified() {
            Ok(modified) => DateTime::<Utc>::from(modified) >= item.date_modified,
            Err(_) => true,
        },
    }
}
