//! Per-item manifest listing which widths have been generated.
//!
//! Serialized as `{ "version": "1.0", "widthResolutions": [320, 640] }`.
//! Updates are merges: a new width is added to the set, nothing is dropped.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::Width;

/// Manifest format stamp written by this crate.
pub const MANIFEST_VERSION: &str = "1.0";

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid manifest JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: String,
    pub width_resolutions: BTreeSet<Width>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            width_resolutions: BTreeSet::new(),
        }
    }
}

impl Manifest {
    pub fn with_widths(widths: impl IntoIterator<Item = Width>) -> Self {
        Self {
            width_resolutions: widths.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Add `width`; returns `false` if it was already listed.
    pub fn merge_width(&mut self, width: Width) -> bool {
        self.version = MANIFEST_VERSION.to_string();
        self.width_resolutions.insert(width)
    }

    pub fn contains(&self, width: Width) -> bool {
        self.width_resolutions.contains(&width)
    }

    /// Widths in ascending order.
    pub fn widths(&self) -> Vec<Width> {
        self.width_resolutions.iter().copied().collect()
    }

    pub fn to_json(&self) -> Result<Vec<u8>, ManifestError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Read a manifest, returning `None` if the file does not exist.
pub async fn read(path: &Path) -> Result<Option<Manifest>, ManifestError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write `manifest` to `path` via a sibling temp file and a rename, so
/// readers see either the old or the new manifest.
pub async fn write(path: &Path, manifest: &Manifest) -> Result<(), ManifestError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
    tokio::fs::write(&tmp, manifest.to_json()?).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// Read-modify-write: union `widths` into whatever manifest is at `path`.
///
/// A manifest that no longer parses is replaced rather than blocking every
/// later merge. Callers must serialize concurrent merges for the same path.
pub async fn merge_into(
    path: &Path,
    widths: impl IntoIterator<Item = Width>,
) -> Result<Manifest, ManifestError> {
    let mut manifest = match read(path).await {
        Ok(existing) => existing.unwrap_or_default(),
        Err(ManifestError::Parse(e)) => {
            tracing::warn!(path = %path.display(), error = %e, "Replacing unreadable manifest");
            Manifest::default()
        }
        Err(e) => return Err(e),
    };
    for width in widths {
        manifest.merge_width(width);
    }
    write(path, &manifest).await?;
    Ok(manifest)
}
