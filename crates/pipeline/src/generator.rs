//! Artifact generation.
//!
//! One [`TrickplayGenerator`] per process. For each (item, width,
//! fingerprint) key it guarantees at most one extraction in flight:
//!
//! 1. take the key lock (wait for it, or give up with
//!    [`GenerationOutcome::AlreadyInProgress`])
//! 2. re-check the cache, another holder may have just published
//! 3. extract frames into a private scratch directory
//! 4. encode them into a staged file inside that scratch directory
//! 5. move the staged file to its final path, announced to the library
//!    monitor
//! 6. merge the width into the item's manifest
//!
//! The scratch directory is removed on every exit path, and nothing is
//! written to the final path until step 5, so a failed run leaves the cache
//! exactly as it found it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use trickplay_core::bif::{self, Bif, BifError};
use trickplay_core::cache::{ArtifactResolver, CacheKey};
use trickplay_core::config::TrickplayConfig;
use trickplay_core::ffmpeg::ExtractionCommand;
use trickplay_core::manifest::{self, Manifest, ManifestError};
use trickplay_core::media::{check_eligibility, Ineligible, MediaItem};
use trickplay_core::types::{ItemId, Width};

use crate::extraction::{run_extraction, ExtractionError, RunSettings};
use crate::locks::{KeyGuard, KeyedLocks};
use crate::monitor::LibraryMonitor;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("item is not eligible: {0}")]
    Ineligible(#[from] Ineligible),

    #[error(transparent)]
    Extraction(ExtractionError),

    #[error("extraction produced no frames")]
    EmptyExtraction,

    #[error("generation cancelled")]
    Cancelled,

    #[error("BIF error: {0}")]
    Bif(#[from] BifError),

    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ExtractionError> for GenerationError {
    fn from(e: ExtractionError) -> Self {
        match e {
            ExtractionError::Cancelled => Self::Cancelled,
            other => Self::Extraction(other),
        }
    }
}

/// What to do when another caller already holds the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Queue behind the holder. Bulk tasks and the blocking scan hook.
    Wait,
    /// Return [`GenerationOutcome::AlreadyInProgress`]. The serving layer.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// A new artifact was published at this path.
    Generated(PathBuf),
    /// A current artifact already existed; no work was done.
    Existing(PathBuf),
    /// Someone else holds the key right now.
    AlreadyInProgress,
}

pub struct TrickplayGenerator {
    config: Arc<TrickplayConfig>,
    resolver: ArtifactResolver,
    monitor: Arc<dyn LibraryMonitor>,
    artifact_locks: KeyedLocks<CacheKey>,
    manifest_locks: KeyedLocks<ItemId>,
}

impl TrickplayGenerator {
    pub fn new(config: Arc<TrickplayConfig>, monitor: Arc<dyn LibraryMonitor>) -> Self {
        let resolver = ArtifactResolver::new(config.storage_policy());
        Self {
            config,
            resolver,
            monitor,
            artifact_locks: KeyedLocks::new(),
            manifest_locks: KeyedLocks::new(),
        }
    }

    pub fn config(&self) -> &TrickplayConfig {
        &self.config
    }

    pub fn resolver(&self) -> ArtifactResolver {
        self.resolver
    }

    /// Whether a generation for (`item`, `width`) currently holds its key.
    pub fn is_generating(&self, item: &MediaItem, width: Width) -> bool {
        self.artifact_locks
            .is_locked(&CacheKey::for_item(item, width))
    }

    /// Hold every generation key for `item` (each configured width and the
    /// manifest) until the returned guard is dropped, so nothing is published
    /// for the item in the meantime.
    pub async fn lock_item(&self, item: &MediaItem) -> ItemLock {
        let mut widths = self.config.widths.clone();
        widths.sort_unstable();
        widths.dedup();
        let mut artifacts = Vec::with_capacity(widths.len());
        for width in widths {
            artifacts.push(
                self.artifact_locks
                    .acquire(&CacheKey::for_item(item, width))
                    .await,
            );
        }
        // Generation takes its artifact key before the manifest key.
        let manifest = self.manifest_locks.acquire(&item.id).await;
        ItemLock {
            _artifacts: artifacts,
            _manifest: manifest,
        }
    }

    /// Make sure an artifact exists for (`item`, `width`), extracting one
    /// if needed.
    #[tracing::instrument(skip_all, fields(item_id = %item.id, width = width))]
    pub async fn generate(
        &self,
        item: &MediaItem,
        width: Width,
        mode: LockMode,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome, GenerationError> {
        check_eligibility(item).await?;

        if let Some(path) = self.resolver.resolve(item, width).await {
            self.ensure_recorded(item, width).await?;
            return Ok(GenerationOutcome::Existing(path));
        }

        let key = CacheKey::for_item(item, width);
        let Some(_guard) = self.lock(&key, mode, cancel).await? else {
            tracing::debug!("Generation already in progress");
            return Ok(GenerationOutcome::AlreadyInProgress);
        };

        if let Some(path) = self.resolver.resolve(item, width).await {
            self.ensure_recorded(item, width).await?;
            return Ok(GenerationOutcome::Existing(path));
        }

        let scratch = ScratchDir::create(&self.config.scratch_root()).await?;
        let command = ExtractionCommand {
            ffmpeg: self.config.ffmpeg_path.clone(),
            source: item.path.clone(),
            container: item.container.clone(),
            output_dir: scratch.path().to_path_buf(),
            width,
            interval_ms: self.config.interval_ms,
            threads: self.config.process_threads,
        };
        tracing::info!(source = %item.path.display(), "Extracting trickplay frames");

        let settings = RunSettings {
            stall_poll: self.config.stall_poll,
            niceness: self.config.process_niceness,
        };
        let frames = run_extraction(command.to_command(), scratch.path(), settings, cancel).await?;
        if frames.is_empty() {
            return Err(GenerationError::EmptyExtraction);
        }
        if cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }

        let target = self.resolver.target_artifact_path(item, width);
        let staged = scratch.staged_file();
        {
            let mut file = tokio::fs::File::create(&staged).await?;
            bif::write_from_files(&mut file, &frames, self.config.interval_ms).await?;
            file.sync_all().await?;
        }
        self.publish(&staged, &target).await?;
        self.record(item, width).await?;

        tracing::info!(
            frames = frames.len(),
            path = %target.display(),
            "Trickplay artifact published",
        );
        Ok(GenerationOutcome::Generated(target))
    }

    /// Generate every configured width for `item`, stopping at the first
    /// failure.
    pub async fn generate_all_widths(
        &self,
        item: &MediaItem,
        mode: LockMode,
        cancel: &CancellationToken,
    ) -> Result<Vec<GenerationOutcome>, GenerationError> {
        let mut outcomes = Vec::with_capacity(self.config.widths.len());
        for &width in &self.config.widths {
            outcomes.push(self.generate(item, width, mode, cancel).await?);
        }
        Ok(outcomes)
    }

    /// Publish frames from an already decoded BIF under the active policy,
    /// without running the extractor. Used to migrate artifacts stored under
    /// the other policy.
    #[tracing::instrument(skip_all, fields(item_id = %item.id, width = width))]
    pub async fn import(
        &self,
        item: &MediaItem,
        width: Width,
        legacy: &Bif,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome, GenerationError> {
        let key = CacheKey::for_item(item, width);
        let Some(_guard) = self.lock(&key, LockMode::Wait, cancel).await? else {
            return Ok(GenerationOutcome::AlreadyInProgress);
        };

        let active = self.resolver.policy();
        if let Some(path) = ArtifactResolver::resolve_in(active, item, width).await {
            return Ok(GenerationOutcome::Existing(path));
        }
        if legacy.is_empty() {
            return Err(GenerationError::EmptyExtraction);
        }

        let frames: Vec<_> = legacy.frames().collect();
        let encoded = bif::encode(&frames, legacy.interval_ms())?;

        let scratch = ScratchDir::create(&self.config.scratch_root()).await?;
        let staged = scratch.staged_file();
        {
            let mut file = tokio::fs::File::create(&staged).await?;
            file.write_all(&encoded).await?;
            file.sync_all().await?;
        }
        let target = self.resolver.target_artifact_path(item, width);
        self.publish(&staged, &target).await?;
        self.record(item, width).await?;
        Ok(GenerationOutcome::Generated(target))
    }

    async fn lock(
        &self,
        key: &CacheKey,
        mode: LockMode,
        cancel: &CancellationToken,
    ) -> Result<Option<KeyGuard<CacheKey>>, GenerationError> {
        match mode {
            LockMode::Skip => Ok(self.artifact_locks.try_acquire(key)),
            LockMode::Wait => tokio::select! {
                guard = self.artifact_locks.acquire(key) => Ok(Some(guard)),
                _ = cancel.cancelled() => Err(GenerationError::Cancelled),
            },
        }
    }

    /// Move `staged` to `target`, bracketed by monitor notifications.
    async fn publish(&self, staged: &Path, target: &Path) -> Result<(), GenerationError> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.monitor.change_beginning(target);
        let result = move_into_place(staged, target).await;
        self.monitor.change_complete(target);
        Ok(result?)
    }

    /// Record an artifact found on disk whose manifest does not list it,
    /// left behind by a run that published but never got to [`Self::record`].
    async fn ensure_recorded(&self, item: &MediaItem, width: Width) -> Result<(), GenerationError> {
        if let Some(path) = self.resolver.resolve_manifest(item).await {
            if let Ok(Some(existing)) = manifest::read(&path).await {
                if existing.contains(width) {
                    return Ok(());
                }
            }
        }
        tracing::info!("Artifact missing from manifest, recording it");
        self.record(item, width).await?;
        Ok(())
    }

    /// Drop the ignore marker and merge `width`, along with every other
    /// current artifact under the active policy, into the manifest.
    async fn record(&self, item: &MediaItem, width: Width) -> Result<Manifest, GenerationError> {
        if let Some(marker) = self.resolver.target_marker_path(item) {
            if !tokio::fs::try_exists(&marker).await.unwrap_or(false) {
                tokio::fs::write(&marker, b"").await?;
            }
        }

        let _guard = self.manifest_locks.acquire(&item.id).await;
        let mut widths = self.published_widths(item).await;
        widths.push(width);
        let path = self.resolver.target_manifest_path(item);
        self.monitor.change_beginning(&path);
        let merged = manifest::merge_into(&path, widths).await;
        self.monitor.change_complete(&path);
        Ok(merged?)
    }

    async fn published_widths(&self, item: &MediaItem) -> Vec<Width> {
        let active = self.resolver.policy();
        let mut widths = Vec::new();
        for (width, _) in ArtifactResolver::discover(active, item).await {
            if ArtifactResolver::resolve_in(active, item, width).await.is_some() {
                widths.push(width);
            }
        }
        widths
    }
}

/// Guard returned by [`TrickplayGenerator::lock_item`].
pub struct ItemLock {
    _artifacts: Vec<KeyGuard<CacheKey>>,
    _manifest: KeyGuard<ItemId>,
}

/// Rename `from` onto `to`. Across file systems, copy to a sibling of `to`
/// first and rename that, so `to` never holds a partial file.
async fn move_into_place(from: &Path, to: &Path) -> std::io::Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    let name = to
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let sibling = to.with_file_name(format!(".{name}.{}.partial", uuid::Uuid::new_v4().simple()));
    let result = async {
        tokio::fs::copy(from, &sibling).await?;
        tokio::fs::rename(&sibling, to).await
    }
    .await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(&sibling).await;
    }
    result
}

/// Private working directory for one generation run, removed on drop.
struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    async fn create(root: &Path) -> std::io::Result<Self> {
        let path = root.join(uuid::Uuid::new_v4().simple().to_string());
        tokio::fs::create_dir_all(&path).await?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn staged_file(&self) -> PathBuf {
        self.path.join("staged.bif")
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove scratch directory");
            }
        }
    }
}
