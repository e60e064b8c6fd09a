//! Serving layer.
//!
//! Answers manifest and artifact requests from what is on disk. A miss
//! either kicks off background generation and answers
//! [`ServeOutcome::NotReady`], or answers [`ServeOutcome::NotFound`] when
//! on-demand generation is off or the item can never have trickplay data.
//! Background jobs are tracked so shutdown can cancel and drain them.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use trickplay_core::config::{ScanBehavior, TrickplayConfig};
use trickplay_core::manifest::{self, Manifest, ManifestError};
use trickplay_core::media::{check_eligibility, MediaItem};
use trickplay_core::types::{ItemId, Width};

use crate::generator::{GenerationError, GenerationOutcome, LockMode, TrickplayGenerator};
use crate::library::{LibraryError, MediaLibrary};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServeOutcome<T> {
    Ready(T),
    /// Generation was started or is running; ask again later.
    NotReady,
    NotFound,
}

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("library lookup failed: {0}")]
    Library(#[from] LibraryError),

    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),
}

pub struct TrickplayService {
    config: Arc<TrickplayConfig>,
    library: Arc<dyn MediaLibrary>,
    generator: Arc<TrickplayGenerator>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl TrickplayService {
    pub fn new(
        config: Arc<TrickplayConfig>,
        library: Arc<dyn MediaLibrary>,
        generator: Arc<TrickplayGenerator>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            library,
            generator,
            shutdown,
            tasks: TaskTracker::new(),
        }
    }

    pub fn config(&self) -> &Arc<TrickplayConfig> {
        &self.config
    }

    pub fn library(&self) -> &Arc<dyn MediaLibrary> {
        &self.library
    }

    pub fn generator(&self) -> &Arc<TrickplayGenerator> {
        &self.generator
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Manifest for `id`, generating the configured widths on a miss.
    pub async fn get_manifest(&self, id: ItemId) -> Result<ServeOutcome<Manifest>, ServeError> {
        let Some(item) = self.library.get_item(id).await? else {
            return Ok(ServeOutcome::NotFound);
        };

        let resolver = self.generator.resolver();
        if let Some(path) = resolver.resolve_manifest(&item).await {
            match manifest::read(&path).await {
                Ok(Some(manifest)) => return Ok(ServeOutcome::Ready(manifest)),
                Ok(None) => {}
                // Regenerating rewrites it.
                Err(ManifestError::Parse(e)) => {
                    tracing::warn!(item_id = %item.id, path = %path.display(), error = %e, "Ignoring unreadable manifest");
                }
                Err(e) => return Err(e.into()),
            }
        }

        if !self.may_generate(&item).await {
            return Ok(ServeOutcome::NotFound);
        }
        self.spawn_generation(item, self.config.widths.clone());
        Ok(ServeOutcome::NotReady)
    }

    /// Path of the artifact for (`id`, `width`), generating it on a miss
    /// when `width` is one of the configured targets.
    pub async fn get_artifact(
        &self,
        id: ItemId,
        width: Width,
    ) -> Result<ServeOutcome<PathBuf>, ServeError> {
        let Some(item) = self.library.get_item(id).await? else {
            return Ok(ServeOutcome::NotFound);
        };

        if let Some(path) = self.generator.resolver().resolve(&item, width).await {
            return Ok(ServeOutcome::Ready(path));
        }

        if !self.config.widths.contains(&width) || !self.may_generate(&item).await {
            return Ok(ServeOutcome::NotFound);
        }
        self.spawn_generation(item, vec![width]);
        Ok(ServeOutcome::NotReady)
    }

    /// Library scan hook: generate every configured width for a freshly
    /// scanned item, inline or in the background depending on configuration.
    pub async fn on_item_scanned(&self, item: &MediaItem) -> Result<(), GenerationError> {
        if !self.config.extract_during_scan {
            return Ok(());
        }
        if let Err(reason) = check_eligibility(item).await {
            tracing::debug!(item_id = %item.id, %reason, "Skipping scanned item");
            return Ok(());
        }

        match self.config.scan_behavior {
            ScanBehavior::Blocking => {
                let cancel = self.shutdown.child_token();
                self.generator
                    .generate_all_widths(item, LockMode::Wait, &cancel)
                    .await?;
            }
            ScanBehavior::NonBlocking => {
                self.spawn_generation(item.clone(), self.config.widths.clone());
            }
        }
        Ok(())
    }

    /// Wait for every background job spawned so far.
    pub async fn wait_idle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    /// Cancel background jobs and wait for them to clean up.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }

    async fn may_generate(&self, item: &MediaItem) -> bool {
        self.config.on_demand_generation && check_eligibility(item).await.is_ok()
    }

    fn spawn_generation(&self, item: MediaItem, widths: Vec<Width>) {
        if self.shutdown.is_cancelled() {
            return;
        }
        let pending: Vec<Width> = widths
            .into_iter()
            .filter(|&w| !self.generator.is_generating(&item, w))
            .collect();
        if pending.is_empty() {
            return;
        }

        let generator = Arc::clone(&self.generator);
        let cancel = self.shutdown.child_token();
        self.tasks.spawn(async move {
            for width in pending {
                match generator.generate(&item, width, LockMode::Skip, &cancel).await {
                    Ok(GenerationOutcome::Generated(path)) => {
                        tracing::info!(item_id = %item.id, width, path = %path.display(), "On-demand generation finished");
                    }
                    Ok(outcome) => {
                        tracing::debug!(item_id = %item.id, width, ?outcome, "On-demand generation skipped");
                    }
                    Err(GenerationError::Cancelled) => break,
                    Err(e) => {
                        tracing::error!(item_id = %item.id, width, error = %e, "On-demand generation failed");
                    }
                }
            }
        });
    }
}
