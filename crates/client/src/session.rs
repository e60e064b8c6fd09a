//! Playback-session state machine.
//!
//! ```text
//! AwaitingSource -> FetchingManifest -> FetchingArtifact -> Ready
//!                          |                   |
//!                          +-------> Failed <--+
//! ```
//!
//! A "not ready" answer keeps the current state and waits the configured
//! backoff before the same request is repeated. Anything else that is not a
//! success ends the session in `Failed`, and the player keeps its plain
//! slider. Attaching a new source cancels whatever the previous one was
//! doing.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use trickplay_core::bif::Bif;
use trickplay_core::manifest::Manifest;
use trickplay_core::types::{ticks_to_millis, ItemId, Width};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::preview::PreviewImage;
use crate::selection::select_width;
use crate::source::{FetchOutcome, TrickplaySource};

/// What is playing and on what screen.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSource {
    pub item_id: ItemId,
    /// Total runtime in 100-ns ticks.
    pub runtime_ticks: i64,
    pub screen_width: f64,
    pub device_pixel_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    AwaitingSource,
    FetchingManifest,
    FetchingArtifact { width: Width },
    Ready { width: Width },
    Failed(Failure),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready { .. } | Self::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    ManifestNotFound,
    /// The manifest has no widths listed.
    EmptyManifest,
    ArtifactNotFound { width: Width },
    /// Transport error, unexpected status or an unusable BIF.
    Fetch(String),
}

pub struct PlaybackSession<S> {
    source: Arc<S>,
    config: ClientConfig,
    media: Option<MediaSource>,
    state: SessionState,
    manifest: Option<Manifest>,
    bif: Option<Bif>,
    current: Option<PreviewImage>,
    cancel: CancellationToken,
}

impl<S: TrickplaySource> PlaybackSession<S> {
    pub fn new(source: Arc<S>, config: ClientConfig) -> Self {
        Self {
            source,
            config,
            media: None,
            state: SessionState::AwaitingSource,
            manifest: None,
            bif: None,
            current: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    /// Token that aborts the in-flight fetch or backoff of the current
    /// source.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Start a new playback session, abandoning the previous one.
    pub fn attach(&mut self, media: MediaSource) {
        self.reset();
        tracing::debug!(item_id = %media.item_id, "Trickplay session attached");
        self.media = Some(media);
        self.state = SessionState::FetchingManifest;
    }

    /// Drop everything held for the current source.
    pub fn detach(&mut self) {
        self.reset();
        self.state = SessionState::AwaitingSource;
    }

    /// Drive the session until it is ready, has failed, or is cancelled.
    ///
    /// Cancellation returns the session to `AwaitingSource`.
    pub async fn run(&mut self) -> &SessionState {
        let cancel = self.cancel.clone();
        while !self.state.is_terminal() && self.media.is_some() {
            let cancelled = tokio::select! {
                () = cancel.cancelled() => true,
                () = self.step() => false,
            };
            if cancelled {
                self.detach();
                break;
            }
        }
        &self.state
    }

    /// Perform one transition. A "not ready" answer sleeps the backoff and
    /// leaves the state unchanged.
    pub async fn step(&mut self) {
        let Some(media) = self.media.clone() else {
            return;
        };
        let next = match self.state.clone() {
            SessionState::FetchingManifest => self.fetch_manifest(&media).await,
            SessionState::FetchingArtifact { width } => self.fetch_artifact(&media, width).await,
            state => Ok(Some(state)),
        };
        match next {
            Ok(Some(state)) => self.state = state,
            Ok(None) => {
                tracing::info!(
                    item_id = %media.item_id,
                    backoff_secs = self.config.retry_backoff.as_secs_f64(),
                    "Trickplay data still generating, retrying later"
                );
                tokio::time::sleep(self.config.retry_backoff).await;
            }
            Err(e) => {
                tracing::debug!(item_id = %media.item_id, error = %e, "Trickplay fetch failed");
                self.state = SessionState::Failed(Failure::Fetch(e.to_string()));
            }
        }
    }

    /// Preview for a playback position in 100-ns ticks.
    ///
    /// A hit replaces the previously held preview, so at most one is alive.
    /// A miss (not ready, or past the last frame) leaves the last preview in
    /// place and returns `None`.
    pub fn preview_at(&mut self, position_ticks: i64) -> Option<&PreviewImage> {
        let frame = self.bif.as_ref()?.frame_at(ticks_to_millis(position_ticks))?;
        self.current = Some(PreviewImage::new(frame, position_ticks));
        self.current.as_ref()
    }

    /// Preview for a slider position given as a percentage of the runtime.
    pub fn preview_at_percent(&mut self, percent: f64) -> Option<&PreviewImage> {
        let runtime = self.media.as_ref()?.runtime_ticks;
        let ticks = (runtime as f64 * percent.clamp(0.0, 100.0) / 100.0) as i64;
        self.preview_at(ticks)
    }

    /// The preview most recently returned.
    pub fn current_preview(&self) -> Option<&PreviewImage> {
        self.current.as_ref()
    }

    fn reset(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.media = None;
        self.manifest = None;
        self.bif = None;
        self.current = None;
    }

    async fn fetch_manifest(
        &mut self,
        media: &MediaSource,
    ) -> Result<Option<SessionState>, ClientError> {
        let manifest = match self.source.fetch_manifest(media.item_id).await? {
            FetchOutcome::Ready(manifest) => manifest,
            FetchOutcome::NotReady => return Ok(None),
            FetchOutcome::NotFound => {
                return Ok(Some(SessionState::Failed(Failure::ManifestNotFound)));
            }
        };

        let chosen = select_width(
            &manifest.widths(),
            media.screen_width,
            media.device_pixel_ratio,
            self.config.width_fraction,
        );
        self.manifest = Some(manifest);
        Ok(Some(match chosen {
            Some(width) => {
                tracing::info!(item_id = %media.item_id, width, "Requesting BIF");
                SessionState::FetchingArtifact { width }
            }
            None => SessionState::Failed(Failure::EmptyManifest),
        }))
    }

    async fn fetch_artifact(
        &mut self,
        media: &MediaSource,
        width: Width,
    ) -> Result<Option<SessionState>, ClientError> {
        match self.source.fetch_bif(media.item_id, width).await? {
            FetchOutcome::Ready(bytes) => {
                self.bif = Some(Bif::decode(bytes)?);
                Ok(Some(SessionState::Ready { width }))
            }
            FetchOutcome::NotReady => Ok(None),
            FetchOutcome::NotFound => {
                tracing::error!(
                    item_id = %media.item_id,
                    width,
                    "BIF listed in manifest but server returned 404"
                );
                Ok(Some(SessionState::Failed(Failure::ArtifactNotFound { width })))
            }
        }
    }
}
