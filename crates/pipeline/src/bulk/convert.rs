//! Legacy artifact conversion.
//!
//! Artifacts written under the inactive storage policy (for instance before
//! the "save with media" setting was flipped) are decoded and re-published
//! under the active policy. The source BIF already holds the frames, so no
//! extraction runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use trickplay_core::bif::Bif;
use trickplay_core::cache::ArtifactResolver;
use trickplay_core::media::{check_eligibility, MediaItem};

use super::for_each_parallel;
use crate::generator::{GenerationError, GenerationOutcome, TrickplayGenerator};
use crate::job_log::JobLog;
use crate::library::MediaLibrary;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConvertSummary {
    pub converted: usize,
    pub skipped: usize,
    pub stale: usize,
    pub failed: usize,
}

#[derive(Default)]
struct Counters {
    converted: AtomicUsize,
    skipped: AtomicUsize,
    stale: AtomicUsize,
    failed: AtomicUsize,
}

pub async fn convert_all(
    generator: &Arc<TrickplayGenerator>,
    library: &dyn MediaLibrary,
    log: &Arc<JobLog>,
    cancel: &CancellationToken,
) -> ConvertSummary {
    let active = generator.resolver().policy();
    let legacy = active.other();
    log.info(format!(
        "Converting trickplay files stored {legacy:?} to {active:?} storage."
    ));

    let items = match library.list_videos().await {
        Ok(items) => items,
        Err(e) => {
            log.error(format!("Failed to list library items: {e}"));
            return ConvertSummary::default();
        }
    };

    let mut eligible = Vec::with_capacity(items.len());
    for item in items {
        if check_eligibility(&item).await.is_ok() {
            eligible.push(item);
        }
    }
    log.info(format!("Found {} eligible videos.", eligible.len()));

    let counters = Arc::new(Counters::default());
    {
        let generator = Arc::clone(generator);
        let log = Arc::clone(log);
        let counters = Arc::clone(&counters);
        let workers = generator.config().parallel_processes;
        let job_cancel = cancel.clone();
        for_each_parallel(eligible, workers, cancel, move |item| {
            let generator = Arc::clone(&generator);
            let log = Arc::clone(&log);
            let counters = Arc::clone(&counters);
            let cancel = job_cancel.clone();
            async move { convert_item(&generator, &item, &log, &counters, &cancel).await }
        })
        .await;
    }

    let summary = ConvertSummary {
        converted: counters.converted.load(Ordering::SeqCst),
        skipped: counters.skipped.load(Ordering::SeqCst),
        stale: counters.stale.load(Ordering::SeqCst),
        failed: counters.failed.load(Ordering::SeqCst),
    };
    if cancel.is_cancelled() {
        log.error("Conversion cancelled.");
    }
    log.success(format!(
        "Conversion finished: {} converted, {} already present, {} outdated, {} failed.",
        summary.converted, summary.skipped, summary.stale, summary.failed
    ));
    tracing::info!(?summary, "Legacy conversion finished");
    summary
}

async fn convert_item(
    generator: &TrickplayGenerator,
    item: &MediaItem,
    log: &JobLog,
    counters: &Counters,
    cancel: &CancellationToken,
) {
    let legacy = generator.resolver().policy().other();
    for (width, path) in ArtifactResolver::discover(legacy, item).await {
        // Co-located files older than the source describe a previous version.
        if ArtifactResolver::resolve_in(legacy, item, width).await.is_none() {
            counters.stale.fetch_add(1, Ordering::SeqCst);
            log.info(format!(
                "[{}] {} predates the source file, skipping.",
                item.name,
                path.display()
            ));
            continue;
        }
        let decoded = match tokio::fs::read(&path).await {
            Ok(bytes) => Bif::decode(bytes),
            Err(e) => {
                log.error(format!("[{}] Could not read {}: {e}", item.name, path.display()));
                counters.failed.fetch_add(1, Ordering::SeqCst);
                continue;
            }
        };
        let bif = match decoded {
            Ok(bif) => bif,
            Err(e) => {
                log.error(format!("[{}] {} is not usable: {e}", item.name, path.display()));
                counters.failed.fetch_add(1, Ordering::SeqCst);
                continue;
            }
        };

        match generator.import(item, width, &bif, cancel).await {
            Ok(GenerationOutcome::Generated(target)) => {
                counters.converted.fetch_add(1, Ordering::SeqCst);
                log.success(format!(
                    "[{}] Converted {width}px ({} frames) to {}",
                    item.name,
                    bif.len(),
                    target.display()
                ));
            }
            Ok(GenerationOutcome::Existing(_)) | Ok(GenerationOutcome::AlreadyInProgress) => {
                counters.skipped.fetch_add(1, Ordering::SeqCst);
                log.info(format!("[{}] {width}px already present, skipping.", item.name));
            }
            Err(GenerationError::Cancelled) => return,
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::SeqCst);
                log.error(format!("[{}] Failed to convert {width}px: {e}", item.name));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use trickplay_core::bif;
    use trickplay_core::cache::StoragePolicy;
    use trickplay_core::manifest;

    use super::*;
    use crate::job_log::Severity;
    use crate::library::InMemoryLibrary;
    use crate::monitor::TracingMonitor;
    use crate::test_support::{config, media_item};

    fn write_legacy(item: &MediaItem, width: u32, frames: &[&[u8]]) -> std::path::PathBuf {
        let path = ArtifactResolver::artifact_path(StoragePolicy::CoLocated, item, width);
        std::fs::write(&path, bif::encode(frames, 1_000).unwrap()).unwrap();
        path
    }

    #[tokio::test]
    async fn converts_co_located_artifacts_into_internal_storage() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), std::path::Path::new("/nonexistent/ffmpeg"));
        let generator = Arc::new(TrickplayGenerator::new(Arc::new(cfg), Arc::new(TracingMonitor)));

        let with_legacy = media_item(dir.path(), "old");
        let without = media_item(dir.path(), "new");
        write_legacy(&with_legacy, 320, &[b"a", b"bb"]);
        write_legacy(&with_legacy, 160, &[b"c"]);
        // Corrupt leftovers are reported, not fatal.
        std::fs::write(
            ArtifactResolver::artifact_path(StoragePolicy::CoLocated, &with_legacy, 640),
            b"garbage",
        )
        .unwrap();

        let library = InMemoryLibrary::new([with_legacy.clone(), without.clone()]);
        let log = Arc::new(JobLog::new());
        let summary = convert_all(&generator, &library, &log, &CancellationToken::new()).await;

        assert_eq!(
            summary,
            ConvertSummary {
                converted: 2,
                skipped: 0,
                stale: 0,
                failed: 1
            }
        );
        let internal = ArtifactResolver::resolve_in(StoragePolicy::Internal, &with_legacy, 320)
            .await
            .unwrap();
        let decoded = Bif::decode(std::fs::read(internal).unwrap()).unwrap();
        assert_eq!(decoded.frame(1).unwrap().as_ref(), b"bb");

        let manifest_path = ArtifactResolver::manifest_path(StoragePolicy::Internal, &with_legacy);
        let manifest = manifest::read(&manifest_path).await.unwrap().unwrap();
        assert_eq!(manifest.widths(), vec![160, 320]);

        let lines = log.snapshot();
        assert!(lines.iter().any(|l| l.severity == Severity::Error && l.message.contains("640")));
        assert_eq!(lines.last().unwrap().severity, Severity::Success);

        // Running again finds everything already converted.
        let again = convert_all(&generator, &library, &log, &CancellationToken::new()).await;
        assert_eq!(again.converted, 0);
        assert_eq!(again.skipped, 2);
    }

    #[tokio::test]
    async fn outdated_co_located_artifacts_are_not_imported() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), std::path::Path::new("/nonexistent/ffmpeg"));
        let generator = Arc::new(TrickplayGenerator::new(Arc::new(cfg), Arc::new(TracingMonitor)));

        let mut item = media_item(dir.path(), "replaced");
        let legacy = write_legacy(&item, 320, &[b"old frame"]);
        // The source was replaced after the legacy file was written.
        item.date_modified = chrono::Utc::now() + chrono::Duration::hours(1);

        let library = InMemoryLibrary::new([item.clone()]);
        let log = Arc::new(JobLog::new());
        let summary = convert_all(&generator, &library, &log, &CancellationToken::new()).await;

        assert_eq!(
            summary,
            ConvertSummary {
                converted: 0,
                skipped: 0,
                stale: 1,
                failed: 0
            }
        );
        assert!(ArtifactResolver::resolve_in(StoragePolicy::Internal, &item, 320)
            .await
            .is_none());
        assert!(generator.resolver().resolve(&item, 320).await.is_none());
        assert!(legacy.exists());
    }
}
