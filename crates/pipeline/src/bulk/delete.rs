//! Artifact deletion.
//!
//! Removes every artifact and manifest the resolver could ever point at for
//! an item, under both storage policies. The internal layout is dropped as a
//! whole so artifacts from older fingerprints go too.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use trickplay_core::cache::{ArtifactResolver, StoragePolicy};
use trickplay_core::media::{check_eligibility, MediaItem};

use super::for_each_parallel;
use crate::generator::TrickplayGenerator;
use crate::job_log::JobLog;
use crate::library::MediaLibrary;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeleteSummary {
    pub items: usize,
    pub files: usize,
    pub failed: usize,
}

#[derive(Default)]
struct Counters {
    items: AtomicUsize,
    files: AtomicUsize,
    failed: AtomicUsize,
}

pub async fn delete_all(
    generator: &Arc<TrickplayGenerator>,
    library: &dyn MediaLibrary,
    log: &Arc<JobLog>,
    cancel: &CancellationToken,
) -> DeleteSummary {
    log.info("Deleting trickplay files.");

    let items = match library.list_videos().await {
        Ok(items) => items,
        Err(e) => {
            log.error(format!("Failed to list library items: {e}"));
            return DeleteSummary::default();
        }
    };
    let mut eligible = Vec::with_capacity(items.len());
    for item in items {
        if check_eligibility(&item).await.is_ok() {
            eligible.push(item);
        }
    }

    let counters = Arc::new(Counters::default());
    {
        let generator = Arc::clone(generator);
        let log = Arc::clone(log);
        let counters = Arc::clone(&counters);
        let workers = generator.config().parallel_processes;
        for_each_parallel(eligible, workers, cancel, move |item| {
            let generator = Arc::clone(&generator);
            let log = Arc::clone(&log);
            let counters = Arc::clone(&counters);
            async move { delete_item(&generator, &item, &log, &counters).await }
        })
        .await;
    }

    let summary = DeleteSummary {
        items: counters.items.load(Ordering::SeqCst),
        files: counters.files.load(Ordering::SeqCst),
        failed: counters.failed.load(Ordering::SeqCst),
    };
    if cancel.is_cancelled() {
        log.error("Deletion cancelled.");
    }
    log.success(format!(
        "Deletion finished: {} files removed for {} videos, {} failures.",
        summary.files, summary.items, summary.failed
    ));
    tracing::info!(?summary, "Trickplay deletion finished");
    summary
}

async fn delete_item(
    generator: &TrickplayGenerator,
    item: &MediaItem,
    log: &JobLog,
    counters: &Counters,
) {
    // Waits out any in-flight generation for the item.
    let _lock = generator.lock_item(item).await;
    let mut removed = 0usize;

    for (_, path) in ArtifactResolver::discover(StoragePolicy::CoLocated, item).await {
        removed += remove_file(&path, item, log, counters).await;
    }
    let manifest = ArtifactResolver::manifest_path(StoragePolicy::CoLocated, item);
    removed += remove_file(&manifest, item, log, counters).await;

    let internal = ArtifactResolver::internal_root(item);
    removed += count_files(&internal).await;
    match tokio::fs::remove_dir_all(&internal).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            counters.failed.fetch_add(1, Ordering::SeqCst);
            log.error(format!("[{}] Could not remove {}: {e}", item.name, internal.display()));
        }
    }

    if removed > 0 {
        counters.items.fetch_add(1, Ordering::SeqCst);
        counters.files.fetch_add(removed, Ordering::SeqCst);
        log.success(format!("[{}] Deleted {removed} trickplay files.", item.name));
    }
}

async fn remove_file(path: &Path, item: &MediaItem, log: &JobLog, counters: &Counters) -> usize {
    match tokio::fs::remove_file(path).await {
        Ok(()) => 1,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
        Err(e) => {
            counters.failed.fetch_add(1, Ordering::SeqCst);
            log.error(format!("[{}] Could not remove {}: {e}", item.name, path.display()));
            0
        }
    }
}

/// Regular files under `dir`, markers and manifests included.
async fn count_files(dir: &Path) -> usize {
    let mut count = 0;
    let mut pending = vec![dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            match entry.file_type().await {
                Ok(t) if t.is_dir() => pending.push(entry.path()),
                Ok(t) if t.is_file() => count += 1,
                _ => {}
            }
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use trickplay_core::bif;

    use super::*;
    use crate::generator::{GenerationOutcome, LockMode};
    use crate::job_log::Severity;
    use crate::library::InMemoryLibrary;
    use crate::monitor::TracingMonitor;
    use crate::test_support::{config, fake_ffmpeg, media_item};

    fn put(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bif::encode(&[b"x".as_slice()], 1_000).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn removes_artifacts_under_both_policies() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), Path::new("/nonexistent/ffmpeg"));
        let generator = Arc::new(TrickplayGenerator::new(Arc::new(cfg), Arc::new(TracingMonitor)));

        let mut item = media_item(dir.path(), "film");
        let co_located = ArtifactResolver::artifact_path(StoragePolicy::CoLocated, &item, 320);
        let co_manifest = ArtifactResolver::manifest_path(StoragePolicy::CoLocated, &item);
        let internal = ArtifactResolver::artifact_path(StoragePolicy::Internal, &item, 320);
        let marker = ArtifactResolver::marker_path(StoragePolicy::Internal, &item).unwrap();
        put(&co_located);
        put(&co_manifest);
        put(&internal);
        put(&marker);
        // Artifact left over from before the source was replaced.
        item.date_modified += chrono::Duration::seconds(60);
        let older = ArtifactResolver::artifact_path(StoragePolicy::Internal, &item, 320);
        assert_ne!(older, internal);
        put(&older);

        let untouched = item.containing_dir().join("film.nfo");
        std::fs::write(&untouched, b"keep").unwrap();

        let library = InMemoryLibrary::new([item.clone()]);
        let log = Arc::new(JobLog::new());
        let summary = delete_all(&generator, &library, &log, &CancellationToken::new()).await;

        assert_eq!(
            summary,
            DeleteSummary {
                items: 1,
                files: 5,
                failed: 0
            }
        );
        assert!(!co_located.exists());
        assert!(!co_manifest.exists());
        assert!(!ArtifactResolver::internal_root(&item).exists());
        assert!(untouched.exists());
        assert!(item.path.exists());
        assert_eq!(log.snapshot().last().unwrap().severity, Severity::Success);
    }

    #[tokio::test]
    async fn nothing_to_delete_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), Path::new("/nonexistent/ffmpeg"));
        let generator = Arc::new(TrickplayGenerator::new(Arc::new(cfg), Arc::new(TracingMonitor)));
        let library = InMemoryLibrary::new([media_item(dir.path(), "clean")]);
        let log = Arc::new(JobLog::new());

        let summary = delete_all(&generator, &library, &log, &CancellationToken::new()).await;
        assert_eq!(summary, DeleteSummary::default());
        assert!(log.snapshot().iter().all(|l| l.severity != Severity::Error));
    }

    #[tokio::test]
    async fn waits_for_in_flight_generation_before_removing() {
        let dir = tempfile::tempdir().unwrap();
        let calls = dir.path().join("calls");
        let ffmpeg = fake_ffmpeg(dir.path(), &calls, &[10, 20], 1.0);
        let cfg = config(dir.path(), &ffmpeg);
        let generator = Arc::new(TrickplayGenerator::new(Arc::new(cfg), Arc::new(TracingMonitor)));
        let item = media_item(dir.path(), "busy");

        let running = {
            let generator = Arc::clone(&generator);
            let item = item.clone();
            tokio::spawn(async move {
                generator
                    .generate(&item, 320, LockMode::Wait, &CancellationToken::new())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(generator.is_generating(&item, 320));

        let library = InMemoryLibrary::new([item.clone()]);
        let log = Arc::new(JobLog::new());
        let summary = delete_all(&generator, &library, &log, &CancellationToken::new()).await;

        // The generation finished first, and its output was then removed.
        assert_matches!(running.await.unwrap(), Ok(GenerationOutcome::Generated(_)));
        assert_eq!(summary.items, 1);
        assert_eq!(summary.files, 3);
        assert!(generator.resolver().resolve(&item, 320).await.is_none());
        assert!(generator.resolver().resolve_manifest(&item).await.is_none());
        assert!(!ArtifactResolver::internal_root(&item).exists());
    }
}
