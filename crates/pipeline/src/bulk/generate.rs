//! "Generate BIF files": pre-warm the cache for the whole library.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use trickplay_core::media::check_eligibility;

use super::{for_each_parallel, Progress, ProgressSink};
use crate::generator::{GenerationError, GenerationOutcome, LockMode, TrickplayGenerator};
use crate::library::{LibraryError, MediaLibrary};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GenerateSummary {
    pub total: usize,
    pub generated: usize,
    pub existing: usize,
    pub failed: usize,
}

#[derive(Default)]
struct Counters {
    generated: AtomicUsize,
    existing: AtomicUsize,
    failed: AtomicUsize,
}

/// Generate every configured width for every eligible video.
///
/// One item's failure is logged and counted; the run carries on. Only a
/// failure to list the library aborts.
pub async fn generate_all(
    generator: &Arc<TrickplayGenerator>,
    library: &dyn MediaLibrary,
    sink: Arc<dyn ProgressSink>,
    cancel: &CancellationToken,
) -> Result<GenerateSummary, LibraryError> {
    let mut eligible = Vec::new();
    for item in library.list_videos().await? {
        if check_eligibility(&item).await.is_ok() {
            eligible.push(item);
        }
    }
    let total = eligible.len();
    let workers = generator.config().parallel_processes;
    tracing::info!(total, workers, "Starting trickplay generation for library");

    let progress = Arc::new(Progress::new(total, sink));
    let counters = Arc::new(Counters::default());
    {
        let generator = Arc::clone(generator);
        let progress = Arc::clone(&progress);
        let counters = Arc::clone(&counters);
        let job_cancel = cancel.clone();
        for_each_parallel(eligible, workers, cancel, move |item| {
            let generator = Arc::clone(&generator);
            let progress = Arc::clone(&progress);
            let counters = Arc::clone(&counters);
            let cancel = job_cancel.clone();
            async move {
                match generator
                    .generate_all_widths(&item, LockMode::Wait, &cancel)
                    .await
                {
                    Ok(outcomes) => {
                        let fresh = outcomes
                            .iter()
                            .any(|o| matches!(o, GenerationOutcome::Generated(_)));
                        let counter = if fresh {
                            &counters.generated
                        } else {
                            &counters.existing
                        };
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(GenerationError::Cancelled) => return,
                    Err(e) => {
                        counters.failed.fetch_add(1, Ordering::SeqCst);
                        tracing::error!(
                            item_id = %item.id,
                            name = %item.name,
                            error = %e,
                            "Error creating trickplay files",
                        );
                    }
                }
                progress.complete_one();
            }
        })
        .await;
    }

    let summary = GenerateSummary {
        total,
        generated: counters.generated.load(Ordering::SeqCst),
        existing: counters.existing.load(Ordering::SeqCst),
        failed: counters.failed.load(Ordering::SeqCst),
    };
    tracing::info!(?summary, cancelled = cancel.is_cancelled(), "Trickplay generation finished");
    Ok(summary)
}
