//! Library-wide batch jobs.
//!
//! - [`generate`]: pre-warm the cache for every eligible video.
//! - [`convert`]: re-publish artifacts found under the inactive storage
//!   policy into the active one, without re-extracting.
//! - [`delete`]: remove every artifact and manifest under both policies.
//!
//! All three fan out over [`for_each_parallel`]: a fixed number of workers
//! claiming items from one shared cursor. Convert and delete are admin
//! actions that write to a [`JobLog`] and never overlap; [`BulkJobs`] owns
//! that coordination.

pub mod convert;
pub mod delete;
pub mod generate;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use trickplay_core::media::MediaItem;

use crate::generator::TrickplayGenerator;
use crate::job_log::JobLog;
use crate::library::MediaLibrary;

/// Message logged when a convert or delete request arrives mid-run.
pub const BUSY_MESSAGE: &str = "Already busy running a task.";

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Receives completion percentages in `0.0..=100.0`.
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: f64);
}

/// Logs progress at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, percent: f64) {
        tracing::info!(percent, "Bulk generation progress");
    }
}

/// Completed-item counter feeding a [`ProgressSink`].
///
/// Counting and reporting happen under one lock, so concurrent completions
/// reach the sink in order and none are lost.
pub struct Progress {
    completed: Mutex<usize>,
    total: usize,
    sink: Arc<dyn ProgressSink>,
}

impl Progress {
    pub fn new(total: usize, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            completed: Mutex::new(0),
            total,
            sink,
        }
    }

    pub fn complete_one(&self) {
        let mut completed = self.completed.lock().unwrap_or_else(|e| e.into_inner());
        *completed += 1;
        let percent = if self.total == 0 {
            100.0
        } else {
            (*completed as f64 / self.total as f64) * 100.0
        };
        self.sink.report(percent.min(100.0));
    }

    pub fn completed(&self) -> usize {
        *self.completed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Worker fan-out
// ---------------------------------------------------------------------------

/// Run `work` once per item on `workers` concurrent tasks.
///
/// Workers claim the next index from a shared cursor, so every item is
/// handled exactly once. Cancellation stops workers from claiming more;
/// items already claimed finish (their own work observes `cancel`).
pub async fn for_each_parallel<F, Fut>(
    items: Vec<MediaItem>,
    workers: usize,
    cancel: &CancellationToken,
    work: F,
) where
    F: Fn(MediaItem) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let items = Arc::new(items);
    let cursor = Arc::new(Mutex::new(0usize));
    let work = Arc::new(work);

    let mut set = JoinSet::new();
    for _ in 0..workers.max(1) {
        let items = Arc::clone(&items);
        let cursor = Arc::clone(&cursor);
        let work = Arc::clone(&work);
        let cancel = cancel.clone();
        set.spawn(async move {
            while !cancel.is_cancelled() {
                let index = {
                    let mut next = cursor.lock().unwrap_or_else(|e| e.into_inner());
                    let index = *next;
                    *next += 1;
                    index
                };
                let Some(item) = items.get(index) else {
                    break;
                };
                work(item.clone()).await;
            }
        });
    }

    while let Some(joined) = set.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "Bulk worker terminated abnormally");
        }
    }
}

// ---------------------------------------------------------------------------
// Convert / delete coordination
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Convert,
    Delete,
}

/// Runs convert and delete jobs one at a time and keeps their logs.
pub struct BulkJobs {
    generator: Arc<TrickplayGenerator>,
    library: Arc<dyn MediaLibrary>,
    convert_log: Arc<JobLog>,
    delete_log: Arc<JobLog>,
    busy: Arc<AtomicBool>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl BulkJobs {
    pub fn new(
        generator: Arc<TrickplayGenerator>,
        library: Arc<dyn MediaLibrary>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            generator,
            library,
            convert_log: Arc::new(JobLog::new()),
            delete_log: Arc::new(JobLog::new()),
            busy: Arc::new(AtomicBool::new(false)),
            shutdown,
            tasks: TaskTracker::new(),
        }
    }

    pub fn log(&self, kind: JobKind) -> &Arc<JobLog> {
        match kind {
            JobKind::Convert => &self.convert_log,
            JobKind::Delete => &self.delete_log,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Start `kind` in the background. Returns `false`, after logging the
    /// refusal to that job's log, if a job is already running.
    pub fn start(&self, kind: JobKind) -> bool {
        let Some(claim) = self.claim(kind) else {
            return false;
        };
        let generator = Arc::clone(&self.generator);
        let library = Arc::clone(&self.library);
        let log = Arc::clone(self.log(kind));
        let cancel = self.shutdown.child_token();
        self.tasks.spawn(async move {
            let _claim = claim;
            run_job(kind, &generator, library.as_ref(), &log, &cancel).await;
        });
        true
    }

    /// Run `kind` on the current task. Same busy rule as [`Self::start`].
    pub async fn run(&self, kind: JobKind) -> bool {
        let Some(_claim) = self.claim(kind) else {
            return false;
        };
        let cancel = self.shutdown.child_token();
        run_job(kind, &self.generator, self.library.as_ref(), self.log(kind), &cancel).await;
        true
    }

    /// Wait for background jobs started so far.
    pub async fn wait_idle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }

    fn claim(&self, kind: JobKind) -> Option<BusyClaim> {
        let log = self.log(kind);
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log.error(BUSY_MESSAGE);
            return None;
        }
        log.clear();
        Some(BusyClaim(Arc::clone(&self.busy)))
    }
}

async fn run_job(
    kind: JobKind,
    generator: &Arc<TrickplayGenerator>,
    library: &dyn MediaLibrary,
    log: &Arc<JobLog>,
    cancel: &CancellationToken,
) {
    match kind {
        JobKind::Convert => {
            convert::convert_all(generator, library, log, cancel).await;
        }
        JobKind::Delete => {
            delete::delete_all(generator, library, log, cancel).await;
        }
    }
}

/// Clears the busy flag when dropped, whatever way the job ends.
struct BusyClaim(Arc<AtomicBool>);

impl Drop for BusyClaim {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;
    use crate::test_support::media_item;

    #[derive(Default)]
    struct Recorder {
        reports: Mutex<Vec<f64>>,
    }

    impl ProgressSink for Recorder {
        fn report(&self, percent: f64) {
            self.reports.lock().unwrap().push(percent);
        }
    }

    #[test]
    fn progress_reports_percent_of_total() {
        let recorder = Arc::new(Recorder::default());
        let progress = Progress::new(4, recorder.clone());
        for _ in 0..4 {
            progress.complete_one();
        }
        assert_eq!(*recorder.reports.lock().unwrap(), vec![25.0, 50.0, 75.0, 100.0]);
        assert_eq!(progress.completed(), 4);
    }

    #[tokio::test]
    async fn every_item_is_claimed_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let items: Vec<_> = (0..25)
            .map(|i| media_item(dir.path(), &format!("item{i:02}")))
            .collect();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let concurrent = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        {
            let seen = Arc::clone(&seen);
            let concurrent = Arc::clone(&concurrent);
            let peak = Arc::clone(&peak);
            for_each_parallel(items.clone(), 4, &CancellationToken::new(), move |item| {
                let seen = Arc::clone(&seen);
                let concurrent = Arc::clone(&concurrent);
                let peak = Arc::clone(&peak);
                async move {
                    let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    seen.lock().unwrap().push(item.name);
                    concurrent.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .await;
        }

        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        let expected: Vec<_> = items.iter().map(|i| i.name.clone()).collect();
        assert_eq!(seen, expected);
        assert!(peak.load(Ordering::SeqCst) <= 4);
    }

    struct SlowLibrary;

    #[async_trait::async_trait]
    impl MediaLibrary for SlowLibrary {
        async fn get_item(
            &self,
            _id: trickplay_core::types::ItemId,
        ) -> Result<Option<MediaItem>, crate::library::LibraryError> {
            Ok(None)
        }

        async fn list_videos(&self) -> Result<Vec<MediaItem>, crate::library::LibraryError> {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(Vec::new())
        }
    }

    fn jobs(dir: &std::path::Path) -> BulkJobs {
        let cfg = crate::test_support::config(dir, std::path::Path::new("/nonexistent/ffmpeg"));
        let generator = Arc::new(TrickplayGenerator::new(
            Arc::new(cfg),
            Arc::new(crate::monitor::TracingMonitor),
        ));
        BulkJobs::new(generator, Arc::new(SlowLibrary), CancellationToken::new())
    }

    #[tokio::test]
    async fn only_one_job_runs_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = jobs(dir.path());

        assert!(jobs.start(JobKind::Convert));
        assert!(jobs.is_busy());
        assert!(!jobs.start(JobKind::Delete));
        assert!(!jobs.run(JobKind::Convert).await);

        let delete_log = jobs.log(JobKind::Delete).snapshot();
        assert_eq!(delete_log.len(), 1);
        assert_eq!(delete_log[0].message, BUSY_MESSAGE);
        assert_eq!(delete_log[0].severity, crate::job_log::Severity::Error);

        jobs.wait_idle().await;
        assert!(!jobs.is_busy());
        // The refused request did not wipe the running job's log.
        assert!(jobs
            .log(JobKind::Convert)
            .snapshot()
            .iter()
            .any(|l| l.message == BUSY_MESSAGE));

        assert!(jobs.run(JobKind::Delete).await);
        let delete_log = jobs.log(JobKind::Delete).snapshot();
        assert!(delete_log.iter().all(|l| l.message != BUSY_MESSAGE));
    }

    #[tokio::test]
    async fn cancelled_fan_out_claims_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let items = vec![media_item(dir.path(), "a"), media_item(dir.path(), "b")];
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        for_each_parallel(items, 2, &cancel, move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
