//! Library file-system monitor notifications.
//!
//! Publishing an artifact writes into directories the host library may be
//! watching. Each publish is bracketed by [`LibraryMonitor::change_beginning`]
//! and [`LibraryMonitor::change_complete`] so the watcher can ignore it.

use std::path::Path;

pub trait LibraryMonitor: Send + Sync {
    fn change_beginning(&self, path: &Path);
    fn change_complete(&self, path: &Path);
}

/// Default monitor: no watcher to notify, just a debug trace.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMonitor;

impl LibraryMonitor for TracingMonitor {
    fn change_beginning(&self, path: &Path) {
        tracing::debug!(path = %path.display(), "Library change beginning");
    }

    fn change_complete(&self, path: &Path) {
        tracing::debug!(path = %path.display(), "Library change complete");
    }
}
