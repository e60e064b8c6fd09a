//! Frame extraction process runner.
//!
//! Spawns the extractor, then waits on three things at once: process exit,
//! a periodic liveness poll, and cancellation. The liveness poll counts the
//! frames in the output directory; a poll period with no new frames while
//! the process is still running means it hung, and it is killed.
//!
//! The child is created with `kill_on_drop(true)`, so if this future is
//! dropped the process goes with it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use trickplay_core::ffmpeg::is_frame_file;

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("failed to start extraction process: {0}")]
    Spawn(std::io::Error),

    #[error("extraction stalled: no new frames within {0:?}")]
    Stalled(Duration),

    #[error("extraction process failed (exit code {exit_code:?})")]
    Failed { exit_code: Option<i32> },

    #[error("extraction cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Knobs for one extraction run.
#[derive(Debug, Clone, Copy)]
pub struct RunSettings {
    /// Liveness poll period.
    pub stall_poll: Duration,
    /// Scheduling niceness applied to the child (unix only, 0 leaves it alone).
    pub niceness: i32,
}

/// Run `command` to completion and return the frames it wrote to
/// `output_dir`, in lexicographic (and therefore sequential) order.
pub async fn run_extraction(
    mut command: Command,
    output_dir: &Path,
    settings: RunSettings,
    cancel: &CancellationToken,
) -> Result<Vec<PathBuf>, ExtractionError> {
    if cancel.is_cancelled() {
        return Err(ExtractionError::Cancelled);
    }

    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let mut child = command.spawn().map_err(ExtractionError::Spawn)?;
    apply_niceness(&child, settings.niceness);

    // ffmpeg runs with `-v quiet`; stderr is drained so a chatty extractor
    // never blocks on a full pipe.
    let stderr = child.stderr.take();
    let stderr_task = tokio::spawn(async move {
        if let Some(mut stderr) = stderr {
            let _ = tokio::io::copy(&mut stderr, &mut tokio::io::sink()).await;
        }
    });

    let mut poll = tokio::time::interval_at(
        tokio::time::Instant::now() + settings.stall_poll,
        settings.stall_poll,
    );
    let mut last_count = 0usize;

    let outcome = loop {
        tokio::select! {
            status = child.wait() => {
                let status = status?;
                if status.success() {
                    break Ok(());
                }
                break Err(ExtractionError::Failed { exit_code: status.code() });
            }
            _ = poll.tick() => {
                let count = count_frames(output_dir).await?;
                if count <= last_count {
                    tracing::warn!(
                        frames = count,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Extraction made no progress since last poll, killing process",
                    );
                    terminate(&mut child).await;
                    break Err(ExtractionError::Stalled(settings.stall_poll));
                }
                tracing::debug!(frames = count, "Extraction progressing");
                last_count = count;
            }
            _ = cancel.cancelled() => {
                terminate(&mut child).await;
                break Err(ExtractionError::Cancelled);
            }
        }
    };
    stderr_task.abort();
    outcome?;

    tracing::debug!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Extraction process exited",
    );
    Ok(list_frames(output_dir).await?)
}

async fn terminate(child: &mut Child) {
    if let Err(e) = child.kill().await {
        tracing::warn!(error = %e, "Failed to kill extraction process");
    }
}

/// Number of frame files currently in `dir`.
pub async fn count_frames(dir: &Path) -> std::io::Result<usize> {
    Ok(list_frames(dir).await?.len())
}

/// Frame files in `dir`, sorted by name.
pub async fn list_frames(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut frames = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(frames),
        Err(e) => return Err(e),
    };
    while let Some(entry) = entries.next_entry().await? {
        if is_frame_file(&entry.file_name().to_string_lossy()) {
            frames.push(entry.path());
        }
    }
    frames.sort();
    Ok(frames)
}

#[cfg(unix)]
fn apply_niceness(child: &Child, niceness: i32) {
    if niceness == 0 {
        return;
    }
    let Some(pid) = child.id() else {
        return;
    };
    // SAFETY: setpriority takes plain integers and touches no memory we own.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, pid as libc::id_t, niceness) };
    if rc != 0 {
        tracing::warn!(
            pid,
            niceness,
            error = %std::io::Error::last_os_error(),
            "Failed to set extraction process priority",
        );
    }
}

#[cfg(not(unix))]
fn apply_niceness(_child: &Child, _niceness: i32) {}
