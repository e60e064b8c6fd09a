//! Fixtures shared by the pipeline tests.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use trickplay_core::config::TrickplayConfig;
use trickplay_core::media::{MediaItem, VideoType};
use trickplay_core::types::ItemId;

use crate::monitor::LibraryMonitor;

/// Write an executable `/bin/sh` script into `dir` and return its path.
pub fn write_script(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(format!("script-{}.sh", uuid::Uuid::new_v4().simple()));
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod script");
    path
}

/// A stand-in for ffmpeg: appends a line to `calls` on every run, then
/// writes one JPEG-named file per entry in `frame_sizes` into the
/// directory of its last argument (the output pattern).
pub fn fake_ffmpeg(dir: &Path, calls: &Path, frame_sizes: &[usize], delay_secs: f32) -> PathBuf {
    let mut body = format!(
        "echo run >> '{}'\nfor last; do :; done\nout=$(dirname \"$last\")\nsleep {delay_secs}\n",
        calls.display()
    );
    for (i, size) in frame_sizes.iter().enumerate() {
        body.push_str(&format!(
            "head -c {size} /dev/zero > \"$out/img_{:08}.jpg\"\n",
            i + 1
        ));
    }
    write_script(dir, &body)
}

/// How many times a [`fake_ffmpeg`] script ran.
pub fn call_count(calls: &Path) -> usize {
    std::fs::read_to_string(calls)
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

/// Eligible two-minute item backed by a real file under `dir/media`.
pub fn media_item(dir: &Path, name: &str) -> MediaItem {
    let media = dir.join("media");
    std::fs::create_dir_all(&media).expect("create media dir");
    let path = media.join(format!("{name}.mp4"));
    std::fs::write(&path, b"not really a video").expect("write source");
    let id = ItemId::from_path(&path);
    MediaItem {
        id,
        name: name.to_string(),
        path,
        container: None,
        video_type: VideoType::File,
        is_shortcut: false,
        is_virtual: false,
        runtime: Some(Duration::from_secs(120)),
        date_modified: chrono::DateTime::from_timestamp(1_700_000_000, 0).expect("timestamp"),
        metadata_dir: dir.join("data").join("metadata").join(id.to_string()),
    }
}

pub fn config(dir: &Path, ffmpeg: &Path) -> TrickplayConfig {
    TrickplayConfig {
        interval_ms: 10_000,
        widths: vec![320],
        stall_poll: Duration::from_secs(5),
        process_niceness: 0,
        ffmpeg_path: ffmpeg.to_path_buf(),
        media_root: dir.join("media"),
        data_dir: dir.join("data"),
        ..TrickplayConfig::default()
    }
}

/// Records every notification in order.
#[derive(Default)]
pub struct RecordingMonitor {
    pub events: Mutex<Vec<(String, PathBuf)>>,
}

impl LibraryMonitor for RecordingMonitor {
    fn change_beginning(&self, path: &Path) {
        self.events
            .lock()
            .unwrap()
            .push(("beginning".into(), path.to_path_buf()));
    }

    fn change_complete(&self, path: &Path) {
        self.events
            .lock()
            .unwrap()
            .push(("complete".into(), path.to_path_buf()));
    }
}
