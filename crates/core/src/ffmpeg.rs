//! FFmpeg/FFprobe command utilities.
//!
//! Builds the frame-extraction command line and probes source runtime.
//! Process lifecycle (watchdog, cancellation, niceness) belongs to the
//! pipeline; this module only describes what to run.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::types::Width;

/// File-name prefix of every frame ffmpeg writes into the scratch directory.
pub const FRAME_PREFIX: &str = "img_";

/// Extension of every extracted frame.
pub const FRAME_EXTENSION: &str = "jpg";

/// Error type for FFmpeg/FFprobe operations.
#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error("ffprobe/ffmpeg binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffprobe/ffmpeg execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("video file not found: {0}")]
    VideoNotFound(String),
}

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

/// Top-level ffprobe JSON output (`-print_format json -show_format -show_streams`).
#[derive(Debug, Deserialize)]
pub struct FfprobeOutput {
    #[serde(default)]
    pub streams: Vec<FfprobeStream>,
    pub format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
pub struct FfprobeStream {
    pub codec_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FfprobeFormat {
    pub duration: Option<String>,
    /// Comma-separated demuxer names, e.g. `"matroska,webm"`.
    pub format_name: Option<String>,
}

/// Run `ffprobe` on a video file and return the parsed JSON output.
pub async fn probe_video(ffprobe: &Path, path: &Path) -> Result<FfprobeOutput, FfmpegError> {
    if !path.exists() {
        return Err(FfmpegError::VideoNotFound(
            path.to_string_lossy().to_string(),
        ));
    }

    let output = tokio::process::Command::new(ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(FfmpegError::NotFound)?;

    if !output.status.success() {
        return Err(FfmpegError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    parse_probe_output(&output.stdout)
}

pub fn parse_probe_output(stdout: &[u8]) -> Result<FfprobeOutput, FfmpegError> {
    serde_json::from_slice::<FfprobeOutput>(stdout).map_err(|e| {
        FfmpegError::ParseError(format!("{e}: {}", String::from_utf8_lossy(stdout)))
    })
}

fn first_video_stream(probe: &FfprobeOutput) -> Option<&FfprobeStream> {
    probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
}

/// Runtime from ffprobe output: format duration first, then the first
/// video stream. `None` when neither parses to a positive value.
pub fn parse_duration(probe: &FfprobeOutput) -> Option<Duration> {
    let stream_duration = first_video_stream(probe).and_then(|s| s.duration.as_deref());
    [probe.format.duration.as_deref(), stream_duration]
        .into_iter()
        .flatten()
        .filter_map(|d| d.trim().parse::<f64>().ok())
        .find(|secs| secs.is_finite() && *secs > 0.0)
        .map(Duration::from_secs_f64)
}

/// Width and height of the first video stream.
pub fn parse_resolution(probe: &FfprobeOutput) -> Option<(u32, u32)> {
    let stream = first_video_stream(probe)?;
    Some((stream.width?, stream.height?))
}

/// Demuxer to force with `-f` for a given container name.
///
/// Only containers whose probe name differs from what ffmpeg would guess
/// from the extension get a hint; everything else is left to ffmpeg.
pub fn input_format_for_container(container: &str) -> Option<&'static str> {
    let first = container.split(',').next()?.trim().to_ascii_lowercase();
    match first.as_str() {
        "mkv" | "matroska" => Some("matroska"),
        "ts" | "m2ts" | "mts" | "mpegts" => Some("mpegts"),
        "mpeg" | "mpg" | "vob" => Some("mpeg"),
        "wmv" | "asf" => Some("asf"),
        "m4v" => Some("mov"),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Frame extraction
// ---------------------------------------------------------------------------

/// One extraction run: sample `source` every `interval_ms`, scale to at most
/// `width` pixels wide, write JPEGs into `output_dir`.
#[derive(Debug, Clone)]
pub struct ExtractionCommand {
    pub ffmpeg: PathBuf,
    pub source: PathBuf,
    pub container: Option<String>,
    pub output_dir: PathBuf,
    pub width: Width,
    pub interval_ms: u32,
    /// 0 lets ffmpeg pick.
    pub threads: u32,
}

impl ExtractionCommand {
    /// Output pattern handed to the image2 muxer.
    pub fn output_pattern(&self) -> PathBuf {
        self.output_dir
            .join(format!("{FRAME_PREFIX}%08d.{FRAME_EXTENSION}"))
    }

    /// Video filter chain: one frame per interval, downscale only, even height.
    pub fn video_filter(&self) -> String {
        format!(
            "fps=1/{},scale=min(iw\\,{}):trunc(ow/dar/2)*2",
            format_seconds(self.interval_ms),
            self.width
        )
    }

    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if let Some(format) = self
            .container
            .as_deref()
            .and_then(input_format_for_container)
        {
            args.push("-f".into());
            args.push(format.into());
        }
        args.push("-i".into());
        args.push(self.source.clone().into_os_string());
        args.push("-threads".into());
        args.push(self.threads.to_string().into());
        args.push("-v".into());
        args.push("quiet".into());
        args.push("-filter:v".into());
        args.push(self.video_filter().into());
        args.push("-f".into());
        args.push("image2".into());
        args.push(self.output_pattern().into_os_string());
        args
    }

    /// A ready-to-spawn command. Callers attach stdio and lifecycle options.
    pub fn to_command(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.ffmpeg);
        command.args(self.args());
        command
    }
}

/// Whether `name` looks like a frame written by [`ExtractionCommand`].
pub fn is_frame_file(name: &str) -> bool {
    name.starts_with(FRAME_PREFIX)
        && Path::new(name)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(FRAME_EXTENSION))
}

/// `10000` -> `"10"`, `1500` -> `"1.5"`, `250` -> `"0.25"`.
fn format_seconds(ms: u32) -> String {
    let whole = ms / 1000;
    let frac = ms % 1000;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{frac:03}");
    format!("{whole}.{}", frac.trim_end_matches('0'))
}
