//! Trickplay settings loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::StoragePolicy;
use crate::error::CoreError;
use crate::types::Width;

/// How the scan hook waits for generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanBehavior {
    /// Generate inline; the scan does not finish until artifacts exist.
    Blocking,
    /// Queue generation on a background task and return immediately.
    NonBlocking,
}

impl FromStr for ScanBehavior {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blocking" => Ok(Self::Blocking),
            "non_blocking" | "nonblocking" => Ok(Self::NonBlocking),
            other => Err(CoreError::Validation(format!(
                "TRICKPLAY_SCAN_BEHAVIOR must be `blocking` or `non_blocking`, got `{other}`"
            ))),
        }
    }
}

/// Every knob the pipeline, the serving layer and the bulk tasks read.
///
/// Built once at startup and shared by `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrickplayConfig {
    pub on_demand_generation: bool,
    pub extract_during_scan: bool,
    pub scan_behavior: ScanBehavior,
    pub save_with_media: bool,
    pub interval_ms: u32,
    /// Target widths, ascending and de-duplicated.
    pub widths: Vec<Width>,
    pub parallel_processes: usize,
    /// ffmpeg `-threads`; 0 lets ffmpeg decide.
    pub process_threads: u32,
    pub process_niceness: i32,
    pub stall_poll: Duration,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub media_root: PathBuf,
    pub data_dir: PathBuf,
}

impl Default for TrickplayConfig {
    fn default() -> Self {
        Self {
            on_demand_generation: true,
            extract_during_scan: true,
            scan_behavior: ScanBehavior::NonBlocking,
            save_with_media: false,
            interval_ms: 10_000,
            widths: vec![320],
            parallel_processes: 1,
            process_threads: 0,
            process_niceness: 10,
            stall_poll: Duration::from_secs(30),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            media_root: PathBuf::from("media"),
            data_dir: PathBuf::from("data"),
        }
    }
}

impl TrickplayConfig {
    /// Load from the process environment.
    ///
    /// | Env Var                         | Default        |
    /// |---------------------------------|----------------|
    /// | `TRICKPLAY_ON_DEMAND`           | `true`         |
    /// | `TRICKPLAY_EXTRACT_DURING_SCAN` | `true`         |
    /// | `TRICKPLAY_SCAN_BEHAVIOR`       | `non_blocking` |
    /// | `TRICKPLAY_SAVE_WITH_MEDIA`     | `false`        |
    /// | `TRICKPLAY_INTERVAL_MS`         | `10000`        |
    /// | `TRICKPLAY_WIDTHS`              | `320`          |
    /// | `TRICKPLAY_PARALLEL_PROCESSES`  | `1`            |
    /// | `TRICKPLAY_PROCESS_THREADS`     | `0`            |
    /// | `TRICKPLAY_PROCESS_NICENESS`    | `10`           |
    /// | `TRICKPLAY_STALL_POLL_SECS`     | `30`           |
    /// | `TRICKPLAY_FFMPEG_PATH`         | `ffmpeg`       |
    /// | `TRICKPLAY_FFPROBE_PATH`        | `ffprobe`      |
    /// | `TRICKPLAY_MEDIA_ROOT`          | `media`        |
    /// | `TRICKPLAY_DATA_DIR`            | `data`         |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup. Unset keys take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let on_demand_generation = match get("TRICKPLAY_ON_DEMAND") {
            Some(v) => parse_bool("TRICKPLAY_ON_DEMAND", &v)?,
            None => defaults.on_demand_generation,
        };
        let extract_during_scan = match get("TRICKPLAY_EXTRACT_DURING_SCAN") {
            Some(v) => parse_bool("TRICKPLAY_EXTRACT_DURING_SCAN", &v)?,
            None => defaults.extract_during_scan,
        };
        let scan_behavior = match get("TRICKPLAY_SCAN_BEHAVIOR") {
            Some(v) => v.parse()?,
            None => defaults.scan_behavior,
        };
        let save_with_media = match get("TRICKPLAY_SAVE_WITH_MEDIA") {
            Some(v) => parse_bool("TRICKPLAY_SAVE_WITH_MEDIA", &v)?,
            None => defaults.save_with_media,
        };
        let interval_ms = match get("TRICKPLAY_INTERVAL_MS") {
            Some(v) => parse_num("TRICKPLAY_INTERVAL_MS", &v)?,
            None => defaults.interval_ms,
        };
        let widths = match get("TRICKPLAY_WIDTHS") {
            Some(v) => parse_widths(&v)?,
            None => defaults.widths,
        };
        let parallel_processes = match get("TRICKPLAY_PARALLEL_PROCESSES") {
            Some(v) => parse_num::<i64>("TRICKPLAY_PARALLEL_PROCESSES", &v)?.max(1) as usize,
            None => defaults.parallel_processes,
        };
        let process_threads = match get("TRICKPLAY_PROCESS_THREADS") {
            Some(v) => parse_num("TRICKPLAY_PROCESS_THREADS", &v)?,
            None => defaults.process_threads,
        };
        let process_niceness = match get("TRICKPLAY_PROCESS_NICENESS") {
            Some(v) => parse_num("TRICKPLAY_PROCESS_NICENESS", &v)?,
            None => defaults.process_niceness,
        };
        let stall_poll = match get("TRICKPLAY_STALL_POLL_SECS") {
            Some(v) => Duration::from_secs(parse_num("TRICKPLAY_STALL_POLL_SECS", &v)?),
            None => defaults.stall_poll,
        };

        let config = Self {
            on_demand_generation,
            extract_during_scan,
            scan_behavior,
            save_with_media,
            interval_ms,
            widths,
            parallel_processes,
            process_threads,
            process_niceness,
            stall_poll,
            ffmpeg_path: get("TRICKPLAY_FFMPEG_PATH").map_or(defaults.ffmpeg_path, PathBuf::from),
            ffprobe_path: get("TRICKPLAY_FFPROBE_PATH")
                .map_or(defaults.ffprobe_path, PathBuf::from),
            media_root: get("TRICKPLAY_MEDIA_ROOT").map_or(defaults.media_root, PathBuf::from),
            data_dir: get("TRICKPLAY_DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.interval_ms == 0 {
            return Err(CoreError::Validation(
                "TRICKPLAY_INTERVAL_MS must be greater than zero".into(),
            ));
        }
        if self.widths.is_empty() {
            return Err(CoreError::Validation(
                "TRICKPLAY_WIDTHS must list at least one width".into(),
            ));
        }
        if self.stall_poll.is_zero() {
            return Err(CoreError::Validation(
                "TRICKPLAY_STALL_POLL_SECS must be greater than zero".into(),
            ));
        }
        if !(-20..=19).contains(&self.process_niceness) {
            return Err(CoreError::Validation(format!(
                "TRICKPLAY_PROCESS_NICENESS must be between -20 and 19, got {}",
                self.process_niceness
            )));
        }
        Ok(())
    }

    pub fn storage_policy(&self) -> StoragePolicy {
        StoragePolicy::from_save_with_media(self.save_with_media)
    }

    /// Per-item metadata directories live here.
    pub fn metadata_root(&self) -> PathBuf {
        self.data_dir.join("metadata")
    }

    /// Scratch space for extraction runs.
    pub fn scratch_root(&self) -> PathBuf {
        self.data_dir.join("scratch")
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, CoreError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(CoreError::Validation(format!(
            "{key} must be a boolean, got `{other}`"
        ))),
    }
}

fn parse_num<T: FromStr>(key: &str, value: &str) -> Result<T, CoreError> {
    value
        .trim()
        .parse()
        .map_err(|_| CoreError::Validation(format!("{key} must be a number, got `{value}`")))
}

fn parse_widths(value: &str) -> Result<Vec<Width>, CoreError> {
    let mut widths = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match s.parse::<Width>() {
            Ok(w) if w > 0 => Ok(w),
            _ => Err(CoreError::Validation(format!(
                "TRICKPLAY_WIDTHS entries must be positive integers, got `{s}`"
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    widths.sort_unstable();
    widths.dedup();
    Ok(widths)
}
