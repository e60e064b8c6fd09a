use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = DateTime<Utc>;

/// Thumbnail width in pixels. Heights follow the source aspect ratio.
pub type Width = u32;

/// Number of 100-nanosecond ticks in one millisecond.
pub const TICKS_PER_MILLISECOND: i64 = 10_000;

/// Seconds between 0001-01-01T00:00:00Z and the Unix epoch.
const SECONDS_FROM_YEAR_ONE_TO_UNIX_EPOCH: i64 = 62_135_596_800;

/// Stable identity of a library item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub Uuid);

impl ItemId {
    /// Derive an id from a media path so the same file keeps its id
    /// across restarts.
    pub fn from_path(path: &std::path::Path) -> Self {
        Self(Uuid::new_v5(
            &Uuid::NAMESPACE_URL,
            path.to_string_lossy().as_bytes(),
        ))
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Simple (hyphen-less) form keeps directory names short.
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for ItemId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Source-modification fingerprint.
///
/// Rendered as the modification time in 100-ns ticks since year one, so
/// replacing or re-encoding the source always yields a new value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn from_modified(modified: Timestamp) -> Self {
        let seconds = modified.timestamp() + SECONDS_FROM_YEAR_ONE_TO_UNIX_EPOCH;
        let ticks = seconds as i128 * 10_000_000 + (modified.timestamp_subsec_nanos() / 100) as i128;
        Self(ticks.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Convert a position in 100-ns ticks to whole milliseconds.
///
/// Negative positions clamp to zero.
pub fn ticks_to_millis(ticks: i64) -> u64 {
    (ticks.max(0) / TICKS_PER_MILLISECOND) as u64
}
