//! Human-readable playback position labels.

const TICKS_PER_SECOND: i64 = 10_000_000;
const TICKS_PER_MINUTE: i64 = 60 * TICKS_PER_SECOND;
const TICKS_PER_HOUR: i64 = 60 * TICKS_PER_MINUTE;

/// Format a position in 100-ns ticks as `h:mm:ss`, or `m:ss` under an hour.
///
/// Negative positions render as `0:00`.
pub fn display_running_time(ticks: i64) -> String {
    let ticks = ticks.max(0);
    let hours = ticks / TICKS_PER_HOUR;
    let minutes = (ticks % TICKS_PER_HOUR) / TICKS_PER_MINUTE;
    let seconds = (ticks % TICKS_PER_MINUTE) / TICKS_PER_SECOND;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}
