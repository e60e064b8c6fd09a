//! Preview width selection.

use trickplay_core::types::Width;

/// Pick the preview width for a viewer.
///
/// Starting from the smallest available width, adopt each larger width that
/// fits within `fraction` of the effective pixel width
/// (`screen_width * device_pixel_ratio`). Returns `None` only when no widths
/// are available.
pub fn select_width(
    available: &[Width],
    screen_width: f64,
    device_pixel_ratio: f64,
    fraction: f64,
) -> Option<Width> {
    let mut widths = available.to_vec();
    widths.sort_unstable();
    let (&smallest, rest) = widths.split_first()?;

    let limit = screen_width * device_pixel_ratio * fraction;
    let mut chosen = smallest;
    for &width in rest {
        if f64::from(width) <= limit {
            chosen = width;
        }
    }
    Some(chosen)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_smallest_when_nothing_fits() {
        assert_eq!(select_width(&[160, 320, 640], 1000.0, 1.0, 0.2), Some(160));
    }

    #[test]
    fn largest_fitting_width_wins() {
        assert_eq!(select_width(&[160, 320], 2000.0, 1.0, 0.2), Some(320));
        assert_eq!(select_width(&[640, 160, 320], 1920.0, 2.0, 0.2), Some(640));
    }

    #[test]
    fn limit_is_inclusive() {
        assert_eq!(select_width(&[160, 320], 1600.0, 1.0, 0.2), Some(320));
        assert_eq!(select_width(&[160, 320], 1599.0, 1.0, 0.2), Some(160));
    }

    #[test]
    fn smallest_is_used_even_if_it_exceeds_the_limit() {
        assert_eq!(select_width(&[320], 100.0, 1.0, 0.2), Some(320));
    }

    #[test]
    fn no_widths_means_no_choice() {
        assert_eq!(select_width(&[], 1920.0, 1.0, 0.2), None);
    }
}
