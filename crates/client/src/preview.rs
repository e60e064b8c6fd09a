//! Displayable preview frames.

use std::io::Cursor;

use bytes::Bytes;
use trickplay_core::running_time::display_running_time;
use trickplay_core::types::ticks_to_millis;

/// One frame ready to render next to the seek slider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewImage {
    /// Encoded image, shared with the decoded BIF.
    pub data: Bytes,
    /// Pixel size read from the image header, when it parses.
    pub dimensions: Option<(u32, u32)>,
    pub position_ms: u64,
    /// Elapsed time at the slider position, e.g. `1:02:03` or `4:05`.
    pub label: String,
}

impl PreviewImage {
    pub fn new(data: Bytes, position_ticks: i64) -> Self {
        let dimensions = image::ImageReader::new(Cursor::new(data.as_ref()))
            .with_guessed_format()
            .ok()
            .and_then(|reader| reader.into_dimensions().ok());
        Self {
            data,
            dimensions,
            position_ms: ticks_to_millis(position_ticks),
            label: display_running_time(position_ticks),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_jpeg(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image::RgbImage::new(width, height)
        .write_to(&mut out, image::ImageFormat::Jpeg)
        .unwrap();
    out.into_inner()
}
