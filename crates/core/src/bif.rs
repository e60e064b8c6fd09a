//! BIF (Base Index Frame) container codec.
//!
//! A BIF holds evenly spaced thumbnails plus an index so a player can show
//! a preview for any seek position without touching the video. Layout,
//! with every integer little-endian:
//!
//! ```text
//! 0x00  magic          8 bytes   89 42 49 46 0D 0A 1A 0A
//! 0x08  version        u32       0
//! 0x0C  image count    u32       N
//! 0x10  interval (ms)  u32       0 is read as 1000
//! 0x14  reserved       44 bytes  zero
//! 0x40  index          N entries { frame: u32, offset: u32 }
//!                      1 sentinel { 0xFFFFFFFF, end-of-data offset }
//!       images         back to back, in index order
//! ```
//!
//! A frame's length is implicit: the next entry's offset minus its own.

use std::path::PathBuf;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Magic number at the start of every BIF.
pub const BIF_MAGIC: [u8; 8] = [0x89, 0x42, 0x49, 0x46, 0x0d, 0x0a, 0x1a, 0x0a];

/// The only container version this codec reads or writes.
pub const BIF_VERSION: u32 = 0;

/// Fixed header size including the reserved region.
pub const HEADER_LEN: usize = 64;

/// Size of one index entry.
pub const INDEX_ENTRY_LEN: usize = 8;

/// Frame number of the terminating index entry.
pub const SENTINEL: u32 = u32::MAX;

/// Interval substituted when a file declares 0 ms.
pub const DEFAULT_INTERVAL_MS: u32 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum BifError {
    #[error("corrupt BIF: {0}")]
    CorruptFormat(String),

    #[error("unsupported BIF version {0} (expected 0)")]
    UnsupportedVersion(u32),

    #[error("BIF of {0} bytes exceeds the 32-bit offset range")]
    TooLarge(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One index entry as stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub frame: u32,
    pub offset: u32,
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode in-memory images into a complete BIF stream.
pub fn encode<B: AsRef<[u8]>>(images: &[B], interval_ms: u32) -> Result<Vec<u8>, BifError> {
    let sizes: Vec<u64> = images.iter().map(|i| i.as_ref().len() as u64).collect();
    let mut out = encode_prelude(&sizes, interval_ms)?;
    for image in images {
        out.extend_from_slice(image.as_ref());
    }
    Ok(out)
}

/// Build the header and index for images of the given sizes.
///
/// The image payload must follow immediately, in the same order.
pub fn encode_prelude(sizes: &[u64], interval_ms: u32) -> Result<Vec<u8>, BifError> {
    let prelude_len = HEADER_LEN + (sizes.len() + 1) * INDEX_ENTRY_LEN;
    let total = prelude_len as u64 + sizes.iter().sum::<u64>();
    if total > u64::from(u32::MAX) {
        return Err(BifError::TooLarge(total));
    }
    let count = sizes.len() as u32;

    let mut out = Vec::with_capacity(prelude_len);
    out.extend_from_slice(&BIF_MAGIC);
    out.extend_from_slice(&BIF_VERSION.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(&interval_ms.to_le_bytes());
    out.resize(HEADER_LEN, 0);

    let mut offset = prelude_len as u64;
    for (frame, size) in sizes.iter().enumerate() {
        push_entry(&mut out, frame as u32, offset as u32);
        offset += size;
    }
    push_entry(&mut out, SENTINEL, offset as u32);

    Ok(out)
}

fn push_entry(out: &mut Vec<u8>, frame: u32, offset: u32) {
    out.extend_from_slice(&frame.to_le_bytes());
    out.extend_from_slice(&offset.to_le_bytes());
}

/// Stream a BIF built from image files on disk into `writer`.
///
/// Frames are copied one at a time, so memory use does not grow with the
/// length of the video. Returns the number of bytes written.
pub async fn write_from_files<W>(
    writer: &mut W,
    frames: &[PathBuf],
    interval_ms: u32,
) -> Result<u64, BifError>
where
    W: AsyncWrite + Unpin,
{
    let mut sizes = Vec::with_capacity(frames.len());
    for frame in frames {
        sizes.push(tokio::fs::metadata(frame).await?.len());
    }

    let prelude = encode_prelude(&sizes, interval_ms)?;
    writer.write_all(&prelude).await?;
    let mut written = prelude.len() as u64;

    for (frame, expected) in frames.iter().zip(&sizes) {
        let mut file = tokio::fs::File::open(frame).await?;
        let copied = tokio::io::copy(&mut file, writer).await?;
        if copied != *expected {
            return Err(BifError::CorruptFormat(format!(
                "{} changed size while encoding ({expected} -> {copied} bytes)",
                frame.display()
            )));
        }
        written += copied;
    }

    writer.flush().await?;
    Ok(written)
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// A decoded BIF.
///
/// Holds the original buffer; frames are handed out as cheap slices of it.
#[derive(Debug, Clone)]
pub struct Bif {
    data: Bytes,
    version: u32,
    interval_ms: u32,
    /// Every entry including the trailing sentinel.
    index: Vec<IndexEntry>,
}

impl Bif {
    /// Parse and validate a BIF stream.
    pub fn decode(data: impl Into<Bytes>) -> Result<Self, BifError> {
        let data = data.into();

        if data.len() < HEADER_LEN {
            return Err(BifError::CorruptFormat(format!(
                "truncated header ({} bytes)",
                data.len()
            )));
        }
        if data[..BIF_MAGIC.len()] != BIF_MAGIC {
            return Err(BifError::CorruptFormat("magic number mismatch".into()));
        }

        let version = read_u32(&data, 8);
        if version != BIF_VERSION {
            return Err(BifError::UnsupportedVersion(version));
        }

        let count = read_u32(&data, 12) as usize;
        let interval_ms = match read_u32(&data, 16) {
            0 => DEFAULT_INTERVAL_MS,
            ms => ms,
        };

        let index_end = count
            .checked_add(1)
            .and_then(|n| n.checked_mul(INDEX_ENTRY_LEN))
            .and_then(|n| n.checked_add(HEADER_LEN))
            .filter(|end| *end <= data.len())
            .ok_or_else(|| {
                BifError::CorruptFormat(format!("index for {count} images is truncated"))
            })?;

        let index: Vec<IndexEntry> = (0..=count)
            .map(|i| {
                let at = HEADER_LEN + i * INDEX_ENTRY_LEN;
                IndexEntry {
                    frame: read_u32(&data, at),
                    offset: read_u32(&data, at + 4),
                }
            })
            .collect();

        validate_index(&index, index_end, data.len())?;

        Ok(Self {
            data,
            version,
            interval_ms,
            index,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Sample interval, already normalized (never 0).
    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    /// Number of images (the sentinel is not counted).
    pub fn len(&self) -> usize {
        self.index.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Full index including the sentinel entry.
    pub fn index(&self) -> &[IndexEntry] {
        &self.index
    }

    /// Size of the underlying buffer.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Image bytes for the `slot`-th index entry.
    pub fn frame(&self, slot: usize) -> Option<Bytes> {
        if slot >= self.len() {
            return None;
        }
        let start = self.index[slot].offset as usize;
        let end = self.index[slot + 1].offset as usize;
        Some(self.data.slice(start..end))
    }

    /// Image to show at `position_ms` into the video.
    ///
    /// `None` is a normal answer for positions past the last sample or for
    /// frame numbers missing from the index.
    pub fn frame_at(&self, position_ms: u64) -> Option<Bytes> {
        let frame = u32::try_from(position_ms / u64::from(self.interval_ms)).ok()?;
        let slot = self.index[..self.len()]
            .binary_search_by_key(&frame, |entry| entry.frame)
            .ok()?;
        self.frame(slot)
    }

    /// All images in index order.
    pub fn frames(&self) -> impl Iterator<Item = Bytes> + '_ {
        (0..self.len()).filter_map(|slot| self.frame(slot))
    }
}

fn validate_index(index: &[IndexEntry], data_start: usize, data_len: usize) -> Result<(), BifError> {
    let (sentinel, entries) = index
        .split_last()
        .ok_or_else(|| BifError::CorruptFormat("empty index".into()))?;

    if sentinel.frame != SENTINEL {
        return Err(BifError::CorruptFormat(format!(
            "index does not end with a sentinel (found frame {})",
            sentinel.frame
        )));
    }

    let mut previous_offset = data_start;
    for (i, entry) in index.iter().enumerate() {
        let offset = entry.offset as usize;
        if offset < previous_offset {
            return Err(BifError::CorruptFormat(format!(
                "index entry {i} offset {offset} precedes {previous_offset}"
            )));
        }
        previous_offset = offset;
    }
    if sentinel.offset as usize > data_len {
        return Err(BifError::CorruptFormat(format!(
            "end-of-data offset {} is past the end of a {data_len}-byte buffer",
            sentinel.offset
        )));
    }

    if entries.windows(2).any(|w| w[0].frame >= w[1].frame) {
        return Err(BifError::CorruptFormat(
            "frame numbers are not strictly ascending".into(),
        ));
    }

    Ok(())
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn blobs(sizes: &[usize]) -> Vec<Vec<u8>> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, size)| vec![i as u8 + 1; *size])
            .collect()
    }

    #[test]
    fn round_trip_preserves_frames_and_interval() {
        let images = blobs(&[10, 0, 33, 7]);
        let decoded = Bif::decode(encode(&images, 2500).unwrap()).unwrap();

        assert_eq!(decoded.version(), 0);
        assert_eq!(decoded.interval_ms(), 2500);
        assert_eq!(decoded.len(), images.len());
        for (frame, original) in decoded.frames().zip(&images) {
            assert_eq!(frame.as_ref(), original.as_slice());
        }
    }

    #[test]
    fn zero_interval_is_read_as_default() {
        let decoded = Bif::decode(encode(&blobs(&[4]), 0).unwrap()).unwrap();
        assert_eq!(decoded.interval_ms(), DEFAULT_INTERVAL_MS);
    }

    #[test]
    fn three_frame_layout_matches_expected_offsets() {
        let stream = encode(&blobs(&[100, 150, 120]), 10_000).unwrap();
        assert_eq!(stream.len(), 64 + 4 * 8 + 370);
        assert_eq!(stream.len(), 466);

        let decoded = Bif::decode(stream).unwrap();
        let offsets: Vec<u32> = decoded.index().iter().map(|e| e.offset).collect();
        assert_eq!(offsets, vec![96, 196, 346, 466]);
        assert_eq!(decoded.index()[3].frame, SENTINEL);
        assert_eq!(decoded.frame(0).unwrap().len(), 100);
        assert_eq!(decoded.frame(1).unwrap().len(), 150);
        assert_eq!(decoded.frame(2).unwrap().len(), 120);
    }

    #[test]
    fn header_fields_are_little_endian() {
        let stream = encode(&blobs(&[1, 1]), 0x0102_0304).unwrap();
        assert_eq!(&stream[..8], &BIF_MAGIC);
        assert_eq!(&stream[8..12], &[0, 0, 0, 0]);
        assert_eq!(&stream[12..16], &[2, 0, 0, 0]);
        assert_eq!(&stream[16..20], &[0x04, 0x03, 0x02, 0x01]);
        assert!(stream[20..64].iter().all(|b| *b == 0));
        // Second index entry: frame 1 at offset 64 + 3 * 8 + 1 = 89.
        assert_eq!(&stream[72..80], &[1, 0, 0, 0, 89, 0, 0, 0]);
        // Sentinel.
        assert_eq!(&stream[80..84], &[0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn offsets_increase_and_sentinel_marks_end() {
        let stream = encode(&blobs(&[5, 9, 1, 12, 3]), 1000).unwrap();
        let len = stream.len();
        let decoded = Bif::decode(stream).unwrap();
        let index = decoded.index();
        assert!(index.windows(2).all(|w| w[0].offset < w[1].offset));
        assert_eq!(index.last().unwrap().offset as usize, len);
    }

    #[test]
    fn position_lookup_uses_interval() {
        let decoded = Bif::decode(encode(&blobs(&[3, 3, 3, 3, 3]), 1000).unwrap()).unwrap();
        assert_eq!(decoded.frame_at(2500).unwrap().as_ref(), &[3, 3, 3]);
        assert_eq!(decoded.frame_at(0).unwrap().as_ref(), &[1, 1, 1]);
        assert_eq!(decoded.frame_at(4999).unwrap().as_ref(), &[5, 5, 5]);
        assert!(decoded.frame_at(5000).is_none());
        assert!(decoded.frame_at(u64::MAX).is_none());
    }

    #[test]
    fn lookup_skips_gaps_in_frame_numbers() {
        let mut stream = encode(&blobs(&[2, 2]), 1000).unwrap();
        // Renumber the second frame from 1 to 3.
        stream[72..76].copy_from_slice(&3u32.to_le_bytes());
        let decoded = Bif::decode(stream).unwrap();
        assert!(decoded.frame_at(1500).is_none());
        assert_eq!(decoded.frame_at(3100).unwrap().as_ref(), &[2, 2]);
    }

    #[test]
    fn empty_container_is_valid() {
        let stream = encode::<Vec<u8>>(&[], 1000).unwrap();
        assert_eq!(stream.len(), 72);
        let decoded = Bif::decode(stream).unwrap();
        assert!(decoded.is_empty());
        assert!(decoded.frame_at(0).is_none());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut stream = encode(&blobs(&[1]), 1000).unwrap();
        stream[1] = b'X';
        assert_matches!(Bif::decode(stream), Err(BifError::CorruptFormat(_)));
    }

    #[test]
    fn rejects_unknown_version() {
        let mut stream = encode(&blobs(&[1]), 1000).unwrap();
        stream[8..12].copy_from_slice(&1u32.to_le_bytes());
        assert_matches!(Bif::decode(stream), Err(BifError::UnsupportedVersion(1)));
    }

    #[test]
    fn rejects_truncated_streams() {
        let stream = encode(&blobs(&[10, 10]), 1000).unwrap();
        assert_matches!(
            Bif::decode(stream[..40].to_vec()),
            Err(BifError::CorruptFormat(_))
        );
        assert_matches!(
            Bif::decode(stream[..70].to_vec()),
            Err(BifError::CorruptFormat(_))
        );
        // Index intact but image data cut short.
        assert_matches!(
            Bif::decode(stream[..stream.len() - 1].to_vec()),
            Err(BifError::CorruptFormat(_))
        );
    }

    #[test]
    fn rejects_absurd_image_count() {
        let mut stream = encode(&blobs(&[1]), 1000).unwrap();
        stream[12..16].copy_from_slice(&u32::MAX.to_le_bytes());
        assert_matches!(Bif::decode(stream), Err(BifError::CorruptFormat(_)));
    }

    #[test]
    fn rejects_missing_sentinel() {
        let mut stream = encode(&blobs(&[1, 1]), 1000).unwrap();
        stream[80..84].copy_from_slice(&2u32.to_le_bytes());
        assert_matches!(Bif::decode(stream), Err(BifError::CorruptFormat(_)));
    }

    #[test]
    fn rejects_descending_offsets() {
        let mut stream = encode(&blobs(&[4, 4]), 1000).unwrap();
        // Point frame 1 before frame 0.
        stream[76..80].copy_from_slice(&10u32.to_le_bytes());
        assert_matches!(Bif::decode(stream), Err(BifError::CorruptFormat(_)));
    }

    #[tokio::test]
    async fn file_writer_matches_in_memory_encoder() {
        let dir = tempfile::tempdir().unwrap();
        let images = blobs(&[12, 40, 3]);
        let mut paths = Vec::new();
        for (i, image) in images.iter().enumerate() {
            let path = dir.path().join(format!("img_{:08}.jpg", i + 1));
            std::fs::write(&path, image).unwrap();
            paths.push(path);
        }

        let mut out = Vec::new();
        let written = write_from_files(&mut out, &paths, 10_000).await.unwrap();

        assert_eq!(written as usize, out.len());
        assert_eq!(out, encode(&images, 10_000).unwrap());
    }
}
