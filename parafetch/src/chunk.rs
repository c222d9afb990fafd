//! Byte-range partitioning.
//!
//! A resource of `total` bytes is split into ordered, half-open ranges
//! `[start, end)` that cover `[0, total)` exactly once. The last chunk absorbs
//! the remainder of the integer division.

use std::fmt;
use std::ops::Range;

use crate::error::{DownloadError, DownloadResult};

/// A contiguous byte range of the remote resource assigned to one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Position of this chunk in the partition (0-based).
    pub index: usize,
    /// First byte of the range.
    pub start: u64,
    /// One past the last byte of the range.
    pub end: u64,
}

impl Chunk {
    /// Create a new chunk covering `[start, end)`.
    pub fn new(index: usize, start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "chunk start must not exceed end");
        Self { index, start, end }
    }

    /// Number of bytes in the chunk.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Returns true if the chunk holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The chunk as a `Range<u64>`.
    pub fn range(&self) -> Range<u64> {
        self.start..self.end
    }

    /// Value for the HTTP `Range` header (inclusive end).
    pub fn range_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end.saturating_sub(1))
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} [{}, {})", self.index, self.start, self.end)
    }
}

/// Split `total` bytes into at most `parts` ordered, non-overlapping chunks.
///
/// The effective part count is `min(parts, total)` so no chunk is ever empty.
/// A zero-length resource yields no chunks.
///
/// # Errors
///
/// Returns `InvalidInput` if `parts` is zero.
pub fn partition(total: u64, parts: usize) -> DownloadResult<Vec<Chunk>> {
    if parts == 0 {
        return Err(DownloadError::InvalidInput(
            "part count must be at least 1".to_string(),
        ));
    }

    if total == 0 {
        return Ok(Vec::new());
    }

    let parts = (parts as u64).min(total);
    let part_size = total / parts;

    let chunks = (0..parts)
        .map(|i| {
            let start = i * part_size;
            let end = if i == parts - 1 {
                total
            } else {
                start + part_size
            };
            Chunk::new(i as usize, start, end)
        })
        .collect();

    Ok(chunks)
}

/// Verify that `chunks` are ordered, disjoint, non-empty and cover `[0, total)`.
///
/// Workers write into the output without synchronisation, so the orchestrator
/// checks every partition with this before any view is handed out.
pub fn check_partition(chunks: &[Chunk], total: u64) -> DownloadResult<()> {
    let mut expected_start = 0u64;

    for (position, chunk) in chunks.iter().enumerate() {
        if chunk.index != position {
            return Err(DownloadError::InvalidInput(format!(
                "chunk at position {} has index {}",
                position, chunk.index
            )));
        }
        if chunk.start != expected_start {
            return Err(DownloadError::InvalidInput(format!(
                "chunk {} starts at {} but previous chunk ended at {}",
                chunk, chunk.start, expected_start
            )));
        }
        if chunk.is_empty() || chunk.end > total {
            return Err(DownloadError::InvalidInput(format!(
                "chunk {} is empty or exceeds length {}",
                chunk, total
            )));
        }
        expected_start = chunk.end;
    }

    if expected_start != total {
        return Err(DownloadError::InvalidInput(format!(
            "chunks cover {} of {} bytes",
            expected_start, total
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_partition_remainder_goes_to_last_chunk() {
        let chunks = partition(1000, 3).unwrap();
        assert_eq!(
            chunks,
            vec![
                Chunk::new(0, 0, 333),
                Chunk::new(1, 333, 666),
                Chunk::new(2, 666, 1000),
            ]
        );
        assert_eq!(chunks[2].len(), 334);
    }

    #[test]
    fn test_partition_even_split() {
        let chunks = partition(100, 4).unwrap();
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.len() == 25));
        assert_eq!(chunks[3].end, 100);
    }

    #[test]
    fn test_partition_single_part() {
        let chunks = partition(42, 1).unwrap();
        assert_eq!(chunks, vec![Chunk::new(0, 0, 42)]);
    }

    #[test]
    fn test_partition_more_parts_than_bytes() {
        let chunks = partition(3, 8).unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() == 1));
    }

    #[test]
    fn test_partition_zero_length() {
        assert!(partition(0, 4).unwrap().is_empty());
    }

    #[test]
    fn test_partition_zero_parts_rejected() {
        let err = partition(100, 0).unwrap_err();
        assert!(matches!(err, DownloadError::InvalidInput(_)));
    }

    #[test]
    fn test_range_header_is_inclusive() {
        assert_eq!(Chunk::new(0, 0, 333).range_header(), "bytes=0-332");
        assert_eq!(Chunk::new(2, 666, 1000).range_header(), "bytes=666-999");
    }

    #[test]
    fn test_check_partition_rejects_overlap() {
        let chunks = vec![Chunk::new(0, 0, 60), Chunk::new(1, 50, 100)];
        assert!(check_partition(&chunks, 100).is_err());
    }

    #[test]
    fn test_check_partition_rejects_gap() {
        let chunks = vec![Chunk::new(0, 0, 40), Chunk::new(1, 50, 100)];
        assert!(check_partition(&chunks, 100).is_err());
    }

    #[test]
    fn test_check_partition_rejects_short_cover() {
        let chunks = vec![Chunk::new(0, 0, 50)];
        assert!(check_partition(&chunks, 100).is_err());
    }

    #[test]
    fn test_check_partition_accepts_empty_resource() {
        assert!(check_partition(&[], 0).is_ok());
    }

    proptest! {
        #[test]
        fn prop_partition_covers_exactly_once(total in 0u64..1_000_000, parts in 1usize..128) {
            let chunks = partition(total, parts).unwrap();

            prop_assert!(chunks.len() <= parts);
            prop_assert_eq!(chunks.is_empty(), total == 0);
            prop_assert!(check_partition(&chunks, total).is_ok());

            let covered: u64 = chunks.iter().map(Chunk::len).sum();
            prop_assert_eq!(covered, total);

            if let Some(first) = chunks.first() {
                let last = chunks.last().unwrap();
                prop_assert!(last.len() >= first.len());
                prop_assert!(last.len() - first.len() < chunks.len() as u64);
            }
        }
    }
}
