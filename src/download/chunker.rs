//! Range chunking for large media resources
//!
//! A resource of `N` bytes is requested as a sequence of contiguous byte
//! ranges no larger than the chunk size. Each range becomes one request URL
//! carrying a `range=start-end` query parameter.

use crate::utils::url::append_query_param;
use std::fmt;
use std::num::NonZeroU64;

/// Default chunk size (10 MiB)
pub const DEFAULT_CHUNK_SIZE: u64 = 10_485_760;

/// Inclusive byte range; `end == None` means open ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    /// Number of bytes covered, if bounded
    pub fn len(&self) -> Option<u64> {
        self.end.map(|end| end - self.start + 1)
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "{}-{}", self.start, end),
            None => write!(f, "{}-", self.start),
        }
    }
}

/// Splits byte lengths into bounded range requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeChunker {
    chunk_size: NonZeroU64,
}

impl RangeChunker {
    /// Create a chunker with the given chunk size
    pub fn new(chunk_size: NonZeroU64) -> Self {
        Self { chunk_size }
    }

    /// Create a chunker, rejecting a zero chunk size
    pub fn try_new(chunk_size: u64) -> Option<Self> {
        NonZeroU64::new(chunk_size).map(Self::new)
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size.get()
    }

    /// Split `[0, total)` into contiguous ranges, the last one clipped to `total - 1`.
    ///
    /// A zero length yields a single open range, which is what a request
    /// without a known size looks like.
    pub fn ranges(&self, total: u64) -> Vec<ByteRange> {
        if total == 0 {
            return vec![ByteRange {
                start: 0,
                end: None,
            }];
        }

        let size = self.chunk_size.get();
        let count = total.div_ceil(size);
        (0..count)
            .map(|index| {
                let start = index * size;
                let end = start.saturating_add(size - 1).min(total - 1);
                ByteRange {
                    start,
                    end: Some(end),
                }
            })
            .collect()
    }

    /// Build one request URL per range of `total` bytes
    pub fn urls(&self, base_url: &str, total: u64) -> Vec<String> {
        self.ranges(total)
            .into_iter()
            .map(|range| append_query_param(base_url, "range", &range.to_string()))
            .collect()
    }
}

impl Default for RangeChunker {
    fn default() -> Self {
        Self {
            chunk_size: NonZeroU64::new(DEFAULT_CHUNK_SIZE).unwrap_or(NonZeroU64::MIN),
        }
    }
}
