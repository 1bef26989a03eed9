//! `Range: bytes=...` header parsing for clip seeking

use crate::http::error::ApiError;

/// Inclusive byte span of a clip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

/// Resolves a single `bytes=` range against a file of `size` bytes.
///
/// An open end is clamped to the last byte, `bytes=-n` means the last `n` bytes.
/// Multiple ranges are not supported and count as unsatisfiable.
pub fn parse(header: &str, size: u64) -> Result<ByteRange, ApiError> {
    let unsatisfiable = || ApiError::RangeNotSatisfiable(size);

    let spec = header.trim().strip_prefix("bytes=").ok_or_else(unsatisfiable)?;
    let (start, end) = spec.split_once('-').ok_or_else(unsatisfiable)?;
    let (start, end) = (start.trim(), end.trim());

    if size == 0 {
        return Err(unsatisfiable());
    }
    let last = size - 1;

    let range = if start.is_empty() {
        let suffix: u64 = end.parse().map_err(|_| unsatisfiable())?;
        if suffix == 0 {
            return Err(unsatisfiable());
        }
        ByteRange {
            start: size.saturating_sub(suffix),
            end: last,
        }
    } else {
        let start: u64 = start.parse().map_err(|_| unsatisfiable())?;
        let end = if end.is_empty() {
            last
        } else {
            end.parse::<u64>().map_err(|_| unsatisfiable())?.min(last)
        };
        ByteRange { start, end }
    };

    if range.start > range.end {
        return Err(unsatisfiable());
    }
    Ok(range)
}
