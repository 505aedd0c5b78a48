//! Read-only file handles supplied by the caller.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// A caller-owned, read-only file.
///
/// The module pulls bytes from it range by range during uploads, so
/// implementations must support random access.
#[async_trait]
pub trait FileHandle: Send + Sync {
    /// File name as presented to the module.
    fn name(&self) -> &str;

    /// Total size in bytes.
    fn size(&self) -> u64;

    /// Reads `length` bytes starting at `offset`.
    ///
    /// The range is clamped to the end of the file; reading at or past the end
    /// yields an empty buffer.
    async fn read_range(&self, offset: u64, length: u64) -> Result<Bytes>;
}

/// Clamps a requested range to a file of `size` bytes.
///
/// Returns the effective `(offset, length)`.
pub fn clamp_range(size: u64, offset: u64, length: u64) -> (u64, u64) {
    if offset >= size {
        return (size, 0);
    }
    (offset, length.min(size - offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_range() {
        assert_eq!(clamp_range(100, 0, 10), (0, 10));
        assert_eq!(clamp_range(100, 95, 10), (95, 5));
        assert_eq!(clamp_range(100, 100, 10), (100, 0));
        assert_eq!(clamp_range(100, 200, 10), (100, 0));
        assert_eq!(clamp_range(0, 0, 10), (0, 0));
    }
}
