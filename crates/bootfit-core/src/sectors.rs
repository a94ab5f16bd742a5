//! # Sectors Module
//!
//! Byte/sector arithmetic for kernel images.

use crate::SectorCount;
use std::num::NonZeroU64;

/// Sector size assumed when none is configured (classic BIOS disks).
pub const DEFAULT_SECTOR_SIZE: u64 = 512;

/// Number of whole sectors needed to hold `byte_len` bytes.
///
/// A partial trailing sector still occupies a full sector on disk.
#[must_use]
pub fn sectors_for_bytes(byte_len: u64, sector_size: NonZeroU64) -> SectorCount {
    byte_len.div_ceil(sector_size.get())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn size(n: u64) -> NonZeroU64 {
        NonZeroU64::new(n).unwrap_or(NonZeroU64::MIN)
    }

    #[test]
    fn exact_multiple() {
        assert_eq!(sectors_for_bytes(1024, size(512)), 2);
    }

    #[test]
    fn partial_sector_rounds_up() {
        assert_eq!(sectors_for_bytes(1025, size(512)), 3);
        assert_eq!(sectors_for_bytes(1, size(512)), 1);
    }

    #[test]
    fn empty_binary_needs_nothing() {
        assert_eq!(sectors_for_bytes(0, size(512)), 0);
    }

    #[test]
    fn large_sizes_do_not_overflow() {
        assert_eq!(sectors_for_bytes(u64::MAX, size(4096)), u64::MAX / 4096 + 1);
    }
}
