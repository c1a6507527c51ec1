//! Segregated free-list bins. Each bin holds free blocks whose size falls in
//! `[2^(MIN_BLOCK_POW + i), 2^(MIN_BLOCK_POW + i + 1))`; the last bin is a
//! catch-all for anything at or above `2^MAX_BLOCK_POW`. `bin_of` is the
//! classifier `original_source`'s `BLOCK_BIN` computes via a hand-rolled
//! binary search over bitmasks — `usize::ilog2` gives the same floor-log2
//! directly.

use core::ptr::NonNull;

/// Smallest block ever handed to a bin; also the smallest possible block
/// size overall (`2^MIN_BLOCK_POW`), matching `heap_alloc::block::OVERHEAD +
/// LINKS_SIZE` so a free block always has room for its links.
pub const MIN_BLOCK_POW: u32 = 5;

/// Blocks at or above `2^MAX_BLOCK_POW` all land in the last bin.
pub const MAX_BLOCK_POW: u32 = 29;

/// Number of segregated bins.
pub const NUM_BINS: usize = (MAX_BLOCK_POW - MIN_BLOCK_POW) as usize;

/// Smallest legal block size in bytes.
pub const MIN_BLOCK_SIZE: usize = 1 << MIN_BLOCK_POW;

/// The bin array: one intrusive free-list head per size class.
pub type Bins = [Option<NonNull<u8>>; NUM_BINS];

/// An empty bin array, suitable for a freshly initialized heap.
#[must_use]
pub const fn empty_bins() -> Bins {
    [None; NUM_BINS]
}

/// Classify `size` (a full block size, header/footer included) into a bin
/// index. Sizes below `MIN_BLOCK_SIZE` are clamped to bin 0; sizes at or
/// above `2^MAX_BLOCK_POW` are clamped to the last bin.
#[must_use]
pub fn bin_of(size: usize) -> usize {
    let pow = size.max(MIN_BLOCK_SIZE).ilog2();
    pow.saturating_sub(MIN_BLOCK_POW) as usize
    // saturating_sub already handles the lower clamp (pow >= MIN_BLOCK_POW
    // is guaranteed by the `max` above); the upper clamp comes from `.min`
    // at the call site below.
        .min(NUM_BINS - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_exact_powers_of_two() {
        assert_eq!(bin_of(32), 0);
        assert_eq!(bin_of(64), 1);
        assert_eq!(bin_of(128), 2);
    }

    #[test]
    fn classifies_within_a_bin_range() {
        // Everything in [32, 64) lands in bin 0, not just size 32 itself.
        assert_eq!(bin_of(33), 0);
        assert_eq!(bin_of(63), 0);
        assert_eq!(bin_of(40), 0);
    }

    #[test]
    fn clamps_huge_sizes_to_last_bin() {
        assert_eq!(bin_of(1 << MAX_BLOCK_POW), NUM_BINS - 1);
        assert_eq!(bin_of(usize::MAX), NUM_BINS - 1);
    }

    #[test]
    fn clamps_tiny_sizes_to_first_bin() {
        assert_eq!(bin_of(1), 0);
        assert_eq!(bin_of(0), 0);
    }
}
