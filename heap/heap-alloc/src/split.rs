//! Splitting an oversized block: if what is left over after carving out
//! `needed` bytes is worth keeping as its own free block, split it off;
//! otherwise the whole block stays allocated as-is rather than filing away a
//! sliver nothing will ever fit into. Mirrors `original_source`'s `shrink`.

use crate::bins::{Bins, MIN_BLOCK_SIZE};
use crate::block::{Block, ALIGNMENT};
use crate::coalesce::coalesce;
use core::ptr::NonNull;

/// Below this many leftover bytes, a split is not worth doing — the
/// remainder could never be coalesced into anything useful before it would
/// itself need splitting. Exact value from `original_source`'s
/// `SHRINK_MIN_SIZE`.
pub const SHRINK_MIN: usize = 64;

/// If `block` (currently sized to hold at least `needed` bytes of header,
/// footer and payload) has enough left over, carve off the remainder as a
/// new free block — coalescing it with a free right neighbor if there is
/// one — and shrink `block` down to `needed`. Otherwise `block` is returned
/// unchanged at its current size.
pub fn maybe_split(
    bins: &mut Bins,
    block: Block,
    needed: usize,
    heap_low: NonNull<u8>,
    heap_high: NonNull<u8>,
) -> Block {
    debug_assert_eq!(needed % ALIGNMENT, 0);
    debug_assert!(needed <= block.size());

    let remainder = block.size() - needed;
    if remainder < SHRINK_MIN.max(MIN_BLOCK_SIZE) {
        return block;
    }

    block.set_header(needed, false);
    let tail = unsafe { Block::from_raw(block.right_ptr()) };
    tail.set_header(remainder, true);
    coalesce(bins, tail, heap_low, heap_high);
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bins::empty_bins;
    use core::mem::MaybeUninit;

    #[test]
    fn splits_off_a_usable_remainder() {
        let mut bins = empty_bins();
        let mut buf = [MaybeUninit::<u8>::uninit(); 256];
        let base = NonNull::new(buf.as_mut_ptr().cast::<u8>()).unwrap();
        let low = base;
        let high = unsafe { NonNull::new_unchecked(base.as_ptr().add(256)) };

        let block = unsafe { Block::from_raw(base) };
        block.set_header(256, false);

        let shrunk = maybe_split(&mut bins, block, 64, low, high);
        assert_eq!(shrunk.size(), 64);
        assert!(!shrunk.is_free());

        let tail = unsafe { Block::from_raw(shrunk.right_ptr()) };
        assert_eq!(tail.size(), 192);
        assert!(tail.is_free());
    }

    #[test]
    fn skips_splitting_a_tiny_remainder() {
        let mut bins = empty_bins();
        let mut buf = [MaybeUninit::<u8>::uninit(); 96];
        let base = NonNull::new(buf.as_mut_ptr().cast::<u8>()).unwrap();
        let low = base;
        let high = unsafe { NonNull::new_unchecked(base.as_ptr().add(96)) };

        let block = unsafe { Block::from_raw(base) };
        block.set_header(96, false);

        // Remainder would only be 96 - 64 = 32 bytes, below SHRINK_MIN.
        let result = maybe_split(&mut bins, block, 64, low, high);
        assert_eq!(result, block);
        assert_eq!(result.size(), 96);
    }
}
