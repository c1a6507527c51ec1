//! Merge a freed block with whichever of its immediate neighbors are also
//! free, then file the (possibly larger) result into its bin. Ported in
//! meaning from `original_source/mymalloc/allocator.c`'s `coalesce`: the
//! neighbor lookup stays O(1) (footer-mirror to the left, direct pointer
//! arithmetic to the right), the bin bookkeeping is the only part that
//! differs — a neighbor must be pulled out of *its* bin before it can be
//! folded into this one.

use crate::block::Block;
use crate::bins::Bins;
use crate::freelist::{extract, push};
use core::ptr::NonNull;

/// `block` must already be marked free (but not yet filed into a bin).
/// `heap_low`/`heap_high` bound the region so neighbor lookups never walk
/// off the ends. Returns the block actually holding the merged memory —
/// `block` itself if nothing merged, or the absorbing neighbor otherwise —
/// already pushed into the appropriate bin.
pub fn coalesce(
    bins: &mut Bins,
    mut block: Block,
    heap_low: NonNull<u8>,
    heap_high: NonNull<u8>,
) -> Block {
    debug_assert!(block.is_free());

    if block.right_ptr() < heap_high {
        // SAFETY: `right_ptr` is strictly below `heap_high`, so it addresses
        // a live block header within the region.
        let right = unsafe { Block::from_raw(block.right_ptr()) };
        if right.is_free() {
            extract(bins, right);
            block.set_header(block.size() + right.size(), true);
        }
    }

    if block.left_footer_ptr() >= heap_low {
        // SAFETY: there is a preceding footer within the region, so `left`
        // addresses a live block header.
        let left = unsafe { block.left() };
        if left.is_free() {
            extract(bins, left);
            left.set_header(left.size() + block.size(), true);
            block = left;
        }
    }

    push(bins, block);
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bins::empty_bins;
    use core::mem::MaybeUninit;

    #[test]
    fn merges_with_free_right_neighbor() {
        let mut bins = empty_bins();
        let mut buf = [MaybeUninit::<u8>::uninit(); 128];
        let base = NonNull::new(buf.as_mut_ptr().cast::<u8>()).unwrap();
        let low = base;
        let high = unsafe { NonNull::new_unchecked(base.as_ptr().add(128)) };

        let a = unsafe { Block::from_raw(base) };
        a.set_header(64, false);
        let b = unsafe { Block::from_raw(a.right_ptr()) };
        b.set_header(64, true);
        push(&mut bins, b);

        a.set_header(64, true);
        let merged = coalesce(&mut bins, a, low, high);
        assert_eq!(merged, a);
        assert_eq!(merged.size(), 128);
    }

    #[test]
    fn merges_with_free_left_neighbor() {
        let mut bins = empty_bins();
        let mut buf = [MaybeUninit::<u8>::uninit(); 128];
        let base = NonNull::new(buf.as_mut_ptr().cast::<u8>()).unwrap();
        let low = base;
        let high = unsafe { NonNull::new_unchecked(base.as_ptr().add(128)) };

        let a = unsafe { Block::from_raw(base) };
        a.set_header(64, true);
        push(&mut bins, a);
        let b = unsafe { Block::from_raw(a.right_ptr()) };
        b.set_header(64, false);

        b.set_header(64, true);
        let merged = coalesce(&mut bins, b, low, high);
        assert_eq!(merged, a);
        assert_eq!(merged.size(), 128);
    }

    #[test]
    fn does_not_merge_across_allocated_neighbors() {
        let mut bins = empty_bins();
        let mut buf = [MaybeUninit::<u8>::uninit(); 128];
        let base = NonNull::new(buf.as_mut_ptr().cast::<u8>()).unwrap();
        let low = base;
        let high = unsafe { NonNull::new_unchecked(base.as_ptr().add(128)) };

        let a = unsafe { Block::from_raw(base) };
        a.set_header(64, false);
        let b = unsafe { Block::from_raw(a.right_ptr()) };
        b.set_header(64, false);

        b.set_header(64, true);
        let merged = coalesce(&mut bins, b, low, high);
        assert_eq!(merged, b);
        assert_eq!(merged.size(), 64);
    }
}
