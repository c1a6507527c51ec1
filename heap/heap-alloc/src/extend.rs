//! Growing the region when no bin can satisfy a request. Two variants, both
//! named for their role rather than their mechanics, per spec.md §4.6:
//! append a fresh block at the end of the region, or lengthen the frontier
//! block in place if it happens to already be free. Ported in meaning from
//! `original_source/mymalloc/allocator.c`'s `my_malloc` heap-growth fallback
//! and `my_realloc`'s `EXPAND_INTO_FREE_NEIGHBOR` branch.

use crate::block::{Block, OVERHEAD};
use crate::bins::Bins;
use crate::freelist::extract;
use heap_region::{RegionError, RegionProvider};

/// Grow the region by exactly `size` bytes and hand back a fresh, allocated
/// block of that size at the old frontier. `size` must already be
/// alignment-rounded and include header/footer overhead.
pub fn append_new<R: RegionProvider>(region: &mut R, size: usize) -> Result<Block, RegionError> {
    let old_high = region.grow(size)?;
    // SAFETY: `region.grow` just reserved `size` fresh bytes starting here.
    let block = unsafe { Block::from_raw(old_high) };
    block.set_header(size, false);
    Ok(block)
}

/// If `frontier` is free and lengthening it would satisfy `size`, extract it
/// from its bin, grow the region by the shortfall, and return it resized and
/// allocated. Returns `None` (untouched) if `frontier` is not free — callers
/// fall back to [`append_new`] in that case.
pub fn extend_frontier<R: RegionProvider>(
    region: &mut R,
    bins: &mut Bins,
    frontier: Block,
    size: usize,
) -> Option<Result<Block, RegionError>> {
    if !frontier.is_free() {
        return None;
    }
    debug_assert!(size > frontier.size(), "frontier already large enough");
    let shortfall = size - frontier.size();
    extract(bins, frontier);
    Some(match region.grow(shortfall) {
        Ok(_) => {
            frontier.set_header(size, false);
            Ok(frontier)
        }
        Err(err) => {
            // Region didn't grow; restore the block to free/its bin so the
            // caller's failed request leaves the heap exactly as it found it.
            crate::freelist::push(bins, frontier);
            Err(err)
        }
    })
}

/// Smallest number of bytes [`append_new`]/[`extend_frontier`] will ever be
/// asked to add — a block must at least hold its own overhead.
pub const MIN_GROWTH: usize = OVERHEAD;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bins::empty_bins;
    use heap_region::SimRegion;

    #[test]
    fn append_new_forms_a_used_block_at_the_old_frontier() {
        let mut region = SimRegion::with_capacity(4096);
        let old_high = region.high();
        let block = append_new(&mut region, 64).unwrap();
        assert_eq!(block.as_ptr(), old_high);
        assert_eq!(block.size(), 64);
        assert!(!block.is_free());
        assert_eq!(
            region.high().as_ptr() as usize - old_high.as_ptr() as usize,
            64
        );
    }

    #[test]
    fn append_new_propagates_region_exhaustion() {
        let mut region = SimRegion::with_capacity(32);
        let err = append_new(&mut region, 64).unwrap_err();
        assert!(matches!(err, RegionError::Exhausted { .. }));
    }

    #[test]
    fn extend_frontier_lengthens_a_free_block_in_place() {
        let mut region = SimRegion::with_capacity(4096);
        let mut bins = empty_bins();
        let block = append_new(&mut region, 64).unwrap();
        block.set_free(true);
        crate::freelist::push(&mut bins, block);

        let grown = extend_frontier(&mut region, &mut bins, block, 128)
            .unwrap()
            .unwrap();
        assert_eq!(grown.as_ptr(), block.as_ptr());
        assert_eq!(grown.size(), 128);
        assert!(!grown.is_free());
    }

    #[test]
    fn extend_frontier_declines_a_used_block() {
        let mut region = SimRegion::with_capacity(4096);
        let mut bins = empty_bins();
        let block = append_new(&mut region, 64).unwrap();
        assert!(extend_frontier(&mut region, &mut bins, block, 128).is_none());
    }
}
