//! # Region provider
//!
//! A heap needs somewhere to grow into. This crate defines the narrow
//! contract the allocator in `heap-alloc` consumes to get more memory —
//! four calls, no more: [`RegionProvider::grow`], [`RegionProvider::low`],
//! [`RegionProvider::high`], [`RegionProvider::reset`]. It mirrors the
//! classical Unix `sbrk` family (`mem_sbrk`/`mem_heap_lo`/`mem_heap_hi`/
//! `mem_reset_brk` in the C `memlib` this design traces back to): a single
//! contiguous region whose high end only moves up, never down, except on an
//! explicit [`reset`](RegionProvider::reset) between sessions.
//!
//! [`SimRegion`] is the concrete, hosted implementation used by `heap-alloc`'s
//! tests and by the `heap-trace` replayer: a single arena reserved up front,
//! with a break pointer that advances inside it. A future freestanding port
//! (a real kernel heap, say) would implement [`RegionProvider`] over a static
//! `.bss` reservation instead, the way `kernel-alloc`'s `static_heap` module
//! does for its free-list allocator — the trait is the seam.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

use alloc::vec::Vec;
use core::ptr::NonNull;

/// The four-call interface an allocator core needs from its backing memory.
///
/// # Safety
/// Implementations must hand out addresses that stay valid — and at a fixed
/// location — for the lifetime of the region, i.e. a successful [`grow`](Self::grow)
/// must never invalidate memory returned by a previous call. [`low`](Self::low)
/// and [`high`](Self::high) must always satisfy `low() <= high()`.
pub trait RegionProvider {
    /// Extend the region by `delta` bytes, returning the address of the old
    /// high boundary (where the new `delta` bytes begin).
    ///
    /// # Errors
    /// Returns [`RegionError::Exhausted`] if the region cannot grow by
    /// `delta` bytes; the region is left unchanged.
    fn grow(&mut self, delta: usize) -> Result<NonNull<u8>, RegionError>;

    /// The current low boundary of the region. Fixed for the region's
    /// lifetime (until [`reset`](Self::reset)).
    fn low(&self) -> NonNull<u8>;

    /// The current high boundary of the region (one past the last managed
    /// byte). Monotonically non-decreasing between resets.
    fn high(&self) -> NonNull<u8>;

    /// Return the region to zero size, as if freshly constructed. Used for
    /// test isolation between independent trace runs.
    fn reset(&mut self);
}

/// The only failure mode a [`RegionProvider`] can report.
#[derive(Debug, thiserror::Error)]
pub enum RegionError {
    /// The region could not grow by the requested amount.
    #[error("region exhausted: requested {requested} bytes, {available} available")]
    Exhausted {
        /// Bytes that were requested via [`RegionProvider::grow`].
        requested: usize,
        /// Bytes actually available before hitting the reserved capacity.
        available: usize,
    },
}

/// A hosted [`RegionProvider`] backed by a single pre-reserved arena.
///
/// Mirrors the MIT malloclab `memlib.c` approach: reserve one fixed-capacity
/// buffer once, then move a "break" pointer inside it. Because the backing
/// `Vec` never reallocates past its initial reservation, every address handed
/// out by [`grow`](RegionProvider::grow) stays valid for the life of the
/// `SimRegion`.
pub struct SimRegion {
    arena: Vec<u8>,
    /// Logical length of the region (`<= arena.capacity()`); the "break".
    len: usize,
}

impl SimRegion {
    /// Reserve a new arena of `capacity` bytes and start with a zero-size
    /// region at its base.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            arena: Vec::with_capacity(capacity),
            len: 0,
        }
    }

    /// Total bytes this arena was reserved with. `grow` can never push the
    /// region past this.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.arena.capacity()
    }
}

impl RegionProvider for SimRegion {
    fn grow(&mut self, delta: usize) -> Result<NonNull<u8>, RegionError> {
        let new_len = self.len.checked_add(delta).ok_or(RegionError::Exhausted {
            requested: delta,
            available: self.arena.capacity() - self.len,
        })?;

        if new_len > self.arena.capacity() {
            return Err(RegionError::Exhausted {
                requested: delta,
                available: self.arena.capacity() - self.len,
            });
        }

        // SAFETY: `new_len <= arena.capacity()`, so no reallocation happens;
        // the bytes in `[len, new_len)` are part of the reserved allocation
        // and we immediately zero them before handing out the old boundary.
        unsafe {
            self.arena.set_len(new_len);
        }
        self.arena[self.len..new_len].fill(0);

        // SAFETY: the arena's backing pointer is non-null once reserved.
        let old_high = unsafe { self.arena.as_mut_ptr().add(self.len) };
        self.len = new_len;
        Ok(unsafe { NonNull::new_unchecked(old_high) })
    }

    fn low(&self) -> NonNull<u8> {
        // SAFETY: the arena was reserved with non-zero capacity in practice;
        // a zero-capacity arena still yields a well-aligned dangling pointer.
        unsafe { NonNull::new_unchecked(self.arena.as_ptr().cast_mut()) }
    }

    fn high(&self) -> NonNull<u8> {
        // SAFETY: see `low`.
        unsafe { NonNull::new_unchecked(self.arena.as_ptr().add(self.len).cast_mut()) }
    }

    fn reset(&mut self) {
        // SAFETY: 0 <= capacity always holds.
        unsafe {
            self.arena.set_len(0);
        }
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_and_tracks_boundaries() {
        let mut region = SimRegion::with_capacity(4096);
        assert_eq!(region.low(), region.high());

        let old_high = region.grow(64).unwrap();
        assert_eq!(old_high, region.low());
        assert_eq!(
            region.high().as_ptr() as usize - region.low().as_ptr() as usize,
            64
        );

        let second = region.grow(64).unwrap();
        assert_eq!(second.as_ptr() as usize, old_high.as_ptr() as usize + 64);
    }

    #[test]
    fn exhausts_past_capacity() {
        let mut region = SimRegion::with_capacity(128);
        assert!(region.grow(128).is_ok());
        let err = region.grow(1).unwrap_err();
        match err {
            RegionError::Exhausted {
                requested,
                available,
            } => {
                assert_eq!(requested, 1);
                assert_eq!(available, 0);
            }
        }
    }

    #[test]
    fn reset_returns_to_zero_size() {
        let mut region = SimRegion::with_capacity(256);
        region.grow(200).unwrap();
        region.reset();
        assert_eq!(region.low(), region.high());
        // The region is reusable after reset.
        assert!(region.grow(256).is_ok());
    }

    #[test]
    fn grown_memory_is_zeroed() {
        let mut region = SimRegion::with_capacity(16);
        let p = region.grow(16).unwrap();
        let bytes = unsafe { core::slice::from_raw_parts(p.as_ptr(), 16) };
        assert!(bytes.iter().all(|&b| b == 0));
    }
}
