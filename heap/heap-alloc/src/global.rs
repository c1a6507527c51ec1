//! A `GlobalAlloc` adapter over [`Heap`], mirroring the shape of the
//! teacher's `kernel_allocator::KernelAllocator` — minus the spinlock, since
//! spec.md's Non-goals explicitly exclude thread safety. This makes
//! [`GlobalHeap`] sound only when the caller serializes every `alloc`/
//! `dealloc`/`realloc` call externally (spec.md §5); it is a thin
//! `UnsafeCell` wrapper, not a lock.

use crate::block::ALIGNMENT;
use crate::Heap;
use core::alloc::{GlobalAlloc, Layout};
use core::cell::UnsafeCell;
use core::ptr::{self, NonNull};
use heap_region::{RegionError, RegionProvider};

/// A [`Heap<R>`] exposed through [`GlobalAlloc`]. Must be [`init`](Self::init)ed
/// before any allocation request reaches it.
pub struct GlobalHeap<R> {
    inner: UnsafeCell<Option<Heap<R>>>,
}

// SAFETY: access is never actually concurrent in this design (spec.md §5);
// `Sync` here only satisfies `#[global_allocator]`'s requirement that the
// static be shareable across threads, not that it be safe to race.
unsafe impl<R: Send> Sync for GlobalHeap<R> {}

impl<R: RegionProvider> GlobalHeap<R> {
    /// A `GlobalHeap` with no backing region yet. Must be [`init`](Self::init)ed
    /// before use.
    #[must_use]
    pub const fn uninit() -> Self {
        Self {
            inner: UnsafeCell::new(None),
        }
    }

    /// Bring up the heap over `region`.
    ///
    /// # Safety
    /// Must be called exactly once, before any `alloc`/`dealloc`/`realloc`
    /// call reaches this allocator, and not concurrently with one.
    ///
    /// # Errors
    /// Propagates a [`RegionError`] if [`Heap::init`] fails.
    pub unsafe fn init(&self, region: R) -> Result<(), RegionError> {
        let heap = Heap::init(region)?;
        // SAFETY: caller contract — no concurrent access during `init`.
        unsafe {
            *self.inner.get() = Some(heap);
        }
        Ok(())
    }

    fn with_heap<T>(&self, f: impl FnOnce(&mut Heap<R>) -> T) -> T {
        // SAFETY: caller contract on every `GlobalAlloc` method — the whole
        // design is non-reentrant and externally serialized (spec.md §5).
        let heap = unsafe { &mut *self.inner.get() };
        f(heap.as_mut().expect("GlobalHeap::init was not called before first allocation"))
    }
}

// SAFETY: the `GlobalAlloc` contract (no two calls overlap without external
// synchronization) is exactly what spec.md §5 already assumes for `Heap`.
unsafe impl<R: RegionProvider> GlobalAlloc for GlobalHeap<R> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        debug_assert!(
            layout.align() <= ALIGNMENT,
            "GlobalHeap only guarantees {ALIGNMENT}-byte alignment"
        );
        self.with_heap(|heap| heap.allocate(layout.size()))
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        self.with_heap(|heap| heap.release(NonNull::new(ptr)));
    }

    unsafe fn realloc(&self, ptr: *mut u8, _layout: Layout, new_size: usize) -> *mut u8 {
        self.with_heap(|heap| heap.resize(NonNull::new(ptr), new_size))
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heap_region::SimRegion;

    #[test]
    fn allocates_and_frees_through_the_global_alloc_trait() {
        let heap: GlobalHeap<SimRegion> = GlobalHeap::uninit();
        unsafe {
            heap.init(SimRegion::with_capacity(1 << 16)).unwrap();
        }

        let layout = Layout::from_size_align(64, 8).unwrap();
        let ptr = unsafe { heap.alloc(layout) };
        assert!(!ptr.is_null());
        assert_eq!(ptr as usize % ALIGNMENT, 0);

        unsafe {
            core::ptr::write_bytes(ptr, 0x42, 64);
            heap.dealloc(ptr, layout);
        }
    }

    #[test]
    #[should_panic(expected = "GlobalHeap::init was not called")]
    fn using_before_init_panics() {
        let heap: GlobalHeap<SimRegion> = GlobalHeap::uninit();
        let layout = Layout::from_size_align(64, 8).unwrap();
        unsafe {
            heap.alloc(layout);
        }
    }
}
