//! Block layout: a packed header, an optional pair of free-list links living
//! in the payload while the block is free, and a footer mirroring the
//! header. The footer lets [`Block::left`] walk backwards without any
//! separate index — read the word just before this block to learn the left
//! neighbor's size, per the header/footer design in `original_source`'s
//! `allocator.c`.
//!
//! ```text
//! +--------+-----------------------------------+--------+
//! | header |  payload (or free-list links)      | footer |
//! +--------+-----------------------------------+--------+
//! ```

use bitfield_struct::bitfield;
use core::ptr::NonNull;

/// All block sizes (and hence all payload offsets) are multiples of this.
pub const ALIGNMENT: usize = 8;

/// Packed header/footer word: block size plus the free flag.
#[bitfield(u64)]
struct RawHeader {
    #[bits(63)]
    size: u64,
    free: bool,
}

pub const HEADER_SIZE: usize = core::mem::size_of::<RawHeader>();
pub const FOOTER_SIZE: usize = HEADER_SIZE;

/// Free-list links, stored in the payload of a free block. A block must be
/// at least this big to ever be free — `MIN_BLOCK_POW` is sized accordingly.
#[repr(C)]
pub struct Links {
    pub next: Option<NonNull<u8>>,
    pub prev: Option<NonNull<u8>>,
}

pub const LINKS_SIZE: usize = core::mem::size_of::<Links>();

/// Bytes spent on bookkeeping in every block, free or allocated.
pub const OVERHEAD: usize = HEADER_SIZE + FOOTER_SIZE;

/// A handle to a block's header. Cheap, `Copy`, carries no size — the block's
/// own header is the single source of truth for its size and free flag.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Block(NonNull<u8>);

impl Block {
    /// Wrap a raw pointer to the start of a block's header.
    ///
    /// # Safety
    /// `ptr` must point at a live, correctly initialized block header.
    #[must_use]
    pub unsafe fn from_raw(ptr: NonNull<u8>) -> Self {
        Block(ptr)
    }

    /// Recover the owning block from a payload pointer previously returned
    /// by [`Block::payload`].
    ///
    /// # Safety
    /// `payload` must have been produced by [`Block::payload`] on a live
    /// block.
    #[must_use]
    pub unsafe fn from_payload(payload: NonNull<u8>) -> Self {
        Block(unsafe { NonNull::new_unchecked(payload.as_ptr().sub(HEADER_SIZE)) })
    }

    #[must_use]
    pub fn as_ptr(self) -> NonNull<u8> {
        self.0
    }

    fn header_ptr(self) -> *mut RawHeader {
        self.0.as_ptr().cast()
    }

    fn footer_ptr(self, size: usize) -> *mut RawHeader {
        debug_assert!(size >= OVERHEAD);
        // SAFETY: caller-established invariant that `size` bytes starting at
        // `self.0` belong to this block.
        unsafe { self.0.as_ptr().add(size - FOOTER_SIZE).cast() }
    }

    /// Total size of this block, header and footer included.
    #[must_use]
    pub fn size(self) -> usize {
        // SAFETY: `self.0` points at an initialized header.
        unsafe { (*self.header_ptr()).size() as usize }
    }

    #[must_use]
    pub fn is_free(self) -> bool {
        // SAFETY: see `size`.
        unsafe { (*self.header_ptr()).free() }
    }

    /// Rewrite this block's header and footer to reflect `size`/`free`.
    /// `size` must already be `ALIGNMENT`-aligned and at least `OVERHEAD`.
    pub fn set_header(self, size: usize, free: bool) {
        debug_assert_eq!(size % ALIGNMENT, 0, "block size must stay 8-byte aligned");
        debug_assert!(size >= OVERHEAD, "block too small to hold header+footer");
        let raw = RawHeader::new().with_size(size as u64).with_free(free);
        // SAFETY: both the header and the footer slot lie within the `size`
        // bytes this block owns.
        unsafe {
            self.header_ptr().write(raw);
            self.footer_ptr(size).write(raw);
        }
    }

    /// Flip only the free flag, leaving size untouched.
    pub fn set_free(self, free: bool) {
        self.set_header(self.size(), free);
    }

    /// Pointer to the first payload byte (just past the header).
    #[must_use]
    pub fn payload(self) -> NonNull<u8> {
        // SAFETY: `HEADER_SIZE` bytes always precede the payload.
        unsafe { NonNull::new_unchecked(self.0.as_ptr().add(HEADER_SIZE)) }
    }

    /// Usable payload bytes: total size minus header/footer overhead.
    #[must_use]
    pub fn payload_size(self) -> usize {
        self.size() - OVERHEAD
    }

    /// Pointer to where the right neighbor's header would begin. The caller
    /// is responsible for checking this against the heap's high boundary —
    /// a block does not know where the heap ends.
    #[must_use]
    pub fn right_ptr(self) -> NonNull<u8> {
        // SAFETY: arithmetic only; dereferencing is the caller's job once
        // bounds-checked.
        unsafe { NonNull::new_unchecked(self.0.as_ptr().add(self.size())) }
    }

    /// The left neighbor, found via the footer word immediately preceding
    /// this block. The caller must check `left_footer_ptr` against the
    /// heap's low boundary before calling this.
    ///
    /// # Safety
    /// There must be a valid block footer at `self.0 - FOOTER_SIZE`, i.e.
    /// this block must not be the first block in the heap.
    #[must_use]
    pub unsafe fn left(self) -> Self {
        let footer: *const RawHeader = unsafe { self.0.as_ptr().sub(FOOTER_SIZE).cast() };
        let left_size = unsafe { (*footer).size() } as usize;
        Block(unsafe { NonNull::new_unchecked(self.0.as_ptr().sub(left_size)) })
    }

    /// Pointer to the footer word immediately preceding this block, used to
    /// bounds-check before calling [`Block::left`].
    #[must_use]
    pub fn left_footer_ptr(self) -> NonNull<u8> {
        // SAFETY: arithmetic only.
        unsafe { NonNull::new_unchecked(self.0.as_ptr().sub(FOOTER_SIZE)) }
    }

    /// The size mirrored in this block's own footer, independent of the
    /// header. Used only by the invariant checker to confirm the two never
    /// drifted apart — every mutator in this crate keeps them in lockstep via
    /// [`Block::set_header`], so in a correct build this always equals
    /// [`Block::size`].
    #[must_use]
    pub fn footer_size(self) -> usize {
        // SAFETY: `self.size()` bytes starting at `self.0` belong to this
        // block, so its footer slot is valid to read.
        unsafe { (*self.footer_ptr(self.size())).size() as usize }
    }

    /// Mutable access to this block's free-list links. Only meaningful while
    /// the block is free — an allocated block's payload belongs to the
    /// caller and must never be read through this.
    ///
    /// # Safety
    /// The block must currently be free, and no payload write from the
    /// caller may alias these bytes.
    #[must_use]
    pub unsafe fn links_mut(self) -> &'static mut Links {
        debug_assert!(self.is_free());
        let ptr: *mut Links = self.payload().as_ptr().cast();
        unsafe { &mut *ptr }
    }
}

/// The last block in a region bounded by `low..high`, found via the footer
/// immediately preceding `high` — the same trick [`Block::left`] uses,
/// anchored at the region's edge instead of another block. `None` if the
/// region holds no blocks yet (`low == high`).
#[must_use]
pub fn frontier(low: NonNull<u8>, high: NonNull<u8>) -> Option<Block> {
    if low == high {
        return None;
    }
    // SAFETY: the region is non-empty, so a footer sits just before `high`.
    let footer: *const RawHeader = unsafe { high.as_ptr().sub(FOOTER_SIZE).cast() };
    let size = unsafe { (*footer).size() } as usize;
    Some(Block(unsafe {
        NonNull::new_unchecked(high.as_ptr().sub(size))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::MaybeUninit;

    fn block_in(buf: &mut [MaybeUninit<u8>]) -> Block {
        let ptr = NonNull::new(buf.as_mut_ptr().cast::<u8>()).unwrap();
        unsafe { Block::from_raw(ptr) }
    }

    #[test]
    fn header_and_footer_agree() {
        let mut buf = [MaybeUninit::<u8>::uninit(); 64];
        let block = block_in(&mut buf);
        block.set_header(64, false);
        assert_eq!(block.size(), 64);
        assert!(!block.is_free());

        block.set_free(true);
        assert!(block.is_free());
        assert_eq!(block.size(), 64);
    }

    #[test]
    fn payload_roundtrip() {
        let mut buf = [MaybeUninit::<u8>::uninit(); 64];
        let block = block_in(&mut buf);
        block.set_header(64, false);
        let payload = block.payload();
        let recovered = unsafe { Block::from_payload(payload) };
        assert_eq!(recovered, block);
        assert_eq!(block.payload_size(), 64 - OVERHEAD);
    }

    #[test]
    fn left_neighbor_via_footer() {
        let mut buf = [MaybeUninit::<u8>::uninit(); 128];
        let first = block_in(&mut buf);
        first.set_header(32, false);
        let second = unsafe { Block::from_raw(first.right_ptr()) };
        second.set_header(32, true);

        let left = unsafe { second.left() };
        assert_eq!(left, first);
    }

    #[test]
    fn frontier_finds_the_last_block() {
        let mut buf = [MaybeUninit::<u8>::uninit(); 128];
        let base = NonNull::new(buf.as_mut_ptr().cast::<u8>()).unwrap();
        let low = base;
        let high = unsafe { NonNull::new_unchecked(base.as_ptr().add(128)) };

        assert!(frontier(low, low).is_none());

        let a = unsafe { Block::from_raw(base) };
        a.set_header(64, false);
        let b = unsafe { Block::from_raw(a.right_ptr()) };
        b.set_header(64, true);

        assert_eq!(frontier(low, high), Some(b));
    }
}
