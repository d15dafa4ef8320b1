//! Bump arena backing decoded message records.
//!
//! The decoder carves message blocks, repeated-field storage, and copied
//! string payloads out of this allocator.  Memory grows monotonically: blocks
//! are never freed until the arena is dropped, and `realloc` either extends
//! the most recent allocation in place or migrates it to a fresh region.
//!
//! Allocation goes through `&self` so that any number of decoded messages may
//! borrow the same arena for their lifetime.  The arena is `!Sync`; a decode
//! call owns it for the duration (single-threaded by design).

use core::cell::UnsafeCell;
use core::ptr;

/// Every allocation is aligned to this many bytes.  Message records, array
/// headers, and array storage all assume it.
pub const ARENA_ALIGN: usize = 8;

const FIRST_BLOCK: usize = 256;
const MAX_BLOCK: usize = 32 * 1024;

struct ArenaInner {
    /// Owned blocks.  `u64` elements keep the base pointer 8-aligned.
    blocks: Vec<Box<[u64]>>,
    /// Bump cursor within the current block.
    head: *mut u8,
    /// One past the last usable byte of the current block.
    end: *mut u8,
    /// Size the next fresh block will get (doubles up to `MAX_BLOCK`).
    next_size: usize,
    /// Number of `alloc`/`realloc` requests served.
    allocs: usize,
}

/// Monotonic bump allocator.
pub struct Arena {
    inner: UnsafeCell<ArenaInner>,
}

impl Arena {
    /// Create an empty arena.  The first block is allocated on demand.
    pub fn new() -> Self {
        Arena {
            inner: UnsafeCell::new(ArenaInner {
                blocks: Vec::new(),
                head: ptr::null_mut(),
                end: ptr::null_mut(),
                next_size: FIRST_BLOCK,
                allocs: 0,
            }),
        }
    }

    /// Create an arena whose first block holds at least `bytes` bytes.
    pub fn with_capacity(bytes: usize) -> Self {
        let arena = Arena::new();
        // SAFETY: the arena was just created; no outstanding pointers exist.
        unsafe { (*arena.inner.get()).grow(bytes) };
        arena
    }

    /// Allocate `size` bytes, 8-aligned.  Returns null when the backing
    /// allocation fails.  `size == 0` still yields a valid unique pointer.
    #[inline]
    pub fn alloc(&self, size: usize) -> *mut u8 {
        // SAFETY: single-threaded interior mutability; no reference to the
        // inner state escapes this call.
        let inner = unsafe { &mut *self.inner.get() };
        inner.allocs += 1;
        let rounded = round_up(size.max(1));
        if inner.remaining() < rounded && !inner.grow(rounded) {
            return ptr::null_mut();
        }
        let p = inner.head;
        // SAFETY: `remaining() >= rounded` guarantees head + rounded <= end.
        inner.head = unsafe { inner.head.add(rounded) };
        p
    }

    /// Grow (or shrink) an allocation of `old` bytes at `p` to `new` bytes.
    ///
    /// When `p` is the most recent allocation and the current block has room,
    /// the region is extended in place; otherwise a fresh region is carved
    /// and the old contents copied.  Returns null on failure, leaving the old
    /// region untouched.
    ///
    /// # Safety
    /// `p` must be a pointer previously returned by `alloc`/`realloc` of this
    /// arena with an allocation span of at least `old` bytes.
    #[inline]
    pub unsafe fn realloc(&self, p: *mut u8, old: usize, new: usize) -> *mut u8 {
        let inner = &mut *self.inner.get();
        inner.allocs += 1;
        let old_r = round_up(old);
        let new_r = round_up(new);
        if p.add(old_r) == inner.head {
            // Last allocation: try to extend in place.
            let span = inner.end as usize - p as usize;
            if new_r <= span {
                inner.head = p.add(new_r);
                return p;
            }
        }
        if inner.remaining() < new_r && !inner.grow(new_r) {
            return ptr::null_mut();
        }
        let q = inner.head;
        inner.head = inner.head.add(new_r);
        ptr::copy_nonoverlapping(p, q, old.min(new));
        q
    }

    /// Bytes remaining in the current block.
    #[inline]
    pub fn has(&self, bytes: usize) -> bool {
        self.remaining() >= bytes
    }

    /// Exact count of bytes remaining in the current block.
    #[inline]
    pub fn remaining(&self) -> usize {
        // SAFETY: read-only peek at the cursor; no aliasing hazard.
        let inner = unsafe { &*self.inner.get() };
        inner.remaining()
    }

    /// The current bump cursor.
    #[inline]
    pub fn head_ptr(&self) -> *mut u8 {
        // SAFETY: as in `has`.
        unsafe { (*self.inner.get()).head }
    }

    /// Advance the bump cursor by `bytes` without rounding.
    ///
    /// # Safety
    /// The caller must have verified `has(bytes)` and must keep the cursor
    /// 8-aligned (`bytes % 8 == 0`).
    #[inline]
    pub unsafe fn bump(&self, bytes: usize) -> *mut u8 {
        let inner = &mut *self.inner.get();
        debug_assert!(bytes % ARENA_ALIGN == 0);
        debug_assert!(inner.remaining() >= bytes);
        let p = inner.head;
        inner.head = inner.head.add(bytes);
        p
    }

    /// Number of `alloc`/`realloc` requests served so far.  Diagnostic; the
    /// bump cursor (`bump`) is not counted.
    pub fn alloc_count(&self) -> usize {
        // SAFETY: as in `has`.
        unsafe { (*self.inner.get()).allocs }
    }
}

impl Default for Arena {
    fn default() -> Self {
        Arena::new()
    }
}

impl ArenaInner {
    #[inline]
    fn remaining(&self) -> usize {
        self.end as usize - self.head as usize
    }

    /// Install a fresh zeroed block with room for at least `need` bytes.
    fn grow(&mut self, need: usize) -> bool {
        let words = round_up(need.max(self.next_size)) / 8;
        if words == 0 {
            return true;
        }
        let mut block = vec![0u64; words].into_boxed_slice();
        self.head = block.as_mut_ptr() as *mut u8;
        // SAFETY: `words * 8` bytes are owned by `block`.
        self.end = unsafe { self.head.add(words * 8) };
        self.blocks.push(block);
        self.next_size = (self.next_size * 2).min(MAX_BLOCK);
        true
    }
}

#[inline(always)]
const fn round_up(n: usize) -> usize {
    (n + (ARENA_ALIGN - 1)) & !(ARENA_ALIGN - 1)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_is_aligned() {
        let arena = Arena::new();
        for size in [1usize, 3, 8, 13, 64] {
            let p = arena.alloc(size);
            assert!(!p.is_null());
            assert_eq!(p as usize % ARENA_ALIGN, 0);
        }
    }

    #[test]
    fn consecutive_allocs_do_not_overlap() {
        let arena = Arena::new();
        let a = arena.alloc(16);
        let b = arena.alloc(16);
        unsafe {
            ptr::write_bytes(a, 0xAA, 16);
            ptr::write_bytes(b, 0xBB, 16);
            assert_eq!(*a, 0xAA);
            assert_eq!(*a.add(15), 0xAA);
            assert_eq!(*b, 0xBB);
        }
    }

    #[test]
    fn realloc_extends_last_allocation_in_place() {
        let arena = Arena::with_capacity(1024);
        let p = arena.alloc(32);
        let q = unsafe { arena.realloc(p, 32, 64) };
        assert_eq!(p, q);
    }

    #[test]
    fn realloc_copies_when_not_last() {
        let arena = Arena::with_capacity(1024);
        let p = arena.alloc(16);
        unsafe { ptr::write_bytes(p, 0x5C, 16) };
        let _hole = arena.alloc(8);
        let q = unsafe { arena.realloc(p, 16, 32) };
        assert_ne!(p, q);
        unsafe {
            for i in 0..16 {
                assert_eq!(*q.add(i), 0x5C);
            }
        }
    }

    #[test]
    fn alloc_count_tracks_requests() {
        let arena = Arena::new();
        let _ = arena.alloc(8);
        let p = arena.alloc(8);
        let _ = unsafe { arena.realloc(p, 8, 16) };
        assert_eq!(arena.alloc_count(), 3);
    }

    #[test]
    fn bump_matches_head() {
        let arena = Arena::with_capacity(256);
        assert!(arena.has(64));
        let head = arena.head_ptr();
        let p = unsafe { arena.bump(16) };
        assert_eq!(p, head);
        assert_eq!(arena.head_ptr() as usize, head as usize + 16);
    }

    #[test]
    fn spills_into_new_block() {
        let arena = Arena::with_capacity(64);
        let _ = arena.alloc(48);
        let p = arena.alloc(4096);
        assert!(!p.is_null());
        unsafe { ptr::write_bytes(p, 1, 4096) };
    }
}
