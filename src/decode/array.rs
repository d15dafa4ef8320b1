//! Repeated-field array: header plus contiguous element storage.
//!
//! The header's data pointer is tagged with the element-size log₂ in its low
//! three bits (storage is always 8-aligned, so the bits are free).  `len`
//! counts committed elements and is only updated at run end by the commit
//! helper; capacity grows by doubling through the arena.

use core::mem::size_of;
use core::ptr;

use crate::arena::Arena;

/// Header of a repeated-field array.  Field slots in a message record hold a
/// pointer to this header, created on the first element.
#[repr(C)]
pub struct RepArray {
    /// Tagged storage pointer: low 3 bits hold the element-size log₂.
    data: usize,
    /// Committed element count.
    pub len: u32,
    /// Allocated element capacity.
    pub cap: u32,
}

impl RepArray {
    /// Allocate a header plus storage for `cap` elements of size
    /// `1 << elem_lg2` in one arena block.  Null on allocation failure.
    pub(crate) fn new(arena: &Arena, cap: u32, elem_lg2: u32) -> *mut RepArray {
        debug_assert!(elem_lg2 <= 4);
        let bytes = size_of::<RepArray>() + ((cap as usize) << elem_lg2);
        let p = arena.alloc(bytes);
        if p.is_null() {
            return ptr::null_mut();
        }
        let arr = p as *mut RepArray;
        // SAFETY: `p` spans header + storage; storage begins past the header
        // and inherits the arena's 8-alignment.
        unsafe {
            (*arr).data = (p.add(size_of::<RepArray>()) as usize) | elem_lg2 as usize;
            (*arr).len = 0;
            (*arr).cap = cap;
        }
        arr
    }

    /// Element-size log₂ carried in the tagged pointer.
    #[inline(always)]
    pub fn elem_lg2(&self) -> u32 {
        (self.data & 7) as u32
    }

    /// Start of element storage.
    #[inline(always)]
    pub fn data_ptr(&self) -> *mut u8 {
        (self.data & !7) as *mut u8
    }

    /// Grow storage to `new_cap` elements.  Returns `false` on allocation
    /// failure (the array is left untouched).
    ///
    /// # Safety
    /// `arr` must be a live header allocated from `arena`.
    pub(crate) unsafe fn grow(arr: *mut RepArray, arena: &Arena, new_cap: u32) -> bool {
        let lg2 = (*arr).elem_lg2();
        let old_bytes = ((*arr).cap as usize) << lg2;
        let new_bytes = (new_cap as usize) << lg2;
        let p = arena.realloc((*arr).data_ptr(), old_bytes, new_bytes);
        if p.is_null() {
            return false;
        }
        (*arr).data = (p as usize) | lg2 as usize;
        (*arr).cap = new_cap;
        true
    }

    /// View the committed elements.
    ///
    /// # Safety
    /// `T` must match the element type the array was created for, and the
    /// arena must outlive `'a`.
    #[inline]
    pub unsafe fn elements<'a, T>(&self) -> &'a [T] {
        debug_assert_eq!(size_of::<T>(), 1usize << self.elem_lg2());
        core::slice::from_raw_parts(self.data_ptr() as *const T, self.len as usize)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_pointer_round_trips() {
        let arena = Arena::new();
        for lg2 in 0..=4u32 {
            let arr = RepArray::new(&arena, 8, lg2);
            assert!(!arr.is_null());
            let a = unsafe { &*arr };
            assert_eq!(a.elem_lg2(), lg2);
            assert_eq!(a.data_ptr() as usize % 8, 0);
            assert_eq!(a.len, 0);
            assert_eq!(a.cap, 8);
        }
    }

    #[test]
    fn grow_preserves_contents() {
        let arena = Arena::new();
        let arr = RepArray::new(&arena, 4, 2);
        unsafe {
            let data = (*arr).data_ptr() as *mut u32;
            for i in 0..4 {
                data.add(i).write(i as u32 * 11);
            }
            (*arr).len = 4;
            assert!(RepArray::grow(arr, &arena, 8));
            assert_eq!((*arr).cap, 8);
            let grown: &[u32] = (*arr).elements();
            assert_eq!(grown, &[0, 11, 22, 33]);
        }
    }
}
