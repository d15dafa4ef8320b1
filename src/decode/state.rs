//! Decode-state record threaded through every parser call.
//!
//! The state tracks the working window `[.., end]` plus the active nesting
//! limit, expressed as a signed byte offset `limit` relative to `end` with
//! the derived absolute `limit_ptr = end + min(0, limit)`.  The reader stops
//! and consults [`DecodeState::isdone_fallback`] whenever the cursor reaches
//! `limit_ptr`.
//!
//! # The patch buffer
//!
//! Hot-path loads are allowed to overread up to [`SLOP_BYTES`] past `end`, so
//! `end` is pinned `SLOP_BYTES` before the true input end.  When the cursor
//! crosses `end` with input bytes still owed to the current scope, the
//! remaining tail is copied into a zero-padded 32-byte patch buffer and the
//! cursor re-anchored inside it.  Saved limits survive the swap because
//! scope entry/exit preserves *deltas*, not absolute pointers; `input_delta`
//! translates patch addresses back to the caller's buffer so aliased string
//! views never point at decoder-owned memory.

use core::ptr;

use crate::arena::Arena;
use crate::decode::{DecodeError, DecodeOptions};
use crate::wire::types::SLOP_BYTES;

const PATCH_BYTES: usize = 2 * SLOP_BYTES;

/// Mutable decoding state shared by the dispatch core and every parser.
pub struct DecodeState<'a> {
    /// One past the last byte the hot path may start a field at.
    pub(crate) end: *const u8,
    /// Signed offset of the active nesting limit relative to `end`.
    pub(crate) limit: isize,
    /// `end + min(0, limit)`; the cursor must not pass this without a
    /// consultation.
    pub(crate) limit_ptr: *const u8,
    /// Allocator for message records, arrays, and copied strings.
    pub(crate) arena: &'a Arena,
    /// Whether decoded string views may reference the input buffer.
    pub(crate) alias: bool,
    /// Added to a cursor to recover the corresponding address in the
    /// caller's buffer (non-zero once reading from the patch buffer).
    pub(crate) input_delta: isize,
    /// Remaining sub-record nesting budget.
    pub(crate) depth: u16,
    /// Field number of an end-group tag met in the current scope; must be
    /// zero when a sub-record scope closes.
    pub(crate) end_group: u32,
    /// First error recorded by any parser.
    pub(crate) err: Option<DecodeError>,
    /// Zero-padded staging area for the input tail.  Boxed so cursors into
    /// it survive moves of the state value itself.
    patch: Box<[u8; PATCH_BYTES]>,
}

/// Outcome of a scope-progress check.
pub(crate) enum IsDone {
    /// The cursor sits exactly on the scope limit.
    Done,
    /// More fields follow; the cursor (possibly re-anchored) is returned.
    NotDone(*const u8),
    /// The cursor overran the scope; the error is recorded on the state.
    Error,
}

impl<'a> DecodeState<'a> {
    /// Build a state over `input` and return it with the initial cursor.
    pub(crate) fn new(input: &'a [u8], arena: &'a Arena, options: &DecodeOptions) -> (Self, *const u8) {
        let mut patch = Box::new([0u8; PATCH_BYTES]);
        let (ptr, end, limit, input_delta);
        if input.len() <= SLOP_BYTES {
            // Short input: stage all of it in the patch buffer up front.
            patch[..input.len()].copy_from_slice(input);
            let base = patch.as_ptr();
            ptr = base;
            // SAFETY: `base + len` stays inside the 32-byte patch.
            end = unsafe { base.add(input.len()) };
            limit = 0;
            input_delta = (input.as_ptr() as isize).wrapping_sub(base as isize);
        } else {
            ptr = input.as_ptr();
            // SAFETY: len > SLOP_BYTES, so `end` stays inside the input.
            end = unsafe { input.as_ptr().add(input.len() - SLOP_BYTES) };
            limit = SLOP_BYTES as isize;
            input_delta = 0;
        }
        let state = DecodeState {
            end,
            limit,
            limit_ptr: end,
            arena,
            alias: options.alias,
            input_delta,
            depth: options.depth_limit,
            end_group: 0,
            err: None,
            patch,
        };
        (state, ptr)
    }

    /// Record `err` (first one wins) and return the null sentinel.
    #[cold]
    pub(crate) fn fail(&mut self, err: DecodeError) -> *const u8 {
        if self.err.is_none() {
            self.err = Some(err);
        }
        ptr::null()
    }

    #[inline(always)]
    pub(crate) fn set_limit_ptr(&mut self) {
        // SAFETY: `limit` always names a valid offset within the working
        // window (negative) or the slop region (0..=SLOP_BYTES).
        self.limit_ptr = unsafe { self.end.offset(self.limit.min(0)) };
    }

    /// Check whether the current scope is exhausted at `ptr`, re-anchoring
    /// into the patch buffer when the working window runs out first.
    #[inline(always)]
    pub(crate) unsafe fn isdone(&mut self, ptr: *const u8) -> IsDone {
        if ptr < self.limit_ptr {
            return IsDone::NotDone(ptr);
        }
        let overrun = ptr.offset_from(self.end);
        if overrun == self.limit {
            return IsDone::Done;
        }
        match self.isdone_fallback(ptr, overrun) {
            Some(p) => IsDone::NotDone(p),
            None => IsDone::Error,
        }
    }

    /// Slow path of [`isdone`]: either swap the remaining input tail into
    /// the patch buffer and continue, or record a bounds error.
    #[cold]
    pub(crate) unsafe fn isdone_fallback(&mut self, ptr: *const u8, overrun: isize) -> Option<*const u8> {
        debug_assert_eq!(overrun, ptr.offset_from(self.end));
        if overrun >= self.limit {
            // `overrun == limit` is handled by the caller, so this cursor
            // genuinely escaped its scope.
            self.err.get_or_insert(DecodeError::BoundsExceeded);
            return None;
        }
        debug_assert!(self.limit > 0 && self.limit <= SLOP_BYTES as isize);
        debug_assert!(overrun >= 0);

        // Move the live tail (`SLOP_BYTES` from `end`, all of it readable
        // input or prior patch contents) to the front of the patch buffer
        // and zero the rest.  `end` may already sit inside the patch, so the
        // copy must be overlap-safe.
        let base = self.patch.as_mut_ptr();
        ptr::copy(self.end, base, SLOP_BYTES);
        ptr::write_bytes(base.add(SLOP_BYTES), 0, PATCH_BYTES - SLOP_BYTES);

        // Translate alias targets through the relocation.
        self.input_delta = self
            .input_delta
            .wrapping_add((self.end as isize).wrapping_sub(base as isize));

        let live = self.limit;
        self.end = base.add(live as usize);
        self.limit = 0;
        self.set_limit_ptr();
        Some(base.add(overrun as usize))
    }

    /// Narrow the active limit to the `size` bytes at `ptr`, returning the
    /// delta needed to restore the enclosing limit.  `None` when the region
    /// does not fit the enclosing scope.
    #[inline(always)]
    pub(crate) unsafe fn push_limit(&mut self, ptr: *const u8, size: usize) -> Option<isize> {
        let new_limit = ptr.offset_from(self.end) + size as isize;
        if new_limit > self.limit {
            return None;
        }
        let delta = self.limit - new_limit;
        self.limit = new_limit;
        self.set_limit_ptr();
        Some(delta)
    }

    /// Restore the enclosing limit from a [`push_limit`] delta.
    #[inline(always)]
    pub(crate) fn pop_limit(&mut self, delta: isize) {
        self.limit += delta;
        self.set_limit_ptr();
    }

    /// Translate a cursor into the caller's buffer for aliased views.
    #[inline(always)]
    pub(crate) fn alias_ptr(&self, ptr: *const u8) -> *const u8 {
        ptr.wrapping_offset(self.input_delta)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> DecodeOptions {
        DecodeOptions::default()
    }

    fn assert_invariant(d: &DecodeState<'_>) {
        let expect = unsafe { d.end.offset(d.limit.min(0)) };
        assert_eq!(d.limit_ptr, expect);
    }

    #[test]
    fn long_input_leaves_slop_behind_end() {
        let buf = vec![7u8; 100];
        let arena = Arena::new();
        let (d, ptr) = DecodeState::new(&buf, &arena, &opts());
        assert_eq!(ptr, buf.as_ptr());
        assert_eq!(d.end as usize, buf.as_ptr() as usize + 100 - SLOP_BYTES);
        assert_eq!(d.limit, SLOP_BYTES as isize);
        assert_invariant(&d);
    }

    #[test]
    fn short_input_is_staged_in_patch() {
        let buf = vec![1u8, 2, 3];
        let arena = Arena::new();
        let (d, ptr) = DecodeState::new(&buf, &arena, &opts());
        assert_ne!(ptr, buf.as_ptr());
        assert_eq!(unsafe { *ptr }, 1);
        assert_eq!(d.limit, 0);
        // Translation recovers the caller's addresses.
        assert_eq!(d.alias_ptr(ptr), buf.as_ptr());
        assert_invariant(&d);
    }

    #[test]
    fn isdone_swaps_tail_into_patch() {
        let buf: Vec<u8> = (0u8..40).collect();
        let arena = Arena::new();
        let (mut d, mut ptr) = DecodeState::new(&buf, &arena, &opts());
        // Walk to two bytes shy of the true input end.
        ptr = unsafe { ptr.add(38) };
        match unsafe { d.isdone(ptr) } {
            IsDone::NotDone(p) => ptr = p,
            _ => panic!("expected a re-anchored cursor"),
        }
        assert_invariant(&d);
        // Both remaining bytes survive the swap and translate back.
        assert_eq!(unsafe { *ptr }, 38);
        assert_eq!(unsafe { *ptr.add(1) }, 39);
        assert_eq!(d.alias_ptr(ptr), unsafe { buf.as_ptr().add(38) });
        // Consuming them lands exactly on the limit.
        ptr = unsafe { ptr.add(2) };
        assert!(matches!(unsafe { d.isdone(ptr) }, IsDone::Done));
    }

    #[test]
    fn overrun_past_limit_is_an_error() {
        let buf = vec![0u8; 8];
        let arena = Arena::new();
        let (mut d, ptr) = DecodeState::new(&buf, &arena, &opts());
        let past = unsafe { ptr.add(9) };
        assert!(matches!(unsafe { d.isdone(past) }, IsDone::Error));
        assert_eq!(d.err, Some(DecodeError::BoundsExceeded));
    }

    #[test]
    fn push_pop_limit_preserves_invariant() {
        let buf = vec![0u8; 64];
        let arena = Arena::new();
        let (mut d, ptr) = DecodeState::new(&buf, &arena, &opts());
        let delta = unsafe { d.push_limit(ptr, 10) }.unwrap();
        assert_invariant(&d);
        assert_eq!(d.limit_ptr, unsafe { ptr.add(10) });
        d.pop_limit(delta);
        assert_invariant(&d);
        assert_eq!(d.limit, SLOP_BYTES as isize);
    }

    #[test]
    fn push_limit_rejects_oversized_region() {
        let buf = vec![0u8; 32];
        let arena = Arena::new();
        let (mut d, ptr) = DecodeState::new(&buf, &arena, &opts());
        assert!(unsafe { d.push_limit(ptr, 33) }.is_none());
    }
}
