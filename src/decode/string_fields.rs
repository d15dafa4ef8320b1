//! String/bytes field parsers: {singular, oneof, repeated} ×
//! {alias family, copy family} × {1-byte tag, 2-byte tag}.
//!
//! The alias family installs views straight into the input buffer and is
//! only effective while the state says the buffer outlives the message; it
//! re-checks that on every fused-run iteration and degrades to the copy
//! family otherwise.  The copy family runs the short-string cascade: strings
//! are copied with one of four hard-coded power-of-two widths, trading a few
//! defined-but-unused tail bytes for a fixed-width copy.  The smallest case
//! starts the copy at the tag byte itself — those bytes were just read, so
//! the source window is known readable.

use crate::decode::field::{
    commit, get_field, grow_run, next_repeated, RunNext, RunState, CARD_O, CARD_R, CARD_S,
};
use crate::decode::generic::fallback;
use crate::decode::state::DecodeState;
use crate::decode::DecodeError;
use crate::layout::DispatchTable;
use crate::wire::types::{poison_region, tag_mask, StringView};
use crate::wire::varint::decode_longsize;

/// Element width of a string view in a message record or repeated array.
const VIEW_BYTES: usize = core::mem::size_of::<StringView>();

// ─────────────────────────────────────────────────────────────────────────────
// Generic core
// ─────────────────────────────────────────────────────────────────────────────

#[inline(always)]
unsafe fn string_core<const TAGBYTES: usize, const CARD: u8, const COPY: bool>(
    d: &mut DecodeState,
    mut ptr: *const u8,
    msg: *mut u8,
    table: &DispatchTable,
    hasbits: &mut u64,
    mut data: u64,
) -> *const u8 {
    let mask = tag_mask(TAGBYTES);
    if data & mask != 0 {
        return fallback(d, ptr, msg, table, hasbits, 0);
    }
    if !COPY && !d.alias {
        // The input buffer is not stable; the copy family owns this field.
        return string_core::<TAGBYTES, CARD, true>(d, ptr, msg, table, hasbits, data);
    }
    let mut run = RunState::empty();
    let mut dst =
        get_field::<CARD>(d, ptr, msg, &mut data, hasbits, &mut run, VIEW_BYTES) as *mut StringView;
    if CARD == CARD_R && dst.is_null() {
        return d.fail(DecodeError::AllocationFailed);
    }
    let expected = data;
    loop {
        if CARD == CARD_R && dst as *mut u8 == run.cap_end {
            dst = grow_run(d, &mut run, dst as *mut u8, VIEW_BYTES) as *mut StringView;
            if dst.is_null() {
                return core::ptr::null();
            }
        }
        ptr = ptr.add(TAGBYTES);
        let size = *ptr as usize;
        ptr = ptr.add(1);
        if COPY {
            ptr = copy_string::<TAGBYTES>(d, ptr, size, dst);
        } else {
            // Alias fast path: a one-byte length whose payload sits inside
            // the working window (lax check; scope overruns surface at the
            // next limit consultation).
            if size < 0x80 && !crate::wire::types::bounds_exceeded_lax(ptr, size, d.end) {
                *dst = StringView {
                    data: d.alias_ptr(ptr),
                    size,
                };
                ptr = ptr.add(size);
            } else {
                ptr = longstring::<false>(d, ptr, size as u64, dst);
            }
        }
        if ptr.is_null() {
            return core::ptr::null();
        }
        if CARD != CARD_R {
            return ptr;
        }
        dst = dst.add(1);
        match next_repeated(d, ptr, dst as *mut u8, &run, expected, mask, VIEW_BYTES) {
            RunNext::Same(p) => {
                ptr = p;
                if !COPY && !d.alias {
                    // The buffer was swapped mid-run; commit and let the
                    // dispatch hop land in the copy family.
                    commit(&run, dst as *mut u8, VIEW_BYTES);
                    return ptr;
                }
            }
            RunNext::Other(p) | RunNext::AtLimit(p) => return p,
            RunNext::Error => return core::ptr::null(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Copy cascade
// ─────────────────────────────────────────────────────────────────────────────

/// Copy `size` string bytes at `ptr` into the arena with a fixed-width
/// block, falling back to [`longstring`] when the string is long, the length
/// byte carried a continuation bit, or either the arena or the input lacks
/// headroom for the over-wide copy.  Returns the cursor past the payload, or
/// null with the error recorded.
#[inline(always)]
unsafe fn copy_string<const TAGBYTES: usize>(
    d: &mut DecodeState,
    ptr: *const u8,
    size: usize,
    dst: *mut StringView,
) -> *const u8 {
    let arena_room = d.arena.remaining();
    // Input headroom: bytes to the active limit plus the readable slop.
    let input_room = (d.limit_ptr as isize).wrapping_sub(ptr as isize) + 16;
    let common = arena_room.min(input_room.max(0) as usize);

    if size <= 15 - TAGBYTES {
        if arena_room < 16 {
            return longstring::<true>(d, ptr, size as u64, dst);
        }
        // Copy one 16-byte block starting at the tag: tag bytes plus length
        // byte plus up to 15 − tagbytes payload bytes — all just read.
        let block = d.arena.bump(16);
        core::ptr::copy_nonoverlapping(ptr.sub(TAGBYTES + 1), block, 16);
        poison_region(block.add(TAGBYTES + 1 + size), 15 - TAGBYTES - size);
        *dst = StringView {
            data: block.add(TAGBYTES + 1),
            size,
        };
        ptr.add(size)
    } else if size <= 32 {
        copy_block(d, ptr, size, 32, common, dst)
    } else if size <= 64 {
        copy_block(d, ptr, size, 64, common, dst)
    } else if size < 128 {
        copy_block(d, ptr, size, 128, common, dst)
    } else {
        longstring::<true>(d, ptr, size as u64, dst)
    }
}

#[inline(always)]
unsafe fn copy_block(
    d: &mut DecodeState,
    ptr: *const u8,
    size: usize,
    copy: usize,
    common: usize,
    dst: *mut StringView,
) -> *const u8 {
    if common < copy {
        return longstring::<true>(d, ptr, size as u64, dst);
    }
    let block = d.arena.bump(copy);
    core::ptr::copy_nonoverlapping(ptr, block, copy);
    poison_region(block.add(size), copy - size);
    *dst = StringView { data: block, size };
    ptr.add(size)
}

// ─────────────────────────────────────────────────────────────────────────────
// Long strings
// ─────────────────────────────────────────────────────────────────────────────

/// Slow path: re-derive the full length (the fast read kept only one byte),
/// bounds-check the payload against the active limit, and either allocate
/// exactly `size` bytes or alias.  Returns null with the error recorded.
#[inline(never)]
unsafe fn longstring<const COPY: bool>(
    d: &mut DecodeState,
    ptr: *const u8,
    raw_size: u64,
    dst: *mut StringView,
) -> *const u8 {
    let mut ptr = ptr;
    let mut size = raw_size;
    if size >= 0x80 && !decode_longsize(&mut ptr, &mut size) {
        return d.fail(DecodeError::MalformedVarint);
    }
    let size = size as usize;
    // SAFETY: both cursors live in the current working allocation.
    let rel = ptr.offset_from(d.end) + size as isize;
    if rel > d.limit {
        return d.fail(DecodeError::BoundsExceeded);
    }
    if COPY || !d.alias {
        let block = d.arena.alloc(size);
        if block.is_null() {
            return d.fail(DecodeError::AllocationFailed);
        }
        core::ptr::copy_nonoverlapping(ptr, block, size);
        *dst = StringView { data: block, size };
    } else {
        *dst = StringView {
            data: d.alias_ptr(ptr),
            size,
        };
    }
    ptr.add(size)
}

// ─────────────────────────────────────────────────────────────────────────────
// Exported matrix entries
//
// Alias family p{s,o,r}s_{1,2}bt, copy family c{s,o,r}s_{1,2}bt.
// ─────────────────────────────────────────────────────────────────────────────

macro_rules! string_parser {
    ($name:ident, $tagbytes:literal, $card:expr, $copy:literal) => {
        #[doc(hidden)]
        #[inline(never)]
        pub unsafe fn $name(
            d: &mut DecodeState,
            ptr: *const u8,
            msg: *mut u8,
            table: &DispatchTable,
            hasbits: &mut u64,
            data: u64,
        ) -> *const u8 {
            string_core::<$tagbytes, { $card }, $copy>(d, ptr, msg, table, hasbits, data)
        }
    };
}

string_parser!(pss_1bt, 1, CARD_S, false);
string_parser!(pss_2bt, 2, CARD_S, false);
string_parser!(pos_1bt, 1, CARD_O, false);
string_parser!(pos_2bt, 2, CARD_O, false);
string_parser!(prs_1bt, 1, CARD_R, false);
string_parser!(prs_2bt, 2, CARD_R, false);

string_parser!(css_1bt, 1, CARD_S, true);
string_parser!(css_2bt, 2, CARD_S, true);
string_parser!(cos_1bt, 1, CARD_O, true);
string_parser!(cos_2bt, 2, CARD_O, true);
string_parser!(crs_1bt, 1, CARD_R, true);
string_parser!(crs_2bt, 2, CARD_R, true);
