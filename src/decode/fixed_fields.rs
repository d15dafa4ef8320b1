//! Fixed-width field parsers: {singular, oneof, repeated, packed} ×
//! {4-byte, 8-byte} × {1-byte tag, 2-byte tag}.
//!
//! The value path is a verbatim little-endian load of `valbytes` bytes.  The
//! packed form validates that the region tiles exactly, sizes the array in
//! one shot, and performs a single bulk copy.

use crate::decode::field::{
    get_field, grow_run, next_repeated, reserve_run, RunNext, RunState, CARD_O, CARD_P, CARD_R,
    CARD_S,
};
use crate::decode::generic::fallback;
use crate::decode::scope;
use crate::decode::state::DecodeState;
use crate::decode::DecodeError;
use crate::layout::DispatchTable;
use crate::wire::types::{copy_fixed, tag_mask, wiretype};
use crate::wire::varint::decode_longsize;

/// Wiretype flip between the packed region and per-element fixed tags,
/// parameterised on the value width (I32 and I64 sit at different bit
/// distances from LEN).
#[inline(always)]
const fn flip(valbytes: usize) -> u64 {
    if valbytes == 4 {
        (wiretype::LEN ^ wiretype::FIXED32) as u64
    } else {
        (wiretype::LEN ^ wiretype::FIXED64) as u64
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Unpacked core
// ─────────────────────────────────────────────────────────────────────────────

#[inline(always)]
unsafe fn fixed_core<const VALBYTES: usize, const TAGBYTES: usize, const CARD: u8>(
    d: &mut DecodeState,
    mut ptr: *const u8,
    msg: *mut u8,
    table: &DispatchTable,
    hasbits: &mut u64,
    mut data: u64,
) -> *const u8 {
    let mask = tag_mask(TAGBYTES);
    if data & mask != 0 {
        if CARD == CARD_R && (data ^ flip(VALBYTES)) & mask == 0 {
            return packed_fixed_core::<VALBYTES, TAGBYTES>(
                d,
                ptr,
                msg,
                table,
                hasbits,
                data ^ flip(VALBYTES),
            );
        }
        return fallback(d, ptr, msg, table, hasbits, 0);
    }
    let mut run = RunState::empty();
    let mut dst = get_field::<CARD>(d, ptr, msg, &mut data, hasbits, &mut run, VALBYTES);
    if CARD == CARD_R && dst.is_null() {
        return d.fail(DecodeError::AllocationFailed);
    }
    let expected = data;
    loop {
        if CARD == CARD_R && dst == run.cap_end {
            dst = grow_run(d, &mut run, dst, VALBYTES);
            if dst.is_null() {
                return core::ptr::null();
            }
        }
        ptr = ptr.add(TAGBYTES);
        copy_fixed(dst, ptr, VALBYTES);
        ptr = ptr.add(VALBYTES);
        if CARD != CARD_R {
            return ptr;
        }
        dst = dst.add(VALBYTES);
        match next_repeated(d, ptr, dst, &run, expected, mask, VALBYTES) {
            RunNext::Same(p) => ptr = p,
            RunNext::Other(p) | RunNext::AtLimit(p) => return p,
            RunNext::Error => return core::ptr::null(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Packed core
// ─────────────────────────────────────────────────────────────────────────────

#[inline(always)]
unsafe fn packed_fixed_core<const VALBYTES: usize, const TAGBYTES: usize>(
    d: &mut DecodeState,
    mut ptr: *const u8,
    msg: *mut u8,
    table: &DispatchTable,
    hasbits: &mut u64,
    mut data: u64,
) -> *const u8 {
    let mask = tag_mask(TAGBYTES);
    if data & mask != 0 {
        if (data ^ flip(VALBYTES)) & mask == 0 {
            return fixed_core::<VALBYTES, TAGBYTES, CARD_R>(
                d,
                ptr,
                msg,
                table,
                hasbits,
                data ^ flip(VALBYTES),
            );
        }
        return fallback(d, ptr, msg, table, hasbits, 0);
    }
    let mut run = RunState::empty();
    let dst = get_field::<CARD_P>(d, ptr, msg, &mut data, hasbits, &mut run, VALBYTES);
    if dst.is_null() {
        return d.fail(DecodeError::AllocationFailed);
    }
    ptr = ptr.add(TAGBYTES);
    let mut size = *ptr as u64;
    ptr = ptr.add(1);
    if size >= 0x80 && !decode_longsize(&mut ptr, &mut size) {
        return d.fail(DecodeError::MalformedVarint);
    }
    let size = size as usize;
    if size % VALBYTES != 0 {
        // The region cannot tile into whole elements; the final partial
        // element would read past the region's limit.
        return d.fail(DecodeError::BoundsExceeded);
    }
    let scope = match scope::enter(d, ptr, size) {
        Some(s) => s,
        None => return d.fail(DecodeError::InvalidLimit),
    };
    let count = size / VALBYTES;
    if !reserve_run(d, &mut run, count, VALBYTES) {
        return core::ptr::null();
    }
    let arr = run.arr;
    let dst = (*arr).data_ptr().add(((*arr).len as usize) * VALBYTES);
    #[cfg(target_endian = "little")]
    core::ptr::copy_nonoverlapping(ptr, dst, size);
    #[cfg(not(target_endian = "little"))]
    for i in 0..count {
        copy_fixed(dst.add(i * VALBYTES), ptr.add(i * VALBYTES), VALBYTES);
    }
    (*arr).len += count as u32;
    ptr = ptr.add(size);
    scope::leave(d, scope);
    ptr
}

// ─────────────────────────────────────────────────────────────────────────────
// Exported matrix entries: p{s,o,r,p}f{4,8}_{1,2}bt
// ─────────────────────────────────────────────────────────────────────────────

macro_rules! fixed_parser {
    ($name:ident, $valbytes:literal, $tagbytes:literal, $card:expr) => {
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
            fixed_core::<$valbytes, $tagbytes, { $card }>(d, ptr, msg, table, hasbits, data)
        }
    };
}

macro_rules! packed_fixed_parser {
    ($name:ident, $valbytes:literal, $tagbytes:literal) => {
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
            packed_fixed_core::<$valbytes, $tagbytes>(d, ptr, msg, table, hasbits, data)
        }
    };
}

fixed_parser!(psf4_1bt, 4, 1, CARD_S);
fixed_parser!(psf4_2bt, 4, 2, CARD_S);
fixed_parser!(pof4_1bt, 4, 1, CARD_O);
fixed_parser!(pof4_2bt, 4, 2, CARD_O);
fixed_parser!(prf4_1bt, 4, 1, CARD_R);
fixed_parser!(prf4_2bt, 4, 2, CARD_R);
packed_fixed_parser!(ppf4_1bt, 4, 1);
packed_fixed_parser!(ppf4_2bt, 4, 2);

fixed_parser!(psf8_1bt, 8, 1, CARD_S);
fixed_parser!(psf8_2bt, 8, 2, CARD_S);
fixed_parser!(pof8_1bt, 8, 1, CARD_O);
fixed_parser!(pof8_2bt, 8, 2, CARD_O);
fixed_parser!(prf8_1bt, 8, 1, CARD_R);
fixed_parser!(prf8_2bt, 8, 2, CARD_R);
packed_fixed_parser!(ppf8_1bt, 8, 1);
packed_fixed_parser!(ppf8_2bt, 8, 2);

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flip_constants_match_wiretype_pairs() {
        // I32 (5) vs LEN (2) differ in three bits, I64 (1) vs LEN in two.
        assert_eq!(flip(4), 7);
        assert_eq!(flip(8), 3);
    }
}
