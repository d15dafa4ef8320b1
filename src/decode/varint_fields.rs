//! Varint field parsers: {singular, oneof, repeated, packed} ×
//! {bool, 32/64-bit, 32/64-bit zigzag} × {1-byte tag, 2-byte tag}.
//!
//! One generic core handles the unpacked cardinalities and one the packed
//! region; the exported entry points at the bottom are pinned instantiations
//! so the cores inline into each leaf while the leaves themselves stay
//! distinct functions in the dispatch table.
//!
//! A repeated slot hit with the length-delimited wiretype (or a packed slot
//! hit with per-element tags) flips the wiretype bit and retries the sibling
//! core, so both encodings of a repeated field decode through the same slot.

use crate::decode::field::{
    commit, get_field, grow_run, next_repeated, RunNext, RunState, CARD_O, CARD_P, CARD_R, CARD_S,
};
use crate::decode::generic::fallback;
use crate::decode::scope;
use crate::decode::state::{DecodeState, IsDone};
use crate::decode::DecodeError;
use crate::layout::DispatchTable;
use crate::wire::types::{tag_mask, unzigzag32, unzigzag64, wiretype};
use crate::wire::varint::{decode_longsize, decode_varint};

/// Wiretype bit flip between the per-element and packed encodings.
const FLIP: u64 = (wiretype::LEN ^ wiretype::VARINT) as u64;

/// Post-read transformation: bools collapse to 0/1, zigzag undoes the
/// signed mapping, everything else passes through.
#[inline(always)]
fn munge_varint<const VALBYTES: usize, const ZIGZAG: bool, const BOOLEAN: bool>(val: u64) -> u64 {
    if BOOLEAN {
        (val != 0) as u64
    } else if ZIGZAG {
        if VALBYTES == 8 {
            unzigzag64(val)
        } else {
            unzigzag32(val as u32) as u64
        }
    } else {
        val
    }
}

/// Store the low `valbytes` bytes of `val` at `dst`.
///
/// # Safety
/// `dst` must be writable for `valbytes` bytes.
#[inline(always)]
unsafe fn store_varint(dst: *mut u8, val: u64, valbytes: usize) {
    match valbytes {
        1 => *dst = val as u8,
        4 => (dst as *mut u32).write_unaligned(val as u32),
        _ => (dst as *mut u64).write_unaligned(val),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Unpacked core (singular / oneof / repeated)
// ─────────────────────────────────────────────────────────────────────────────

#[inline(always)]
unsafe fn varint_core<
    const VALBYTES: usize,
    const ZIGZAG: bool,
    const BOOLEAN: bool,
    const TAGBYTES: usize,
    const CARD: u8,
>(
    d: &mut DecodeState,
    mut ptr: *const u8,
    msg: *mut u8,
    table: &DispatchTable,
    hasbits: &mut u64,
    mut data: u64,
) -> *const u8 {
    let mask = tag_mask(TAGBYTES);
    if data & mask != 0 {
        if CARD == CARD_R && (data ^ FLIP) & mask == 0 {
            // The sender packed this repeated field.
            return packed_varint_core::<VALBYTES, ZIGZAG, BOOLEAN, TAGBYTES>(
                d,
                ptr,
                msg,
                table,
                hasbits,
                data ^ FLIP,
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
        let val = match decode_varint(&mut ptr) {
            Some(v) => v,
            None => return d.fail(DecodeError::MalformedVarint),
        };
        store_varint(dst, munge_varint::<VALBYTES, ZIGZAG, BOOLEAN>(val), VALBYTES);
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
unsafe fn packed_varint_core<
    const VALBYTES: usize,
    const ZIGZAG: bool,
    const BOOLEAN: bool,
    const TAGBYTES: usize,
>(
    d: &mut DecodeState,
    mut ptr: *const u8,
    msg: *mut u8,
    table: &DispatchTable,
    hasbits: &mut u64,
    mut data: u64,
) -> *const u8 {
    let mask = tag_mask(TAGBYTES);
    if data & mask != 0 {
        if (data ^ FLIP) & mask == 0 {
            // Per-element tags on a packed slot: retry unpacked.
            return varint_core::<VALBYTES, ZIGZAG, BOOLEAN, TAGBYTES, CARD_R>(
                d,
                ptr,
                msg,
                table,
                hasbits,
                data ^ FLIP,
            );
        }
        return fallback(d, ptr, msg, table, hasbits, 0);
    }
    let mut run = RunState::empty();
    let mut dst = get_field::<CARD_P>(d, ptr, msg, &mut data, hasbits, &mut run, VALBYTES);
    if dst.is_null() {
        return d.fail(DecodeError::AllocationFailed);
    }
    ptr = ptr.add(TAGBYTES);
    let mut size = *ptr as u64;
    ptr = ptr.add(1);
    if size >= 0x80 && !decode_longsize(&mut ptr, &mut size) {
        return d.fail(DecodeError::MalformedVarint);
    }
    let scope = match scope::enter(d, ptr, size as usize) {
        Some(s) => s,
        None => return d.fail(DecodeError::InvalidLimit),
    };
    loop {
        match d.isdone(ptr) {
            IsDone::Done => break,
            IsDone::Error => return core::ptr::null(),
            IsDone::NotDone(p) => ptr = p,
        }
        if dst == run.cap_end {
            dst = grow_run(d, &mut run, dst, VALBYTES);
            if dst.is_null() {
                return core::ptr::null();
            }
        }
        let val = match decode_varint(&mut ptr) {
            Some(v) => v,
            None => return d.fail(DecodeError::MalformedVarint),
        };
        store_varint(dst, munge_varint::<VALBYTES, ZIGZAG, BOOLEAN>(val), VALBYTES);
        dst = dst.add(VALBYTES);
    }
    commit(&run, dst, VALBYTES);
    scope::leave(d, scope);
    ptr
}

// ─────────────────────────────────────────────────────────────────────────────
// Exported matrix entries
//
// Naming: p{cardinality}{type}{valbytes}_{tagbytes}bt, cardinality in
// {s,o,r,p}, type in {b,v,z}.
// ─────────────────────────────────────────────────────────────────────────────

macro_rules! varint_parser {
    ($name:ident, $valbytes:literal, $zig:literal, $bool:literal, $tagbytes:literal, $card:expr) => {
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
            varint_core::<$valbytes, $zig, $bool, $tagbytes, { $card }>(
                d, ptr, msg, table, hasbits, data,
            )
        }
    };
}

macro_rules! packed_varint_parser {
    ($name:ident, $valbytes:literal, $zig:literal, $bool:literal, $tagbytes:literal) => {
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
            packed_varint_core::<$valbytes, $zig, $bool, $tagbytes>(
                d, ptr, msg, table, hasbits, data,
            )
        }
    };
}

// bool
varint_parser!(psb1_1bt, 1, false, true, 1, CARD_S);
varint_parser!(psb1_2bt, 1, false, true, 2, CARD_S);
varint_parser!(pob1_1bt, 1, false, true, 1, CARD_O);
varint_parser!(pob1_2bt, 1, false, true, 2, CARD_O);
varint_parser!(prb1_1bt, 1, false, true, 1, CARD_R);
varint_parser!(prb1_2bt, 1, false, true, 2, CARD_R);
packed_varint_parser!(ppb1_1bt, 1, false, true, 1);
packed_varint_parser!(ppb1_2bt, 1, false, true, 2);

// 32-bit varint
varint_parser!(psv4_1bt, 4, false, false, 1, CARD_S);
varint_parser!(psv4_2bt, 4, false, false, 2, CARD_S);
varint_parser!(pov4_1bt, 4, false, false, 1, CARD_O);
varint_parser!(pov4_2bt, 4, false, false, 2, CARD_O);
varint_parser!(prv4_1bt, 4, false, false, 1, CARD_R);
varint_parser!(prv4_2bt, 4, false, false, 2, CARD_R);
packed_varint_parser!(ppv4_1bt, 4, false, false, 1);
packed_varint_parser!(ppv4_2bt, 4, false, false, 2);

// 64-bit varint
varint_parser!(psv8_1bt, 8, false, false, 1, CARD_S);
varint_parser!(psv8_2bt, 8, false, false, 2, CARD_S);
varint_parser!(pov8_1bt, 8, false, false, 1, CARD_O);
varint_parser!(pov8_2bt, 8, false, false, 2, CARD_O);
varint_parser!(prv8_1bt, 8, false, false, 1, CARD_R);
varint_parser!(prv8_2bt, 8, false, false, 2, CARD_R);
packed_varint_parser!(ppv8_1bt, 8, false, false, 1);
packed_varint_parser!(ppv8_2bt, 8, false, false, 2);

// 32-bit zigzag
varint_parser!(psz4_1bt, 4, true, false, 1, CARD_S);
varint_parser!(psz4_2bt, 4, true, false, 2, CARD_S);
varint_parser!(poz4_1bt, 4, true, false, 1, CARD_O);
varint_parser!(poz4_2bt, 4, true, false, 2, CARD_O);
varint_parser!(prz4_1bt, 4, true, false, 1, CARD_R);
varint_parser!(prz4_2bt, 4, true, false, 2, CARD_R);
packed_varint_parser!(ppz4_1bt, 4, true, false, 1);
packed_varint_parser!(ppz4_2bt, 4, true, false, 2);

// 64-bit zigzag
varint_parser!(psz8_1bt, 8, true, false, 1, CARD_S);
varint_parser!(psz8_2bt, 8, true, false, 2, CARD_S);
varint_parser!(poz8_1bt, 8, true, false, 1, CARD_O);
varint_parser!(poz8_2bt, 8, true, false, 2, CARD_O);
varint_parser!(prz8_1bt, 8, true, false, 1, CARD_R);
varint_parser!(prz8_2bt, 8, true, false, 2, CARD_R);
packed_varint_parser!(ppz8_1bt, 8, true, false, 1);
packed_varint_parser!(ppz8_2bt, 8, true, false, 2);

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn munge_collapses_bools() {
        assert_eq!(munge_varint::<1, false, true>(0), 0);
        assert_eq!(munge_varint::<1, false, true>(1), 1);
        assert_eq!(munge_varint::<1, false, true>(0xFF00), 1);
    }

    #[test]
    fn munge_zigzag_widths() {
        assert_eq!(munge_varint::<4, true, false>(3) as u32 as i32, -2);
        assert_eq!(munge_varint::<8, true, false>(3) as i64, -2);
        // 32-bit zigzag ignores garbage above bit 31.
        assert_eq!(munge_varint::<4, true, false>(0x1_0000_0002), 1);
    }

    #[test]
    fn store_widths() {
        let mut buf = [0u8; 8];
        unsafe {
            store_varint(buf.as_mut_ptr(), 0x0102_0304_0506_0708, 8);
            assert_eq!(u64::from_ne_bytes(buf), 0x0102_0304_0506_0708);
            store_varint(buf.as_mut_ptr(), 0xAABB_CCDD_1122_3344, 4);
            let lo = u32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]);
            assert_eq!(lo, 0x1122_3344);
        }
    }
}
