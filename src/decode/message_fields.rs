//! Sub-record field parsers: {singular, oneof, repeated} × {size ceilings
//! 64/128/192/256/unbounded} × {1-byte tag, 2-byte tag}.
//!
//! The ceiling is a compile-time bound on the child record's size chosen by
//! the layout builder.  When the arena has at least `CEIL` bytes of headroom
//! the child is carved straight off the bump cursor with a constant-size
//! memset; otherwise the general allocator runs.  Nesting is gated by the
//! state's depth budget, restored on every normal exit (an error unwinds the
//! whole decode, so no restoration happens on that path).

use crate::decode::dispatch::{dispatch, flush_hasbits};
use crate::decode::field::{
    get_field, grow_run, next_repeated, RunNext, RunState, CARD_O, CARD_R, CARD_S,
};
use crate::decode::generic::fallback;
use crate::decode::scope;
use crate::decode::state::DecodeState;
use crate::decode::DecodeError;
use crate::layout::DispatchTable;
use crate::wire::types::{poison_region, tag_mask};
use crate::wire::varint::decode_longsize;

/// Element width of a sub-record pointer in a record or repeated array.
const PTR_BYTES: usize = core::mem::size_of::<*mut u8>();

/// Allocate and zero a child record, taking the bump shortcut when the
/// ceiling and arena headroom allow a constant-size memset.
#[inline(always)]
unsafe fn new_submsg<const CEIL: usize>(d: &mut DecodeState, table: &DispatchTable) -> *mut u8 {
    let size = table.size as usize;
    if CEIL > 0 && size <= CEIL && d.arena.has(CEIL) {
        let p = d.arena.bump(size);
        core::ptr::write_bytes(p, 0, CEIL);
        poison_region(p.add(size), CEIL - size);
        return p;
    }
    let p = d.arena.alloc(size);
    if p.is_null() {
        return p;
    }
    core::ptr::write_bytes(p, 0, size);
    p
}

// ─────────────────────────────────────────────────────────────────────────────
// Generic core
// ─────────────────────────────────────────────────────────────────────────────

#[inline(always)]
unsafe fn submsg_core<const TAGBYTES: usize, const CARD: u8, const CEIL: usize>(
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
    if d.depth == 0 {
        return d.fail(DecodeError::RecursionLimit);
    }
    d.depth -= 1;
    let subtable = table.submsg(((data >> 16) & 0xFF) as usize);
    // A oneof slot may hold another member's bits; only reuse the stored
    // pointer when the case word already names this field.
    let oneof_case_live = CARD == CARD_O && {
        let case_ofs = ((data >> 32) & 0xFFFF) as usize;
        (msg.add(case_ofs) as *const u32).read_unaligned() == ((data >> 24) & 0xFF) as u32
    };
    let mut run = RunState::empty();
    let mut dst =
        get_field::<CARD>(d, ptr, msg, &mut data, hasbits, &mut run, PTR_BYTES) as *mut *mut u8;
    if CARD == CARD_R && dst.is_null() {
        return d.fail(DecodeError::AllocationFailed);
    }
    if CARD == CARD_S || CARD == CARD_O {
        // Presence must be visible before recursion can allocate or fail.
        flush_hasbits(msg, hasbits);
    }
    let expected = data;
    loop {
        if CARD == CARD_R && dst as *mut u8 == run.cap_end {
            dst = grow_run(d, &mut run, dst as *mut u8, PTR_BYTES) as *mut *mut u8;
            if dst.is_null() {
                return core::ptr::null();
            }
        }
        ptr = ptr.add(TAGBYTES);
        let mut size = *ptr as u64;
        ptr = ptr.add(1);
        if size >= 0x80 && !decode_longsize(&mut ptr, &mut size) {
            return d.fail(DecodeError::MalformedVarint);
        }
        // Repeated fields append a fresh child; singular fields (and a
        // oneof whose case was already this field) merge into the existing
        // one.
        let mut sub = if CARD == CARD_S || (CARD == CARD_O && oneof_case_live) {
            dst.read_unaligned()
        } else {
            core::ptr::null_mut()
        };
        if sub.is_null() {
            sub = new_submsg::<CEIL>(d, subtable);
            if sub.is_null() {
                return d.fail(DecodeError::AllocationFailed);
            }
            dst.write_unaligned(sub);
        }
        let scope = match scope::enter(d, ptr, size as usize) {
            Some(s) => s,
            None => return d.fail(DecodeError::InvalidLimit),
        };
        let mut sub_hasbits = 0u64;
        ptr = dispatch(d, ptr, sub, subtable, &mut sub_hasbits);
        if ptr.is_null() {
            return core::ptr::null();
        }
        if d.end_group != 0 {
            return d.fail(DecodeError::UnterminatedGroup);
        }
        scope::leave(d, scope);
        if CARD != CARD_R {
            d.depth += 1;
            return ptr;
        }
        dst = dst.add(1);
        match next_repeated(d, ptr, dst as *mut u8, &run, expected, mask, PTR_BYTES) {
            RunNext::Same(p) => ptr = p,
            RunNext::Other(p) | RunNext::AtLimit(p) => {
                d.depth += 1;
                return p;
            }
            RunNext::Error => return core::ptr::null(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Exported matrix entries
//
// p{s,o,r}m_{1,2}bt_max{64,128,192,256,max}b; the explicit ceilings let the
// bump test constant-fold per slot.
// ─────────────────────────────────────────────────────────────────────────────

macro_rules! submsg_parser {
    ($name:ident, $tagbytes:literal, $card:expr, $ceil:expr) => {
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
            submsg_core::<$tagbytes, { $card }, { $ceil }>(d, ptr, msg, table, hasbits, data)
        }
    };
}

submsg_parser!(psm_1bt_max64b, 1, CARD_S, 64);
submsg_parser!(psm_1bt_max128b, 1, CARD_S, 128);
submsg_parser!(psm_1bt_max192b, 1, CARD_S, 192);
submsg_parser!(psm_1bt_max256b, 1, CARD_S, 256);
submsg_parser!(psm_1bt_maxmaxb, 1, CARD_S, 0);
submsg_parser!(psm_2bt_max64b, 2, CARD_S, 64);
submsg_parser!(psm_2bt_max128b, 2, CARD_S, 128);
submsg_parser!(psm_2bt_max192b, 2, CARD_S, 192);
submsg_parser!(psm_2bt_max256b, 2, CARD_S, 256);
submsg_parser!(psm_2bt_maxmaxb, 2, CARD_S, 0);

submsg_parser!(pom_1bt_max64b, 1, CARD_O, 64);
submsg_parser!(pom_1bt_max128b, 1, CARD_O, 128);
submsg_parser!(pom_1bt_max192b, 1, CARD_O, 192);
submsg_parser!(pom_1bt_max256b, 1, CARD_O, 256);
submsg_parser!(pom_1bt_maxmaxb, 1, CARD_O, 0);
submsg_parser!(pom_2bt_max64b, 2, CARD_O, 64);
submsg_parser!(pom_2bt_max128b, 2, CARD_O, 128);
submsg_parser!(pom_2bt_max192b, 2, CARD_O, 192);
submsg_parser!(pom_2bt_max256b, 2, CARD_O, 256);
submsg_parser!(pom_2bt_maxmaxb, 2, CARD_O, 0);

submsg_parser!(prm_1bt_max64b, 1, CARD_R, 64);
submsg_parser!(prm_1bt_max128b, 1, CARD_R, 128);
submsg_parser!(prm_1bt_max192b, 1, CARD_R, 192);
submsg_parser!(prm_1bt_max256b, 1, CARD_R, 256);
submsg_parser!(prm_1bt_maxmaxb, 1, CARD_R, 0);
submsg_parser!(prm_2bt_max64b, 2, CARD_R, 64);
submsg_parser!(prm_2bt_max128b, 2, CARD_R, 128);
submsg_parser!(prm_2bt_max192b, 2, CARD_R, 192);
submsg_parser!(prm_2bt_max256b, 2, CARD_R, 256);
submsg_parser!(prm_2bt_maxmaxb, 2, CARD_R, 0);
