//! Generic fallback: every field the specialised matrix declines.
//!
//! A slot parser lands here on tag mismatch, and unused slots point here
//! directly.  The fallback re-reads the tag as a full varint (field numbers
//! above 31 included), skips the value according to its wire type, and hands
//! control back to the dispatch loop.  Unknown fields are discarded; groups
//! are skipped recursively under the same depth budget, and an end-group tag
//! terminates the enclosing scope through the `end_group` sentinel.

use crate::decode::dispatch::flush_hasbits;
use crate::decode::state::{DecodeState, IsDone};
use crate::decode::DecodeError;
use crate::layout::DispatchTable;
use crate::wire::types::wiretype;
use crate::wire::varint::{decode_size, decode_varint};

/// Slot-compatible entry point.  `data` is ignored; unused slots carry a
/// tag pattern that can never match precisely so they always land here.
pub unsafe fn fallback(
    d: &mut DecodeState,
    ptr: *const u8,
    msg: *mut u8,
    _table: &DispatchTable,
    hasbits: &mut u64,
    _data: u64,
) -> *const u8 {
    flush_hasbits(msg, hasbits);
    let mut ptr = ptr;
    let Some(tag) = decode_varint(&mut ptr) else {
        return d.fail(DecodeError::MalformedVarint);
    };
    if tag > u32::MAX as u64 || tag >> 3 == 0 {
        return d.fail(DecodeError::MalformedVarint);
    }
    skip_value(d, ptr, (tag & 7) as u32, (tag >> 3) as u32)
}

/// Skip one value of wire type `wt`, returning the cursor past it.
unsafe fn skip_value(d: &mut DecodeState, mut ptr: *const u8, wt: u32, field: u32) -> *const u8 {
    match wt {
        wiretype::VARINT => {
            if decode_varint(&mut ptr).is_none() {
                return d.fail(DecodeError::MalformedVarint);
            }
            ptr
        }
        wiretype::FIXED64 => ptr.add(8),
        wiretype::FIXED32 => ptr.add(4),
        wiretype::LEN => {
            let Some(size) = decode_size(&mut ptr) else {
                return d.fail(DecodeError::MalformedVarint);
            };
            // SAFETY: both cursors live in the current working allocation.
            let rel = ptr.offset_from(d.end) + size as isize;
            if rel > d.limit {
                return d.fail(DecodeError::BoundsExceeded);
            }
            ptr.add(size as usize)
        }
        wiretype::SGROUP => skip_group(d, ptr, field),
        wiretype::EGROUP => {
            // Scope terminator; the enclosing parser validates it.
            d.end_group = field;
            ptr
        }
        _ => d.fail(DecodeError::MalformedVarint),
    }
}

/// Skip a whole group, including nested ones, up to its matching end tag.
unsafe fn skip_group(d: &mut DecodeState, mut ptr: *const u8, group: u32) -> *const u8 {
    if d.depth == 0 {
        return d.fail(DecodeError::RecursionLimit);
    }
    d.depth -= 1;
    loop {
        match d.isdone(ptr) {
            // The scope ran out before the group closed.
            IsDone::Done => return d.fail(DecodeError::UnterminatedGroup),
            IsDone::Error => return core::ptr::null(),
            IsDone::NotDone(p) => ptr = p,
        }
        let Some(tag) = decode_varint(&mut ptr) else {
            return d.fail(DecodeError::MalformedVarint);
        };
        if tag > u32::MAX as u64 || tag >> 3 == 0 {
            return d.fail(DecodeError::MalformedVarint);
        }
        let (field, wt) = ((tag >> 3) as u32, (tag & 7) as u32);
        if wt == wiretype::EGROUP {
            if field != group {
                return d.fail(DecodeError::UnterminatedGroup);
            }
            d.depth += 1;
            return ptr;
        }
        ptr = skip_value(d, ptr, wt, field);
        if ptr.is_null() {
            return core::ptr::null();
        }
    }
}
