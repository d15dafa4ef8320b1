//! Dispatch core: tag bytes to specialised parser in constant time.
//!
//! Two bytes are loaded at the cursor as a little-endian word; five bits of
//! the first byte (the field number, wiretype bits skipped) index the
//! layout's 32-slot table, and the slot's packed `field_data` is XORed with
//! the loaded word.  A correct single-byte match leaves the low byte zero, a
//! correct two-byte match the low sixteen bits; each parser verifies its own
//! masked result and routes mismatches to the generic fallback.  No field
//! number is ever computed arithmetically here.

use crate::decode::state::DecodeState;
use crate::layout::DispatchTable;
use crate::wire::types::read_le16;

/// Load two tag bytes at `ptr` as a little-endian word.
///
/// # Safety
/// `ptr` must be valid for reads of 2 bytes (guaranteed below `limit_ptr`
/// by the slop region).
#[inline(always)]
pub(crate) unsafe fn load_tag(ptr: *const u8) -> u64 {
    read_le16(ptr) as u64
}

/// Fold locally-coalesced presence bits into the record's leading word.
#[inline(always)]
pub(crate) unsafe fn flush_hasbits(msg: *mut u8, hasbits: &mut u64) {
    if *hasbits != 0 {
        let word = msg as *mut u32;
        word.write_unaligned(word.read_unaligned() | *hasbits as u32);
        *hasbits = 0;
    }
}

/// Drive one scope of `msg` from `ptr` to its limit.
///
/// Each iteration either detects scope exhaustion (folding `hasbits` and
/// returning the final cursor), re-anchors the cursor through the bounds
/// fallback, or dispatches the tag under the cursor to its slot parser.  A
/// parser returning null aborts the whole decode; a fallback-reported
/// end-group tag closes the scope early for the caller to validate.
///
/// # Safety
/// `ptr` must lie within the state's working window, `msg` must be a record
/// laid out per `table`, and `table` must only reference parsers with
/// matching `field_data` packing.
pub(crate) unsafe fn dispatch(
    d: &mut DecodeState,
    mut ptr: *const u8,
    msg: *mut u8,
    table: &DispatchTable,
    hasbits: &mut u64,
) -> *const u8 {
    loop {
        while ptr >= d.limit_ptr {
            let overrun = ptr.offset_from(d.end);
            if overrun == d.limit {
                flush_hasbits(msg, hasbits);
                return ptr;
            }
            match d.isdone_fallback(ptr, overrun) {
                Some(p) => ptr = p,
                None => return core::ptr::null(),
            }
        }
        let tag = load_tag(ptr);
        let slot = &table.fasttable[(tag as usize >> 3) & 0x1F];
        let data = slot.data ^ tag;
        ptr = (slot.parser)(d, ptr, msg, table, hasbits, data);
        if ptr.is_null() {
            return core::ptr::null();
        }
        if d.end_group != 0 {
            flush_hasbits(msg, hasbits);
            return ptr;
        }
    }
}
