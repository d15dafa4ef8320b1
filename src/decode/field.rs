//! Field accessor and repeated-run plumbing.
//!
//! The accessor turns packed `field_data` into a destination pointer inside
//! the message record and performs the presence bookkeeping for each
//! cardinality.  The run helpers keep a fused loop going over consecutive
//! occurrences of the same repeated field: one dispatch, one accessor call,
//! N inner iterations.

use crate::decode::array::RepArray;
use crate::decode::dispatch::{flush_hasbits, load_tag};
use crate::decode::state::{DecodeState, IsDone};

// Cardinality selectors for the parser matrix.
pub(crate) const CARD_S: u8 = 0; // singular with presence bit
pub(crate) const CARD_O: u8 = 1; // oneof member
pub(crate) const CARD_R: u8 = 2; // repeated, per-element tags
pub(crate) const CARD_P: u8 = 3; // repeated, packed region

/// Stack-only state of a fused repeated run.
pub(crate) struct RunState {
    pub arr: *mut RepArray,
    /// One past the end of the array's current capacity.
    pub cap_end: *mut u8,
}

impl RunState {
    #[inline(always)]
    pub(crate) fn empty() -> Self {
        RunState {
            arr: core::ptr::null_mut(),
            cap_end: core::ptr::null_mut(),
        }
    }
}

/// Resolve the destination address for a field and do its presence
/// bookkeeping.
///
/// - `CARD_S`: records the presence bit in the local `hasbits`.
/// - `CARD_O`: writes the field number into the oneof case word.
/// - `CARD_R`/`CARD_P`: flushes `hasbits`, installs (or fetches) the array
///   header, primes `run`, and for `CARD_R` reloads `data` with the raw tag
///   bytes the run loop will match against.  Returns null only here, when
///   the array allocation fails.
///
/// # Safety
/// `msg` must be a record whose layout produced `data`; for repeated
/// cardinalities `ptr` must sit on the field's tag with 2 readable bytes.
#[inline(always)]
pub(crate) unsafe fn get_field<const CARD: u8>(
    d: &mut DecodeState,
    ptr: *const u8,
    msg: *mut u8,
    data: &mut u64,
    hasbits: &mut u64,
    run: &mut RunState,
    valbytes: usize,
) -> *mut u8 {
    match CARD {
        CARD_S => {
            *hasbits |= 1u64 << ((*data >> 24) & 31);
            msg.add((*data >> 48) as usize)
        }
        CARD_O => {
            let case = ((*data >> 24) & 0xFF) as u32;
            let case_ofs = ((*data >> 32) & 0xFFFF) as usize;
            (msg.add(case_ofs) as *mut u32).write_unaligned(case);
            msg.add((*data >> 48) as usize)
        }
        _ => {
            // Presence bits must land before any allocation the caller may
            // observe mid-decode.
            flush_hasbits(msg, hasbits);
            let slot = msg.add((*data >> 48) as usize) as *mut *mut RepArray;
            let mut arr = slot.read_unaligned();
            if arr.is_null() {
                arr = RepArray::new(d.arena, 8, valbytes.trailing_zeros());
                if arr.is_null() {
                    return core::ptr::null_mut();
                }
                slot.write_unaligned(arr);
            }
            run.arr = arr;
            let base = (*arr).data_ptr();
            run.cap_end = base.add(((*arr).cap as usize) * valbytes);
            if CARD == CARD_R {
                *data = load_tag(ptr);
            }
            base.add(((*arr).len as usize) * valbytes)
        }
    }
}

/// Commit the run: derive `len` from the write cursor.
#[inline(always)]
pub(crate) unsafe fn commit(run: &RunState, dst: *mut u8, valbytes: usize) {
    let arr = run.arr;
    (*arr).len = (dst.offset_from((*arr).data_ptr()) as usize / valbytes) as u32;
}

/// Outcome of the end-of-element decision in a fused run.
pub(crate) enum RunNext {
    /// The next tag repeats the field; keep looping at the given cursor.
    Same(*const u8),
    /// A different field follows; the run is committed, re-dispatch here.
    Other(*const u8),
    /// The scope is exhausted; the run is committed.
    AtLimit(*const u8),
    /// Overrun; the error is recorded on the state.
    Error,
}

/// After writing one element (with `dst` already advanced), decide whether
/// the run continues, another field begins, or the scope ends.
#[inline(always)]
pub(crate) unsafe fn next_repeated(
    d: &mut DecodeState,
    ptr: *const u8,
    dst: *mut u8,
    run: &RunState,
    expected: u64,
    tagmask: u64,
    valbytes: usize,
) -> RunNext {
    match d.isdone(ptr) {
        IsDone::Done => {
            commit(run, dst, valbytes);
            RunNext::AtLimit(ptr)
        }
        IsDone::Error => RunNext::Error,
        IsDone::NotDone(p) => {
            let tag = load_tag(p);
            if (tag ^ expected) & tagmask == 0 {
                RunNext::Same(p)
            } else {
                commit(run, dst, valbytes);
                RunNext::Other(p)
            }
        }
    }
}

/// Double the run's array, re-anchoring the write cursor and capacity end.
/// Null on allocation failure (error recorded).
#[inline(never)]
pub(crate) unsafe fn grow_run(
    d: &mut DecodeState,
    run: &mut RunState,
    dst: *mut u8,
    valbytes: usize,
) -> *mut u8 {
    commit(run, dst, valbytes);
    let arr = run.arr;
    let new_cap = (*arr).cap * 2;
    if !RepArray::grow(arr, d.arena, new_cap) {
        return d.fail(crate::decode::DecodeError::AllocationFailed) as *mut u8;
    }
    let base = (*arr).data_ptr();
    run.cap_end = base.add((new_cap as usize) * valbytes);
    base.add(((*arr).len as usize) * valbytes)
}

/// One-shot reservation used by the packed fixed bulk path: make room for
/// `extra` more elements without the doubling dance.
#[inline(never)]
pub(crate) unsafe fn reserve_run(
    d: &mut DecodeState,
    run: &mut RunState,
    extra: usize,
    valbytes: usize,
) -> bool {
    let arr = run.arr;
    let need = (*arr).len as usize + extra;
    if need <= (*arr).cap as usize {
        return true;
    }
    if !RepArray::grow(arr, d.arena, need as u32) {
        d.fail(crate::decode::DecodeError::AllocationFailed);
        return false;
    }
    run.cap_end = (*arr).data_ptr().add(((*arr).cap as usize) * valbytes);
    true
}
