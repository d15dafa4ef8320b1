//! Decoder core: decode state, dispatch, the specialised parser matrix, and
//! the public [`decode`] entry point.

use core::marker::PhantomData;

use crate::arena::Arena;
use crate::layout::DispatchTable;
use crate::wire::types::StringView;

pub(crate) mod dispatch;
pub(crate) mod field;
pub(crate) mod scope;
mod state;

pub mod array;
pub mod fixed_fields;
pub mod generic;
pub mod message_fields;
pub mod string_fields;
pub mod varint_fields;

pub use array::RepArray;
pub use state::DecodeState;

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Ways a decode can fail.  Inside the hot path these travel as a null
/// cursor with the kind recorded on the state; the public API surfaces them
/// as `Result`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// A varint carried a continuation past ten bytes, or a length prefix
    /// was oversized.
    #[error("malformed varint")]
    MalformedVarint,
    /// A payload would read past the active limit or the input end.
    #[error("read past input bounds")]
    BoundsExceeded,
    /// A length-delimited region would exceed its enclosing limit.
    #[error("length prefix exceeds enclosing limit")]
    InvalidLimit,
    /// Sub-record nesting exceeded the configured depth budget.
    #[error("nesting depth limit exceeded")]
    RecursionLimit,
    /// A group was still open when its scope closed, or closed wrongly.
    #[error("unterminated group")]
    UnterminatedGroup,
    /// The arena could not satisfy an allocation.
    #[error("arena allocation failed")]
    AllocationFailed,
}

// ─────────────────────────────────────────────────────────────────────────────
// Options
// ─────────────────────────────────────────────────────────────────────────────

/// Default sub-record nesting budget.
pub const DEFAULT_DEPTH_LIMIT: u16 = 100;

/// Knobs for a single decode call.
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    /// The input buffer outlives the decoded message, so string views may
    /// reference it directly instead of copying into the arena.
    pub alias: bool,
    /// Sub-record nesting budget.
    pub depth_limit: u16,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            alias: false,
            depth_limit: DEFAULT_DEPTH_LIMIT,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoded message handle
// ─────────────────────────────────────────────────────────────────────────────

/// Handle over a decoded record living in the arena.
///
/// The record itself is an opaque block whose first 32 bits hold the
/// presence word; field values live at the offsets the layout assigned.
/// Typed access therefore requires the caller to know the layout, which is
/// why the getters are `unsafe`.
pub struct Message<'a> {
    raw: *mut u8,
    _backing: PhantomData<&'a ()>,
}

impl core::fmt::Debug for Message<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Message")
            .field("at", &self.raw)
            .field("presence", &format_args!("{:#010x}", self.presence_word()))
            .finish()
    }
}

impl<'a> Message<'a> {
    /// Presence bitmap from the record's leading word.
    #[inline]
    pub fn presence_word(&self) -> u32 {
        // SAFETY: every record is at least presence-word sized.
        unsafe { (self.raw as *const u32).read_unaligned() }
    }

    /// Whether presence bit `bit` is set.
    #[inline]
    pub fn has(&self, bit: u32) -> bool {
        self.presence_word() & (1u32 << bit) != 0
    }

    /// Read a field value at `offset`.
    ///
    /// # Safety
    /// `offset` must be a valid offset of a `T`-typed field in this
    /// record's layout.
    #[inline]
    pub unsafe fn get<T: Copy>(&self, offset: usize) -> T {
        (self.raw.add(offset) as *const T).read_unaligned()
    }

    /// Read a string view at `offset`.
    ///
    /// # Safety
    /// `offset` must name a string field of this record's layout.
    #[inline]
    pub unsafe fn string(&self, offset: usize) -> StringView {
        self.get::<StringView>(offset)
    }

    /// Borrow the repeated array at `offset`, if one was created.
    ///
    /// # Safety
    /// `offset` must name a repeated field of this record's layout.
    #[inline]
    pub unsafe fn array(&self, offset: usize) -> Option<&'a RepArray> {
        let p = self.get::<*mut RepArray>(offset);
        if p.is_null() {
            None
        } else {
            Some(&*p)
        }
    }

    /// Borrow the sub-record at `offset`, if one was decoded.
    ///
    /// # Safety
    /// `offset` must name a sub-record field of this record's layout.
    #[inline]
    pub unsafe fn submessage(&self, offset: usize) -> Option<Message<'a>> {
        let p = self.get::<*mut u8>(offset);
        if p.is_null() {
            None
        } else {
            Some(Message {
                raw: p,
                _backing: PhantomData,
            })
        }
    }

    /// Raw base address of the record.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.raw
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry point
// ─────────────────────────────────────────────────────────────────────────────

/// Decode `input` as one record laid out by `table`, allocating from
/// `arena`.
///
/// With `options.alias` set, string views in the result reference `input`
/// directly; the shared lifetime bound keeps both the buffer and the arena
/// alive as long as the message.
pub fn decode<'a>(
    input: &'a [u8],
    table: &DispatchTable,
    arena: &'a Arena,
    options: DecodeOptions,
) -> Result<Message<'a>, DecodeError> {
    let msg = arena.alloc(table.size as usize);
    if msg.is_null() {
        return Err(DecodeError::AllocationFailed);
    }
    // SAFETY: `msg` spans `table.size` writable bytes.
    unsafe { core::ptr::write_bytes(msg, 0, table.size as usize) };

    let (mut state, ptr) = DecodeState::new(input, arena, &options);
    let mut hasbits = 0u64;
    // SAFETY: `ptr` is the working-window cursor for `input`, `msg` is a
    // zeroed record of `table`'s size, and `table` pairs parsers with their
    // own packing (enforced by the layout builder).
    let end = unsafe { dispatch::dispatch(&mut state, ptr, msg, table, &mut hasbits) };
    if end.is_null() {
        return Err(state.err.unwrap_or(DecodeError::BoundsExceeded));
    }
    if state.end_group != 0 {
        return Err(DecodeError::UnterminatedGroup);
    }
    Ok(Message {
        raw: msg,
        _backing: PhantomData,
    })
}
