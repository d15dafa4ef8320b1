//! Length-delimited sub-scope entry and exit.
//!
//! A scope narrows the active limit to the `size` bytes following the
//! cursor.  Two flavours exist:
//!
//! - **Contained**: the payload sits entirely inside the working window, so
//!   the previous `(limit_ptr, limit)` pair can be saved and restored as
//!   absolutes — nothing inside the scope can re-anchor the window.
//! - **Spilled**: the payload extends into the slop region (or beyond a
//!   future re-anchor), so only the *delta* between the old and new limit is
//!   kept; it stays valid when the tail is swapped into the patch buffer.
//!
//! The invariant `limit_ptr == end + min(0, limit)` holds on entry and exit
//! of both flavours.

use crate::decode::state::DecodeState;
use crate::wire::types::bounds_exceeded;

/// Token restoring the enclosing limit on [`leave`].
pub(crate) enum Scope {
    Contained {
        saved_limit_ptr: *const u8,
        saved_limit: isize,
    },
    Spilled {
        delta: isize,
    },
}

/// Narrow the limit to `[ptr, ptr + size)`.  `None` means the region would
/// exceed the enclosing limit (an `InvalidLimit` for the caller to report).
#[inline(always)]
pub(crate) unsafe fn enter(d: &mut DecodeState, ptr: *const u8, size: usize) -> Option<Scope> {
    if !bounds_exceeded(ptr, size, d.limit_ptr, 0) {
        // Contained: ptr + size ≤ limit_ptr also implies the enclosing
        // limit is respected.
        let scope = Scope::Contained {
            saved_limit_ptr: d.limit_ptr,
            saved_limit: d.limit,
        };
        d.limit_ptr = ptr.add(size);
        d.limit = d.limit_ptr.offset_from(d.end);
        Some(scope)
    } else {
        let delta = d.push_limit(ptr, size)?;
        Some(Scope::Spilled { delta })
    }
}

/// Restore the enclosing limit.
#[inline(always)]
pub(crate) unsafe fn leave(d: &mut DecodeState, scope: Scope) {
    match scope {
        Scope::Contained {
            saved_limit_ptr,
            saved_limit,
        } => {
            d.limit_ptr = saved_limit_ptr;
            d.limit = saved_limit;
        }
        Scope::Spilled { delta } => d.pop_limit(delta),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::decode::DecodeOptions;

    fn invariant_holds(d: &DecodeState<'_>) -> bool {
        d.limit_ptr == unsafe { d.end.offset(d.limit.min(0)) }
    }

    #[test]
    fn contained_scope_restores_absolutes() {
        let buf = vec![0u8; 64];
        let arena = Arena::new();
        let (mut d, ptr) = DecodeState::new(&buf, &arena, &DecodeOptions::default());
        let (before_ptr, before_limit) = (d.limit_ptr, d.limit);
        let scope = unsafe { enter(&mut d, ptr, 8) }.unwrap();
        assert!(matches!(scope, Scope::Contained { .. }));
        assert_eq!(d.limit_ptr, unsafe { ptr.add(8) });
        assert!(invariant_holds(&d));
        unsafe { leave(&mut d, scope) };
        assert_eq!(d.limit_ptr, before_ptr);
        assert_eq!(d.limit, before_limit);
    }

    #[test]
    fn spilled_scope_round_trips_through_delta() {
        let buf = vec![0u8; 40];
        let arena = Arena::new();
        let (mut d, ptr) = DecodeState::new(&buf, &arena, &DecodeOptions::default());
        // A region reaching into the slop bytes cannot stay contained.
        let tail = unsafe { ptr.add(30) };
        let scope = unsafe { enter(&mut d, tail, 10) }.unwrap();
        assert!(matches!(scope, Scope::Spilled { .. }));
        assert!(invariant_holds(&d));
        unsafe { leave(&mut d, scope) };
        assert!(invariant_holds(&d));
        assert_eq!(d.limit, crate::wire::types::SLOP_BYTES as isize);
    }

    #[test]
    fn oversized_region_is_rejected() {
        let buf = vec![0u8; 32];
        let arena = Arena::new();
        let (mut d, ptr) = DecodeState::new(&buf, &arena, &DecodeOptions::default());
        assert!(unsafe { enter(&mut d, ptr, 40) }.is_none());
    }
}
