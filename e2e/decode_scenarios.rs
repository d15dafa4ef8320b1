//! End-to-end decode scenarios: the canonical inputs every implementation
//! of the format must agree on, checked byte-for-byte against the decoded
//! record state.

use std::sync::{Arc, Weak};

use fastwire::{
    decode, Arena, Cardinality, DecodeError, DecodeOptions, DispatchTable, Submsg, TableBuilder,
};

mod testutil {
    include!("testutil.rs");
}
use testutil::*;

fn alias_opts() -> DecodeOptions {
    DecodeOptions {
        alias: true,
        ..DecodeOptions::default()
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// Scenario 1: singular varint
// ═════════════════════════════════════════════════════════════════════════════

#[test]
fn singular_varint_sets_value_and_presence() {
    let table = int32_layout();
    let arena = Arena::new();
    let input = [0x08, 0x96, 0x01];
    let msg = decode(&input, &table, &arena, DecodeOptions::default()).unwrap();
    assert_eq!(unsafe { msg.get::<u32>(8) }, 150);
    assert_eq!(msg.presence_word() & 1, 1);
}

// ═════════════════════════════════════════════════════════════════════════════
// Scenario 2: packed data arriving on an unpacked repeated field
// ═════════════════════════════════════════════════════════════════════════════

#[test]
fn packed_encoding_decodes_through_unpacked_slot() {
    let table = repeated_int32_layout();
    let arena = Arena::new();
    let input = [0x0A, 0x06, 0x03, 0x8E, 0x02, 0x9E, 0xA7, 0x05];
    let msg = decode(&input, &table, &arena, DecodeOptions::default()).unwrap();
    let arr = unsafe { msg.array(8) }.expect("array created");
    let elems: &[u32] = unsafe { arr.elements() };
    assert_eq!(elems, &[3, 270, 86942]);
}

// ═════════════════════════════════════════════════════════════════════════════
// Scenario 3: aliased short string
// ═════════════════════════════════════════════════════════════════════════════

#[test]
fn aliased_string_points_into_the_input() {
    let table = string_layout();
    let arena = Arena::new();
    let mut input = vec![0x0A, 0x05];
    input.extend(b"hello");
    let msg = decode(&input, &table, &arena, alias_opts()).unwrap();
    let view = unsafe { msg.string(8) };
    assert_eq!(view.size, 5);
    assert_eq!(view.data, unsafe { input.as_ptr().add(2) });
    assert_eq!(unsafe { view.as_bytes() }, b"hello");
    // Only the message record itself came from the arena.
    assert_eq!(arena.alloc_count(), 1);
}

// ═════════════════════════════════════════════════════════════════════════════
// Scenario 4: copied short string
// ═════════════════════════════════════════════════════════════════════════════

#[test]
fn copied_string_lands_in_the_arena_via_the_cascade() {
    let table = string_layout();
    let arena = Arena::with_capacity(1024);
    let before = arena.remaining();
    let mut input = vec![0x0A, 0x05];
    input.extend(b"hello");
    let msg = decode(&input, &table, &arena, DecodeOptions::default()).unwrap();
    let view = unsafe { msg.string(8) };
    assert_eq!(view.size, 5);
    assert_eq!(unsafe { view.as_bytes() }, b"hello");
    // The view must reference arena storage, not the input.
    let consumed = before - arena.remaining();
    let arena_base = arena.head_ptr() as usize - consumed;
    assert!((view.data as usize) >= arena_base);
    assert!((view.data as usize) < arena.head_ptr() as usize);
    // Record (24 bytes) plus one fixed 16-byte cascade block.
    assert_eq!(consumed, table.size as usize + 16);
}

// ═════════════════════════════════════════════════════════════════════════════
// Scenario 5: nesting depth
// ═════════════════════════════════════════════════════════════════════════════

fn recursive_layout() -> Arc<DispatchTable> {
    Arc::new_cyclic(|weak: &Weak<DispatchTable>| {
        let mut b = TableBuilder::new(16);
        b.message(
            1,
            Cardinality::Singular { hasbit: 0 },
            8,
            Submsg::Recursive(weak.clone()),
        )
        .unwrap();
        b.build()
    })
}

fn nested(levels: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    for _ in 0..levels {
        buf = field_delim(1, &buf);
    }
    buf
}

#[test]
fn nesting_past_the_depth_budget_fails() {
    let table = recursive_layout();
    let arena = Arena::new();
    let opts = DecodeOptions {
        depth_limit: 100,
        ..DecodeOptions::default()
    };
    let err = decode(&nested(101), &table, &arena, opts).unwrap_err();
    assert_eq!(err, DecodeError::RecursionLimit);
}

#[test]
fn nesting_at_the_depth_budget_succeeds() {
    let table = recursive_layout();
    let arena = Arena::new();
    let opts = DecodeOptions {
        depth_limit: 100,
        ..DecodeOptions::default()
    };
    let input = nested(100);
    let msg = decode(&input, &table, &arena, opts).unwrap();
    // Walk back down the chain: 100 nested records hang off the root.
    let mut cursor = msg;
    let mut depth = 0usize;
    while let Some(inner) = unsafe { cursor.submessage(8) } {
        cursor = inner;
        depth += 1;
    }
    assert_eq!(depth, 100);
}

// ═════════════════════════════════════════════════════════════════════════════
// Scenario 6: fused repeated run
// ═════════════════════════════════════════════════════════════════════════════

#[test]
fn fused_run_of_32_elements_grows_twice() {
    let table = repeated_int32_layout();
    let arena = Arena::new();
    let mut input = Vec::new();
    for i in 1..=32u64 {
        input.extend(field_varint(1, i));
    }
    let msg = decode(&input, &table, &arena, DecodeOptions::default()).unwrap();
    let arr = unsafe { msg.array(8) }.expect("array created");
    let elems: &[u32] = unsafe { arr.elements() };
    let expect: Vec<u32> = (1..=32).collect();
    assert_eq!(elems, expect.as_slice());
    // One message block, then the array: initial capacity 8 plus doublings
    // to 16 and 32 — exactly log2(32/8) + 1 = 3 array allocations.
    assert_eq!(arena.alloc_count() - 1, 3);
}
