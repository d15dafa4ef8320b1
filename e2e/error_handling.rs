//! Error-path coverage: every failure in the taxonomy surfaces as its own
//! error kind, tag mismatches route to the fallback instead of failing, and
//! unknown fields are skipped cleanly.

use fastwire::{
    decode, Arena, Cardinality, DecodeError, DecodeOptions, FieldKind, TableBuilder,
};

mod testutil {
    include!("testutil.rs");
}
use testutil::*;

// ═════════════════════════════════════════════════════════════════════════════
// Malformed varints
// ═════════════════════════════════════════════════════════════════════════════

#[test]
fn varint_with_eleven_continuations_is_malformed() {
    let table = int32_layout();
    let arena = Arena::new();
    let mut input = vec![0x08];
    input.extend([0xFF; 11]);
    let err = decode(&input, &table, &arena, DecodeOptions::default()).unwrap_err();
    assert_eq!(err, DecodeError::MalformedVarint);
}

#[test]
fn varint_with_overflowing_tenth_byte_is_malformed() {
    let table = int32_layout();
    let arena = Arena::new();
    let mut input = vec![0x08];
    input.extend([0xFF; 9]);
    input.push(0x02);
    let err = decode(&input, &table, &arena, DecodeOptions::default()).unwrap_err();
    assert_eq!(err, DecodeError::MalformedVarint);
}

#[test]
fn length_prefix_above_two_gib_is_malformed() {
    let table = string_layout();
    let arena = Arena::new();
    // Field 1, LEN, five-byte prefix with an oversized fifth byte.
    let mut input = vec![0x0A];
    input.extend([0xFF, 0xFF, 0xFF, 0xFF, 0x08]);
    input.extend([0u8; 32]);
    let err = decode(&input, &table, &arena, DecodeOptions::default()).unwrap_err();
    assert_eq!(err, DecodeError::MalformedVarint);
}

// ═════════════════════════════════════════════════════════════════════════════
// Bounds and limits
// ═════════════════════════════════════════════════════════════════════════════

#[test]
fn string_longer_than_the_input_is_out_of_bounds() {
    let table = string_layout();
    let arena = Arena::new();
    let mut input = vec![0x0A, 60];
    input.extend([0x55u8; 20]);
    let err = decode(&input, &table, &arena, DecodeOptions::default()).unwrap_err();
    assert_eq!(err, DecodeError::BoundsExceeded);
    // Same failure in alias mode.
    let arena = Arena::new();
    let opts = DecodeOptions {
        alias: true,
        ..DecodeOptions::default()
    };
    let err = decode(&input, &table, &arena, opts).unwrap_err();
    assert_eq!(err, DecodeError::BoundsExceeded);
}

#[test]
fn string_escaping_its_enclosing_region_is_out_of_bounds() {
    use fastwire::Submsg;
    use std::sync::Arc;

    let mut inner = TableBuilder::new(24);
    inner.string(2, Cardinality::Singular { hasbit: 0 }, 8).unwrap();
    let inner = Arc::new(inner.build());

    let mut outer = TableBuilder::new(16);
    outer
        .message(1, Cardinality::Singular { hasbit: 0 }, 8, Submsg::Table(inner))
        .unwrap();
    let outer = outer.build();

    // The sub-record claims 4 bytes but its inner string claims 50; plenty
    // of input follows, so only the scope limit can reject it.
    let mut input = vec![0x0A, 0x04];
    input.extend([0x12, 50, 0xAA, 0xAB]);
    input.extend([0xAC; 60]);
    let arena = Arena::new();
    let err = decode(&input, &outer, &arena, DecodeOptions::default()).unwrap_err();
    assert_eq!(err, DecodeError::BoundsExceeded);
}

#[test]
fn nested_region_exceeding_its_scope_is_an_invalid_limit() {
    use fastwire::Submsg;
    use std::sync::Arc;

    let mut leaf = TableBuilder::new(16);
    leaf.scalar(3, FieldKind::Varint32, Cardinality::Singular { hasbit: 0 }, 8)
        .unwrap();
    let leaf = Arc::new(leaf.build());

    let mut mid = TableBuilder::new(16);
    mid.message(2, Cardinality::Singular { hasbit: 0 }, 8, Submsg::Table(leaf))
        .unwrap();
    let mid = Arc::new(mid.build());

    let mut outer = TableBuilder::new(16);
    outer
        .message(1, Cardinality::Singular { hasbit: 0 }, 8, Submsg::Table(mid))
        .unwrap();
    let outer = outer.build();

    // Field 1 claims 4 bytes; inside, field 2 declares a 200-byte region.
    // 200 needs a two-byte length (0xC8 0x01), so the 4-byte payload is
    // exactly tag + prefix.
    let mut input = vec![0x0A, 0x04];
    input.extend([0x12, 0xC8, 0x01, 0x00]);
    input.extend([0u8; 250]);
    let arena = Arena::new();
    let err = decode(&input, &outer, &arena, DecodeOptions::default()).unwrap_err();
    assert_eq!(err, DecodeError::InvalidLimit);
}

#[test]
fn packed_fixed_region_must_tile_exactly() {
    let mut b = TableBuilder::new(16);
    b.scalar(1, FieldKind::Fixed32, Cardinality::Packed, 8).unwrap();
    let table = b.build();
    let arena = Arena::new();
    // Six payload bytes cannot hold whole 4-byte elements.
    let input = field_delim(1, &[1, 2, 3, 4, 5, 6]);
    let err = decode(&input, &table, &arena, DecodeOptions::default()).unwrap_err();
    assert_eq!(err, DecodeError::BoundsExceeded);
}

// ═════════════════════════════════════════════════════════════════════════════
// Groups
// ═════════════════════════════════════════════════════════════════════════════

#[test]
fn stray_end_group_fails_the_decode() {
    let table = int32_layout();
    let arena = Arena::new();
    let input = tag(1, 4);
    let err = decode(&input, &table, &arena, DecodeOptions::default()).unwrap_err();
    assert_eq!(err, DecodeError::UnterminatedGroup);
}

#[test]
fn unterminated_group_fails_the_decode() {
    let table = int32_layout();
    let arena = Arena::new();
    // Open group for unknown field 7, never closed.
    let mut input = tag(7, 3);
    input.extend(field_varint(2, 5));
    let err = decode(&input, &table, &arena, DecodeOptions::default()).unwrap_err();
    assert_eq!(err, DecodeError::UnterminatedGroup);
}

#[test]
fn balanced_unknown_group_is_skipped() {
    let table = int32_layout();
    let arena = Arena::new();
    let mut input = tag(7, 3);
    input.extend(field_varint(2, 5));
    input.extend(tag(7, 4));
    input.extend(field_varint(1, 150));
    let msg = decode(&input, &table, &arena, DecodeOptions::default()).unwrap();
    assert_eq!(unsafe { msg.get::<u32>(8) }, 150);
}

// ═════════════════════════════════════════════════════════════════════════════
// Routed control transfers that are not errors
// ═════════════════════════════════════════════════════════════════════════════

#[test]
fn unknown_fields_are_skipped() {
    let table = int32_layout();
    let arena = Arena::new();
    let mut input = Vec::new();
    input.extend(field_varint(9, 1234));
    input.extend(field_fixed64(20, 0xDEAD_BEEF));
    input.extend(field_delim(33, b"opaque"));
    input.extend(field_varint(1, 150));
    let msg = decode(&input, &table, &arena, DecodeOptions::default()).unwrap();
    assert_eq!(unsafe { msg.get::<u32>(8) }, 150);
    assert!(msg.has(0));
}

#[test]
fn wrong_wiretype_on_a_known_field_is_skipped_not_fatal() {
    let table = int32_layout();
    let arena = Arena::new();
    // Field 1 arrives as fixed32 although the layout says varint.
    let mut input = field_fixed32(1, 99);
    input.extend(field_varint(1, 150));
    let msg = decode(&input, &table, &arena, DecodeOptions::default()).unwrap();
    assert_eq!(unsafe { msg.get::<u32>(8) }, 150);
}

#[test]
fn empty_input_decodes_to_an_empty_record() {
    let table = int32_layout();
    let arena = Arena::new();
    let msg = decode(&[], &table, &arena, DecodeOptions::default()).unwrap();
    assert_eq!(msg.presence_word(), 0);
    assert!(!msg.has(0));
}

#[test]
fn huge_length_is_bounds_checked_before_allocating() {
    let table = string_layout();
    let arena = Arena::new();
    let before = arena.alloc_count();
    let mut input = vec![0x0A];
    // Length 2^31 − 1 with nothing behind it: the limit check must fire
    // before any arena request is made for the phantom payload.
    input.extend([0xFF, 0xFF, 0xFF, 0xFF, 0x07]);
    let err = decode(&input, &table, &arena, DecodeOptions::default()).unwrap_err();
    assert_eq!(err, DecodeError::BoundsExceeded);
    assert_eq!(arena.alloc_count() - before, 1); // the record block only
}
