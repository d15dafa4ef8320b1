//! Randomised property suites: dispatch stability over arbitrary layouts,
//! run-fusion and packed/unpacked equivalences, alias/copy equivalence, and
//! graceful handling of truncated input.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use fastwire::{decode, Arena, Cardinality, DecodeOptions, FieldKind, TableBuilder};

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
// Property 1: dispatch stability over random layouts
// ═════════════════════════════════════════════════════════════════════════════

#[test]
fn random_layouts_route_every_field_to_its_slot() {
    let mut rng = StdRng::seed_from_u64(0x5EED_0001);
    for _ in 0..200 {
        // Pick a random subset of field numbers across both tag widths.
        let mut fields: Vec<u32> = (1..=31).collect();
        for i in (1..fields.len()).rev() {
            fields.swap(i, rng.gen_range(0..=i));
        }
        let count = rng.gen_range(1..=10);
        let mut fields = fields[..count].to_vec();
        fields.sort_unstable();

        let mut b = TableBuilder::new(8 + count as u32 * 8);
        let mut offsets = Vec::new();
        for (i, &num) in fields.iter().enumerate() {
            let offset = 8 + i as u16 * 8;
            b.scalar(
                num,
                FieldKind::Varint64,
                Cardinality::Singular { hasbit: i as u8 },
                offset,
            )
            .unwrap();
            offsets.push(offset);
        }
        let table = b.build();

        let mut input = Vec::new();
        let mut values = Vec::new();
        for &num in &fields {
            let v: u64 = rng.gen();
            input.extend(field_varint(num, v));
            values.push(v);
        }

        let arena = Arena::new();
        let msg = decode(&input, &table, &arena, DecodeOptions::default()).unwrap();
        for (i, (&offset, &v)) in offsets.iter().zip(&values).enumerate() {
            assert!(msg.has(i as u32), "presence bit {i}");
            assert_eq!(unsafe { msg.get::<u64>(offset as usize) }, v);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// Property 2: run fusion
// ═════════════════════════════════════════════════════════════════════════════

#[test]
fn fused_runs_match_element_by_element_decoding() {
    let mut rng = StdRng::seed_from_u64(0x5EED_0002);
    for _ in 0..200 {
        let n = rng.gen_range(1..=40usize);
        let values: Vec<u32> = (0..n).map(|_| rng.gen()).collect();

        // Field 1 repeated, then field 2 singular to terminate the run.
        let mut b = TableBuilder::new(24);
        b.scalar(1, FieldKind::Varint32, Cardinality::Repeated, 8)
            .unwrap();
        b.scalar(2, FieldKind::Varint32, Cardinality::Singular { hasbit: 0 }, 16)
            .unwrap();
        let table = b.build();

        let mut input = Vec::new();
        for &v in &values {
            input.extend(field_varint(1, v as u64));
        }
        input.extend(field_varint(2, 7));

        let arena = Arena::new();
        let msg = decode(&input, &table, &arena, DecodeOptions::default()).unwrap();
        let arr = unsafe { msg.array(8) }.expect("array created");
        assert_eq!(arr.len as usize, n);
        assert_eq!(unsafe { arr.elements::<u32>() }, values.as_slice());
        assert_eq!(unsafe { msg.get::<u32>(16) }, 7);

        if n <= 8 {
            // Message block plus exactly one array allocation.
            assert_eq!(arena.alloc_count(), 2, "n = {n}");
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// Property 3: alias/copy equivalence
// ═════════════════════════════════════════════════════════════════════════════

#[test]
fn alias_and_copy_modes_decode_identical_contents() {
    let mut rng = StdRng::seed_from_u64(0x5EED_0003);
    for _ in 0..100 {
        let mut b = TableBuilder::new(48);
        b.scalar(1, FieldKind::Varint64, Cardinality::Singular { hasbit: 0 }, 8)
            .unwrap();
        b.string(2, Cardinality::Singular { hasbit: 1 }, 16).unwrap();
        b.string(3, Cardinality::Repeated, 32).unwrap();
        let table = b.build();

        let len = rng.gen_range(0..200usize);
        let big: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        let mut input = Vec::new();
        input.extend(field_varint(1, rng.gen()));
        input.extend(field_delim(2, &big));
        for _ in 0..rng.gen_range(0..4) {
            let slen = rng.gen_range(0..40usize);
            let s: Vec<u8> = (0..slen).map(|_| rng.gen()).collect();
            input.extend(field_delim(3, &s));
        }

        let arena_a = Arena::new();
        let arena_b = Arena::new();
        let aliased = decode(&input, &table, &arena_a, alias_opts()).unwrap();
        let copied = decode(&input, &table, &arena_b, DecodeOptions::default()).unwrap();

        assert_eq!(aliased.presence_word(), copied.presence_word());
        assert_eq!(unsafe { aliased.get::<u64>(8) }, unsafe {
            copied.get::<u64>(8)
        });
        // Views compare by contents, not by address.
        assert_eq!(unsafe { aliased.string(16) }, unsafe { copied.string(16) });
        let arr_a = unsafe { aliased.array(32) };
        let arr_b = unsafe { copied.array(32) };
        match (arr_a, arr_b) {
            (None, None) => {}
            (Some(a), Some(b)) => {
                assert_eq!(
                    unsafe { a.elements::<fastwire::StringView>() },
                    unsafe { b.elements::<fastwire::StringView>() }
                );
            }
            _ => panic!("array presence differs between modes"),
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// Property 5: packed/unpacked interchangeability
// ═════════════════════════════════════════════════════════════════════════════

#[test]
fn packed_and_unpacked_encodings_agree_on_both_layouts() {
    let mut rng = StdRng::seed_from_u64(0x5EED_0005);
    for &packed_layout in &[false, true] {
        for _ in 0..100 {
            let mut b = TableBuilder::new(16);
            let card = if packed_layout {
                Cardinality::Packed
            } else {
                Cardinality::Repeated
            };
            b.scalar(1, FieldKind::Varint32, card, 8).unwrap();
            let table = b.build();

            let n = rng.gen_range(0..30usize);
            let values: Vec<u32> = (0..n).map(|_| rng.gen()).collect();

            let mut unpacked = Vec::new();
            for &v in &values {
                unpacked.extend(field_varint(1, v as u64));
            }
            let mut payload = Vec::new();
            for &v in &values {
                payload.extend(varint(v as u64));
            }
            let packed = field_delim(1, &payload);

            for input in [&unpacked, &packed] {
                let arena = Arena::new();
                let msg = decode(input, &table, &arena, DecodeOptions::default()).unwrap();
                match unsafe { msg.array(8) } {
                    Some(arr) => assert_eq!(unsafe { arr.elements::<u32>() }, values.as_slice()),
                    None => assert!(values.is_empty()),
                }
            }
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// Property 6: bounds safety on truncated and mangled input
// ═════════════════════════════════════════════════════════════════════════════

#[test]
fn truncations_never_panic() {
    let mut b = TableBuilder::new(48);
    b.scalar(1, FieldKind::Varint64, Cardinality::Singular { hasbit: 0 }, 8)
        .unwrap();
    b.string(2, Cardinality::Singular { hasbit: 1 }, 16).unwrap();
    b.scalar(3, FieldKind::Fixed64, Cardinality::Packed, 32).unwrap();
    b.string(4, Cardinality::Repeated, 40).unwrap();
    let table = b.build();

    let mut input = Vec::new();
    input.extend(field_varint(1, u64::MAX));
    input.extend(field_delim(2, &vec![0x55u8; 60]));
    let mut payload = Vec::new();
    for i in 0..6u64 {
        payload.extend((i * 3).to_le_bytes());
    }
    input.extend(field_delim(3, &payload));
    for _ in 0..3 {
        input.extend(field_delim(4, b"str"));
    }

    for cut in 0..input.len() {
        let slice = &input[..cut];
        for opts in [DecodeOptions::default(), alias_opts()] {
            let arena = Arena::new();
            // Success is allowed (a prefix can be a whole record); crashing
            // or reading out of bounds is not.
            let _ = decode(slice, &table, &arena, opts);
        }
    }
}

#[test]
fn flipped_bytes_never_panic() {
    let mut rng = StdRng::seed_from_u64(0x5EED_0006);
    let table = repeated_int32_layout();
    let mut input = Vec::new();
    for i in 0..10u64 {
        input.extend(field_varint(1, i));
    }
    for _ in 0..500 {
        let mut mangled = input.clone();
        let at = rng.gen_range(0..mangled.len());
        mangled[at] ^= 1 << rng.gen_range(0..8);
        let arena = Arena::new();
        let _ = decode(&mangled, &table, &arena, DecodeOptions::default());
    }
}
