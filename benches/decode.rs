//! Criterion benchmarks for the fast-path decoder.
//!
//! Run with:
//!   cargo bench --bench decode
//!
//! Covers the shapes the dispatch design optimises for: scalar-heavy
//! records, long fused repeated runs, packed regions, and string fields in
//! both alias and copy modes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use fastwire::{decode, Arena, Cardinality, DecodeOptions, DispatchTable, FieldKind, TableBuilder};

fn varint(mut v: u64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let byte = (v & 0x7F) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

fn field_varint(num: u32, v: u64) -> Vec<u8> {
    let mut out = varint(((num << 3) | 0) as u64);
    out.extend(varint(v));
    out
}

fn field_delim(num: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = varint(((num << 3) | 2) as u64);
    out.extend(varint(payload.len() as u64));
    out.extend(payload);
    out
}

fn scalar_layout() -> DispatchTable {
    let mut b = TableBuilder::new(48);
    b.scalar(1, FieldKind::Varint32, Cardinality::Singular { hasbit: 0 }, 8)
        .unwrap();
    b.scalar(2, FieldKind::Varint64, Cardinality::Singular { hasbit: 1 }, 16)
        .unwrap();
    b.scalar(3, FieldKind::Fixed64, Cardinality::Singular { hasbit: 2 }, 24)
        .unwrap();
    b.string(4, Cardinality::Singular { hasbit: 3 }, 32).unwrap();
    b.build()
}

fn bench_scalar_record(c: &mut Criterion) {
    let table = scalar_layout();
    let mut input = Vec::new();
    input.extend(field_varint(1, 150));
    input.extend(field_varint(2, u64::MAX / 3));
    input.extend(varint((3 << 3 | 1) as u64));
    input.extend(0x0102_0304_0506_0708u64.to_le_bytes());
    input.extend(field_delim(4, b"twelve bytes"));

    let mut group = c.benchmark_group("scalar_record");
    group.throughput(Throughput::Bytes(input.len() as u64));
    for &alias in &[false, true] {
        let opts = DecodeOptions {
            alias,
            ..DecodeOptions::default()
        };
        group.bench_with_input(
            BenchmarkId::new("decode", if alias { "alias" } else { "copy" }),
            &input,
            |b, input| {
                b.iter(|| {
                    let arena = Arena::with_capacity(4096);
                    let msg = decode(input, &table, &arena, opts).unwrap();
                    black_box(msg.presence_word());
                })
            },
        );
    }
    group.finish();
}

fn bench_repeated_runs(c: &mut Criterion) {
    let mut b = TableBuilder::new(16);
    b.scalar(1, FieldKind::Varint32, Cardinality::Repeated, 8)
        .unwrap();
    let unpacked_table = b.build();
    let mut b = TableBuilder::new(16);
    b.scalar(1, FieldKind::Varint32, Cardinality::Packed, 8)
        .unwrap();
    let packed_table = b.build();

    let mut group = c.benchmark_group("repeated_runs");
    for &n in &[64usize, 1024] {
        let mut unpacked = Vec::new();
        let mut payload = Vec::new();
        for i in 0..n as u64 {
            unpacked.extend(field_varint(1, i * 7));
            payload.extend(varint(i * 7));
        }
        let packed = field_delim(1, &payload);

        group.throughput(Throughput::Bytes(unpacked.len() as u64));
        group.bench_with_input(BenchmarkId::new("fused_unpacked", n), &unpacked, |b, input| {
            b.iter(|| {
                let arena = Arena::with_capacity(32 * 1024);
                let msg = decode(input, &unpacked_table, &arena, DecodeOptions::default()).unwrap();
                black_box(unsafe { msg.array(8) }.map(|a| a.len));
            })
        });
        group.throughput(Throughput::Bytes(packed.len() as u64));
        group.bench_with_input(BenchmarkId::new("packed", n), &packed, |b, input| {
            b.iter(|| {
                let arena = Arena::with_capacity(32 * 1024);
                let msg = decode(input, &packed_table, &arena, DecodeOptions::default()).unwrap();
                black_box(unsafe { msg.array(8) }.map(|a| a.len));
            })
        });
    }
    group.finish();
}

fn bench_string_modes(c: &mut Criterion) {
    let mut b = TableBuilder::new(24);
    b.string(1, Cardinality::Repeated, 8).unwrap();
    let table = b.build();

    let mut group = c.benchmark_group("string_modes");
    for &len in &[8usize, 60, 500] {
        let payload = vec![0x61u8; len];
        let mut input = Vec::new();
        for _ in 0..64 {
            input.extend(field_delim(1, &payload));
        }
        group.throughput(Throughput::Bytes(input.len() as u64));
        for &alias in &[false, true] {
            let opts = DecodeOptions {
                alias,
                ..DecodeOptions::default()
            };
            let name = format!("{}_{len}b", if alias { "alias" } else { "copy" });
            group.bench_with_input(BenchmarkId::new(name, len), &input, |b, input| {
                b.iter(|| {
                    let arena = Arena::with_capacity(128 * 1024);
                    let msg = decode(input, &table, &arena, opts).unwrap();
                    black_box(unsafe { msg.array(8) }.map(|a| a.len));
                })
            });
        }
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_scalar_record,
    bench_repeated_runs,
    bench_string_modes
);
criterion_main!(benches);
