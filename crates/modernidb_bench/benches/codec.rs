//! Key and CBOR codec benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use modernidb_codec::{from_cbor, to_cbor, Key, KeyPath};
use modernidb_bench::random_string;
use serde_json::{json, Value};

/// Create a nested array key.
fn nested_key(depth: usize) -> Key {
    if depth == 0 {
        Key::from("leaf")
    } else {
        Key::from(vec![Key::from(depth as i64), nested_key(depth - 1)])
    }
}

/// Benchmark key comparison across kinds.
fn bench_key_compare(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_compare");

    let a = Key::from(random_string(32));
    let b = Key::from(random_string(32));
    group.bench_function("string", |bench| {
        bench.iter(|| black_box(&a).cmp(black_box(&b)));
    });

    for depth in [1, 4, 16].iter() {
        let left = nested_key(*depth);
        let right = nested_key(*depth);
        group.bench_with_input(BenchmarkId::new("array", depth), depth, |bench, _| {
            bench.iter(|| black_box(&left).cmp(black_box(&right)));
        });
    }
    group.finish();
}

/// Benchmark key path evaluation.
fn bench_key_path(c: &mut Criterion) {
    let value = json!({"id": "a", "meta": {"owner": {"name": "x"}}, "tags": ["b", "a", "c", "a"]});
    let single = KeyPath::from("meta.owner.name");
    let tags = KeyPath::from("tags");

    c.bench_function("key_path/extract", |b| {
        b.iter(|| black_box(single.extract_key(black_box(&value))));
    });
    c.bench_function("key_path/multi_entry", |b| {
        b.iter(|| black_box(tags.extract_multi_entry_keys(black_box(&value))));
    });
}

/// Benchmark CBOR round trips of JSON records.
fn bench_cbor(c: &mut Criterion) {
    let mut group = c.benchmark_group("cbor");

    for fields in [4, 32, 256].iter() {
        let record: Value = (0..*fields)
            .map(|i| (format!("field_{i}"), json!(random_string(16))))
            .collect::<serde_json::Map<_, _>>()
            .into();
        let bytes = to_cbor(&record).unwrap();
        group.bench_with_input(BenchmarkId::new("encode", fields), fields, |b, _| {
            b.iter(|| to_cbor(black_box(&record)).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("decode", fields), fields, |b, _| {
            b.iter(|| from_cbor::<Value>(black_box(&bytes)).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_key_compare, bench_key_path, bench_cbor);
criterion_main!(benches);
