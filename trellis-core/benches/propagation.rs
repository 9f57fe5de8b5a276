//! Benchmarks for mutation batching and change propagation
//!
//! Run with: cargo bench -p trellis-core --bench propagation

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use std::hint::black_box;
use trellis_core::{derived, flush_sync, listen, reactive, Value};

/// Build an object with `n` scalar keys named `k0..kn`.
fn wide_object(n: usize) -> Value {
    let map: serde_json::Map<String, serde_json::Value> =
        (0..n).map(|i| (format!("k{i}"), json!(0))).collect();
    Value::from(serde_json::Value::Object(map))
}

/// Build a chain of nested objects `depth` levels deep ending in `x`.
fn nested_object(depth: usize) -> Value {
    let mut inner = json!({"x": 0});
    for _ in 0..depth {
        inner = json!({"c": inner});
    }
    Value::from(inner)
}

fn bench_fanout_updates(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation/fanout");

    for n in [16usize, 256, 4096] {
        group.throughput(Throughput::Elements(n as u64));
        let r = reactive(wide_object(n));
        let keys: Vec<String> = (0..n).map(|i| format!("k{i}")).collect();
        let _guard = listen(&r, |ev| {
            black_box(ev.kind_str());
        });

        let mut tick = 0i64;
        group.bench_with_input(BenchmarkId::new("flush", n), &(), |b, _| {
            b.iter(|| {
                tick += 1;
                for key in &keys {
                    r.set(key.as_str(), tick);
                }
                flush_sync();
            })
        });
    }

    group.finish();
}

fn bench_deep_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation/deep_chain");

    for depth in [4usize, 16, 64] {
        let r = reactive(nested_object(depth));

        // Traverse once so every level is wired into the graph.
        let mut leaf = r.clone();
        for _ in 0..depth {
            leaf = leaf.get("c");
        }
        let _guard = listen(&r, |ev| {
            black_box(ev.kind_str());
        });

        let mut tick = 0i64;
        group.bench_with_input(BenchmarkId::new("leaf_write", depth), &(), |b, _| {
            b.iter(|| {
                tick += 1;
                leaf.set("x", tick);
                flush_sync();
            })
        });
    }

    group.finish();
}

fn bench_collapse(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation/collapse");

    for writes in [10usize, 1000] {
        group.throughput(Throughput::Elements(writes as u64));
        let r = reactive(json!({"a": 0}));
        let _guard = listen(&r, |ev| {
            black_box(ev.kind_str());
        });

        let mut tick = 0i64;
        group.bench_with_input(BenchmarkId::new("single_key", writes), &(), |b, _| {
            b.iter(|| {
                for _ in 0..writes {
                    tick += 1;
                    r.set("a", tick);
                }
                flush_sync();
            })
        });
    }

    group.finish();
}

fn bench_array_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation/array_churn");

    for len in [16usize, 256] {
        let seed: Vec<serde_json::Value> = (0..len).map(|i| json!(i)).collect();
        let arr = reactive(Value::from(serde_json::Value::Array(seed)));
        let _guard = listen(&arr, |ev| {
            black_box(ev.kind_str());
        });

        group.bench_with_input(BenchmarkId::new("push_pop", len), &(), |b, _| {
            b.iter(|| {
                arr.push(Value::Int(-1)).unwrap();
                arr.pop().unwrap();
                flush_sync();
            })
        });
    }

    group.finish();
}

fn bench_derived_invalidation(c: &mut Criterion) {
    let arr = reactive(json!([10, 20, 30]));
    let h = arr.clone();
    let d = derived(move || h.get_index(0));

    let mut tick = 0i64;
    c.bench_function("propagation/derived_reval", |b| {
        b.iter(|| {
            tick += 1;
            arr.set_index(0, tick);
            black_box(d.get("value"));
        })
    });
}

criterion_group!(
    benches,
    bench_fanout_updates,
    bench_deep_chain,
    bench_collapse,
    bench_array_churn,
    bench_derived_invalidation,
);

criterion_main!(benches);
