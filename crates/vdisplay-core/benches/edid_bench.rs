//! Criterion benchmarks for EDID synthesis.
//!
//! Synthesis runs on every create and every mode change, while the registry
//! lock is held, so it should stay in the low-microsecond range.
//!
//! Run with:
//! ```bash
//! cargo bench --package vdisplay-core --bench edid_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use vdisplay_core::edid::{synthesize, verify};

fn bench_synthesize(c: &mut Criterion) {
    let mut group = c.benchmark_group("edid_synthesize");

    for (label, width, height, refresh) in [
        ("1080p60_canonical", 1920u32, 1080u32, 60u32),
        ("2160p60_extension", 3840, 2160, 60),
        ("1600x900_approximated", 1600, 900, 75),
    ] {
        group.bench_with_input(
            BenchmarkId::from_parameter(label),
            &(width, height, refresh),
            |b, &(w, h, r)| b.iter(|| synthesize(black_box(w), black_box(h), black_box(r))),
        );
    }

    group.finish();
}

fn bench_verify(c: &mut Criterion) {
    let edid = synthesize(3840, 2160, 60);
    c.bench_function("edid_verify_256", |b| b.iter(|| verify(black_box(&edid))));
}

criterion_group!(benches, bench_synthesize, bench_verify);
criterion_main!(benches);
