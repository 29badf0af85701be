//! Criterion microbenchmarks for the three kernel families.
//!
//! Run with: `cargo bench -p volbench-kernels --bench kernels`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use volbench_kernels::{fused, serial, staged, Dims, UniformGrid, Vec3, Volume};

fn noisy_ball(n: usize) -> Volume {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let c = (n as f32 - 1.0) / 2.0;
    Volume::from_fn(UniformGrid::new(Dims::new(n, n, n)), |p| {
        1.0 - p.distance(Vec3::splat(c)) / c + rng.gen_range(-0.01..0.01)
    })
}

fn bench_marching_cubes(c: &mut Criterion) {
    let mut group = c.benchmark_group("marching_cubes");
    let iso = 0.5;

    for n in [32usize, 64] {
        let vol = noisy_ball(n);
        group.bench_with_input(BenchmarkId::new("staged_resolved", n), &vol, |b, vol| {
            b.iter(|| {
                let class = staged::classify_marching_cubes(vol, iso).unwrap();
                let mesh = staged::generate_marching_cubes(vol, iso, &class, true);
                staged::face_normals(&mesh)
            });
        });
        group.bench_with_input(BenchmarkId::new("fused", n), &vol, |b, vol| {
            b.iter(|| fused::marching_cubes(vol, iso).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("serial", n), &vol, |b, vol| {
            b.iter(|| serial::marching_cubes_with_normals(vol, iso).unwrap());
        });
    }
    group.finish();
}

fn bench_threshold(c: &mut Criterion) {
    let mut group = c.benchmark_group("threshold");
    let vol = noisy_ball(64);

    for resolve in [false, true] {
        group.bench_with_input(BenchmarkId::new("staged", resolve), &resolve, |b, &resolve| {
            b.iter(|| {
                let class = staged::classify_threshold(&vol, 0.5, 1.0).unwrap();
                staged::generate_threshold(&vol, &class, resolve)
            });
        });
    }
    group.bench_function("fused", |b| b.iter(|| fused::threshold(&vol, 0.5, 1.0).unwrap()));
    group.bench_function("serial", |b| b.iter(|| serial::threshold(&vol, 0.5, 1.0).unwrap()));
    group.finish();
}

criterion_group!(benches, bench_marching_cubes, bench_threshold);
criterion_main!(benches);
