//! Dense-solve benchmarks across typical MNA system sizes.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use nalgebra::{DMatrix, DVector};
use voltaic_solver::solve_dense;

fn diagonally_dominant(size: usize) -> (DMatrix<f64>, DVector<f64>) {
    let a = DMatrix::from_fn(size, size, |i, j| {
        if i == j {
            size as f64 + 1.0
        } else {
            1.0 / ((i as f64 - j as f64).abs() + 1.0)
        }
    });
    let b = DVector::from_fn(size, |i, _| (i + 1) as f64);
    (a, b)
}

fn bench_solve_dense(c: &mut Criterion) {
    let mut group = c.benchmark_group("solve_dense");
    for size in [10usize, 50, 100, 200] {
        let (a, b) = diagonally_dominant(size);
        group.bench_function(format!("n={size}"), |bencher| {
            bencher.iter(|| solve_dense(black_box(&a), black_box(&b)).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_solve_dense);
criterion_main!(benches);
