//! Loss strategy benchmarks.
//!
//! Compares direct, cached and lookup evaluation of the logistic loss on
//! integer data, for full evaluations and for single-coordinate sweeps as
//! polishing performs them.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Bernoulli, Distribution};

use riskslim::{CoefficientSet, Dataset, LossComputation, LossOracle};

const STRATEGIES: [LossComputation; 3] = [
    LossComputation::Normal,
    LossComputation::Fast,
    LossComputation::Lookup,
];

fn binary_dataset(n: usize, p: usize, seed: u64) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let feature = Bernoulli::new(0.4).unwrap();
    let x = Array2::from_shape_fn((n, p), |(_, j)| {
        if j == 0 || feature.sample(&mut rng) {
            1.0
        } else {
            0.0
        }
    });
    let y = Array1::from_shape_fn(n, |_| if rng.gen_bool(0.5) { 1.0 } else { -1.0 });
    Dataset::new(x, y, None).unwrap()
}

fn random_rho(p: usize, seed: u64) -> Vec<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..p).map(|_| rng.gen_range(-5..=5) as f64).collect()
}

fn bench_full_evaluation(c: &mut Criterion) {
    let p = 11;
    let mut group = c.benchmark_group("loss/full");
    for &n in &[1_000usize, 10_000] {
        let data = binary_dataset(n, p, 42);
        let coefs = CoefficientSet::with_defaults(CoefficientSet::generic_names(p)).unwrap();
        let rho = random_rho(p, 7);
        group.throughput(Throughput::Elements(n as u64));
        for strategy in STRATEGIES {
            let mut oracle = LossOracle::new(&data, &coefs, strategy).unwrap();
            group.bench_with_input(BenchmarkId::new(strategy.to_string(), n), &rho, |b, rho| {
                b.iter(|| black_box(oracle.loss(black_box(rho))));
            });
        }
    }
    group.finish();
}

fn bench_coordinate_sweep(c: &mut Criterion) {
    let p = 11;
    let n = 5_000;
    let data = binary_dataset(n, p, 43);
    let coefs = CoefficientSet::with_defaults(CoefficientSet::generic_names(p)).unwrap();
    let start = random_rho(p, 8);

    let mut group = c.benchmark_group("loss/coordinate_sweep");
    for strategy in STRATEGIES {
        let mut oracle = LossOracle::new(&data, &coefs, strategy).unwrap();
        group.bench_function(BenchmarkId::from_parameter(strategy), |b| {
            b.iter(|| {
                let mut rho = start.clone();
                let mut total = 0.0;
                for j in 1..p {
                    for value in -5..=5 {
                        rho[j] = value as f64;
                        total += oracle.loss(&rho);
                    }
                    rho[j] = start[j];
                }
                black_box(total)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_full_evaluation, bench_coordinate_sweep);
criterion_main!(benches);
