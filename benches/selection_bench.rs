//! Criterion benchmarks for u-sortition selection algorithms.
//!
//! Uses synthetic pools with two balanced categories so that every
//! algorithm has many feasible panels to choose from.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use u_sortition::pool::{Candidate, CandidatePool};
use u_sortition::quota::{QuotaTable, QuotaTarget};
use u_sortition::sampler::pipage_rounding;
use u_sortition::selection::{SelectionRequest, Selector};
use u_sortition::Algorithm;

// ===========================================================================
// Synthetic pool: gender x age band, quotas at +-1 of proportional
// ===========================================================================

const AGES: [&str; 3] = ["16-29", "30-59", "60+"];

fn synthetic(n: usize, k: usize) -> (CandidatePool, QuotaTable) {
    let mut rng = StdRng::seed_from_u64(42);
    let candidates: Vec<Candidate> = (0..n)
        .map(|i| {
            let gender = if rng.random::<bool>() { "female" } else { "male" };
            let age = AGES[rng.random_range(0..AGES.len())];
            Candidate::new(format!("p{i}"))
                .with_feature("gender", gender)
                .with_feature("age", age)
        })
        .collect();
    let pool = CandidatePool::new(candidates).expect("synthetic ids are unique");

    let mut targets = Vec::new();
    for (category, values) in [("gender", &["female", "male"][..]), ("age", &AGES[..])] {
        for &value in values {
            let available = pool.iter().filter(|c| c.feature(category) == Some(value)).count();
            let share = (available * k) / n;
            targets.push(QuotaTarget::new(
                category,
                value,
                share.saturating_sub(1),
                (share + 1).min(available),
            ));
        }
    }
    let quotas = QuotaTable::new(targets).expect("synthetic quotas are valid");
    (pool, quotas)
}

// ===========================================================================
// Full selection runs
// ===========================================================================

fn bench_algorithm(c: &mut Criterion, name: &str, algorithm: Algorithm, sizes: &[(usize, usize)]) {
    let mut group = c.benchmark_group(name);
    group.sample_size(10);

    let selector = Selector::new();
    for &(n, k) in sizes {
        let inputs = synthetic(n, k);
        let request = SelectionRequest::new(k).with_algorithm(algorithm).with_seed(42);
        group.bench_with_input(
            BenchmarkId::new(format!("n{}_k{}", n, k), n),
            &(inputs, request),
            |b, ((pool, quotas), request)| {
                b.iter(|| {
                    let result =
                        selector.run(black_box(pool), black_box(quotas), black_box(request));
                    black_box(result)
                })
            },
        );
    }
    group.finish();
}

fn bench_legacy(c: &mut Criterion) {
    bench_algorithm(c, "legacy", Algorithm::Legacy, &[(50, 10), (200, 30), (500, 60)]);
}

fn bench_maximin(c: &mut Criterion) {
    bench_algorithm(c, "maximin", Algorithm::Maximin, &[(20, 6), (40, 10)]);
}

fn bench_leximin(c: &mut Criterion) {
    bench_algorithm(c, "leximin", Algorithm::Leximin, &[(20, 6), (40, 10)]);
}

fn bench_nash(c: &mut Criterion) {
    bench_algorithm(c, "nash", Algorithm::Nash, &[(20, 6), (40, 10)]);
}

// ===========================================================================
// Dependent rounding
// ===========================================================================

fn bench_pipage(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipage_rounding");

    for &n in &[100usize, 1_000, 10_000] {
        let mut rng = StdRng::seed_from_u64(7);
        let items: Vec<(usize, f64)> = (0..n).map(|i| (i, rng.random_range(0.0..1.0))).collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &items, |b, items| {
            let mut rng = StdRng::seed_from_u64(42);
            b.iter(|| black_box(pipage_rounding(black_box(items), &mut rng)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_legacy, bench_maximin, bench_leximin, bench_nash, bench_pipage);
criterion_main!(benches);
