//! Benchmarks join-order enumeration over a long triple-pattern chain,
//! the scenario spec §8.4 bounds at 500ms for a 7-pattern chain under
//! DPccp.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use query_planner::cost::CostModelConfig;
use query_planner::{enumerate, StatsSnapshot};
use term_model::{TermId, TriplePattern, Variable};

fn chain_pattern(i: usize) -> TriplePattern {
    TriplePattern::new(Variable::new(format!("v{i}")), TermId(1), Variable::new(format!("v{}", i + 1)))
}

fn chain_of(n: usize) -> Vec<TriplePattern> {
    (0..n).map(chain_pattern).collect()
}

fn star_of(n: usize) -> Vec<TriplePattern> {
    (0..n)
        .map(|i| TriplePattern::new(Variable::new("center"), TermId(i as u64 + 1), Variable::new(format!("leaf{i}"))))
        .collect()
}

fn bench_chain_enumeration(c: &mut Criterion) {
    let stats = StatsSnapshot::default();
    let config = CostModelConfig::default();
    let mut group = c.benchmark_group("chain_join_enumeration");

    for n in [3usize, 5, 7, 9] {
        let patterns = chain_of(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &patterns, |b, patterns| {
            b.iter(|| enumerate(black_box(patterns), black_box(&stats), black_box(&config)).unwrap());
        });
    }
    group.finish();
}

fn bench_star_enumeration(c: &mut Criterion) {
    let stats = StatsSnapshot::default();
    let config = CostModelConfig::default();
    let mut group = c.benchmark_group("star_join_enumeration");

    for n in [3usize, 5, 7] {
        let patterns = star_of(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &patterns, |b, patterns| {
            b.iter(|| enumerate(black_box(patterns), black_box(&stats), black_box(&config)).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_chain_enumeration, bench_star_enumeration);
criterion_main!(benches);
