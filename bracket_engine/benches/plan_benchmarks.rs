use bracket_engine::bracket::{
    BracketManager, BracketPlan, CompetitorId, EngineConfig, SUPPORTED_BRACKET_SIZES,
    seed_competitors,
};
use bracket_engine::db::MemoryBracketStore;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::sync::Arc;

fn roster(n: u32) -> Vec<CompetitorId> {
    (1..=i64::from(n)).collect()
}

/// Benchmark building the match layout for every supported size
fn bench_plan_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_build");

    for size in SUPPORTED_BRACKET_SIZES.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| BracketPlan::build(size).unwrap());
        });
    }

    group.finish();
}

/// Benchmark round-one seeding with a partially filled field
fn bench_seeding(c: &mut Criterion) {
    let competitors = roster(21);

    c.bench_function("seed_21_into_32", |b| {
        b.iter(|| seed_competitors(&competitors, 32).unwrap());
    });
}

/// Benchmark full generation against the in-memory store
fn bench_generate(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("generate_memory");

    for size in [8u32, 32].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let manager = BracketManager::new(
                Arc::new(MemoryBracketStore::new()),
                EngineConfig::default(),
            );
            // Fewer competitors than positions so byes get settled too
            let competitors = roster(size - 3);
            b.iter(|| {
                runtime
                    .block_on(manager.generate(1, &competitors, size))
                    .unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(plan, bench_plan_build, bench_seeding);
criterion_group!(persistence, bench_generate);
criterion_main!(plan, persistence);
