//! Performance benchmarks for map/reduce query execution
//! Measures end-to-end queries, fan-out width and result collection

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use shardscript::mapreduce::{NodeResult, ResultCollection};
use shardscript::{
    EngineConfig, MemoryStore, PartitionId, Query, ScalarValue, ShardEngine,
};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

const LONGEST_KEY: &str = include_str!("../scripts/longest_key.wat");

/// Build a store with `partitions` partitions of `records` keys each
fn create_store(rt: &Runtime, partitions: u32, records: usize) -> Arc<MemoryStore> {
    rt.block_on(async {
        let store = MemoryStore::with_partitions((0..partitions).map(PartitionId));
        for partition in 0..partitions {
            for i in 0..records {
                store
                    .put(PartitionId(partition), format!("key_{partition}_{i:06}"), "value")
                    .await;
            }
        }
        Arc::new(store)
    })
}

fn create_engine(store: Arc<MemoryStore>, max_parallel: usize) -> ShardEngine {
    let mut config = EngineConfig::default();
    config.execution.max_parallel = max_parallel;
    ShardEngine::new(config, store).unwrap()
}

fn bench_end_to_end_query(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("end_to_end_query");

    for records in &[100, 1_000, 10_000] {
        let engine = create_engine(create_store(&rt, 4, *records), 4);
        let partitions: Vec<PartitionId> = (0..4).map(PartitionId).collect();
        let query = Query::single_source(LONGEST_KEY, Duration::from_secs(30));

        group.bench_with_input(BenchmarkId::new("records", records), records, |b, _| {
            b.to_async(&rt)
                .iter(|| async { black_box(engine.execute(&query, &partitions).await.unwrap()) });
        });
    }

    group.finish();
}

fn bench_fan_out(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("fan_out");
    let store = create_store(&rt, 32, 100);
    let partitions: Vec<PartitionId> = (0..32).map(PartitionId).collect();
    let query = Query::single_source(LONGEST_KEY, Duration::from_secs(30));

    for parallel in &[1, 4, 16] {
        let engine = create_engine(Arc::clone(&store), *parallel);
        group.bench_with_input(
            BenchmarkId::new("max_parallel", parallel),
            parallel,
            |b, _| {
                b.to_async(&rt)
                    .iter(|| async { black_box(engine.execute(&query, &partitions).await.unwrap()) });
            },
        );
    }

    group.finish();
}

fn bench_result_collection(c: &mut Criterion) {
    let mut group = c.benchmark_group("result_collection");

    for count in &[16, 256, 4_096] {
        let results: Vec<NodeResult> = (0..*count)
            .rev()
            .map(|i| NodeResult {
                partition: PartitionId(i),
                value: ScalarValue::Int(i64::from(i % 97)),
                duration: Duration::from_millis(1),
                logs: Vec::new(),
            })
            .collect();

        group.bench_with_input(BenchmarkId::new("build_and_max", count), count, |b, _| {
            b.iter(|| {
                let collection = ResultCollection::from_results(black_box(results.clone()));
                black_box(collection.max())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_end_to_end_query,
    bench_fan_out,
    bench_result_collection
);
criterion_main!(benches);
