//! Benchmarks for graph validation and pipeline runs.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pipetree::pipeline::PipeTree;
use pipetree::testing::{tree_graph, tree_table};

fn validate_benchmark(c: &mut Criterion) {
    let tree = PipeTree::new(tree_table());
    let graph = tree_graph();

    c.bench_function("validate_tree", |b| {
        b.iter(|| black_box(tree.validate(black_box(&graph)).is_ok()));
    });
}

fn run_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime");
    let tree = PipeTree::new(tree_table());

    let mut group = c.benchmark_group("run_tree");
    for items in [100_u64, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(items), &items, |b, &items| {
            b.iter(|| {
                let counts = runtime
                    .block_on(tree.run_with_defaults(0..items))
                    .expect("pipeline run failed");
                black_box(counts.terminal_total())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, validate_benchmark, run_benchmark);
criterion_main!(benches);
