use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use std::sync::Arc;
use stepflow::config::EngineConfig;
use stepflow::executors::CapabilityRegistry;
use stepflow::history::AuditHistory;
use stepflow::metrics::MetricsAggregator;
use stepflow::models::{ExecuteOptions, Execution, Step, WorkflowDefinition};
use stepflow::orchestrator::Orchestrator;
use stepflow::parser::parse_workflow_yaml;
use tokio::runtime::Runtime;

/// Orchestrator with an in-memory no-op capability and one `steps`-long workflow
fn orchestrator_with_workflow(steps: usize) -> Orchestrator {
    let mut capabilities = CapabilityRegistry::new();
    capabilities.register_fn("bench", "noop", |_| Ok(json!(null)));

    let orchestrator =
        Orchestrator::new(Arc::new(capabilities), &EngineConfig::default()).unwrap();
    let definition = WorkflowDefinition::new(
        "bench",
        "Benchmark workflow",
        (0..steps).map(|_| Step::new("bench", "noop")).collect(),
    );
    orchestrator.register_workflow("bench", definition).unwrap();
    orchestrator
}

fn finished_execution(duration_ms: i64) -> Execution {
    let start = chrono::Utc::now();
    let mut execution = Execution::start("bench", ExecuteOptions::default(), start);
    execution.complete(start + chrono::Duration::milliseconds(duration_ms));
    execution
}

/// Engine overhead per workflow for different step counts
fn bench_sequential_execution(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("sequential_execution");

    for steps in [1usize, 10, 100] {
        let orchestrator = orchestrator_with_workflow(steps);
        group.throughput(Throughput::Elements(steps as u64));
        group.bench_with_input(BenchmarkId::new("steps", steps), &steps, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    let execution = orchestrator
                        .execute_workflow(black_box("bench"), ExecuteOptions::default())
                        .await
                        .unwrap();
                    black_box(execution);
                })
            });
        });
    }

    group.finish();
}

/// Concurrent executions of the same workflow
fn bench_concurrent_execution(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("concurrent_execution");
    let orchestrator = orchestrator_with_workflow(10);

    for concurrency in [4usize, 16] {
        group.throughput(Throughput::Elements(concurrency as u64));
        group.bench_with_input(
            BenchmarkId::new("executions", concurrency),
            &concurrency,
            |b, &concurrency| {
                b.iter(|| {
                    rt.block_on(async {
                        let runs = (0..concurrency).map(|_| {
                            orchestrator.execute_workflow("bench", ExecuteOptions::default())
                        });
                        for result in futures::future::join_all(runs).await {
                            black_box(result.unwrap());
                        }
                    })
                });
            },
        );
    }

    group.finish();
}

fn bench_metrics_and_history(c: &mut Criterion) {
    let mut group = c.benchmark_group("bookkeeping");
    let execution = finished_execution(250);

    group.bench_function("metrics_record", |b| {
        let metrics = MetricsAggregator::new().unwrap();
        b.iter(|| metrics.record(black_box(&execution)));
    });

    group.bench_function("history_append_full", |b| {
        let history = AuditHistory::default();
        for _ in 0..history.capacity() {
            history.append(execution.clone());
        }
        b.iter(|| history.append(black_box(execution.clone())));
    });

    group.finish();
}

fn bench_yaml_parsing(c: &mut Criterion) {
    let mut yaml = "workflows:\n".to_string();
    for i in 0..50 {
        yaml.push_str(&format!(
            "  - id: workflow-{i}\n    steps:\n      - target: system\n        action: echo\n        params:\n          index: {i}\n      - target: shell\n        action: run\n        params:\n          command: /bin/true\n"
        ));
    }
    yaml.push_str("schedules:\n  - workflow_id: workflow-0\n    schedule:\n      type: hourly\n");

    c.bench_function("parse_50_workflows", |b| {
        b.iter(|| parse_workflow_yaml(black_box(&yaml)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_sequential_execution,
    bench_concurrent_execution,
    bench_metrics_and_history,
    bench_yaml_parsing
);
criterion_main!(benches);
