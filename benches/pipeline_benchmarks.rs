//! Throughput benchmarks for the aggregation pipeline
//! Measures end-to-end summarize cost across input sizes, partition counts
//! and queue bounds

use chrono::NaiveDate;
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use sales_summary::config::{PipelineConfig, SourceConfig};
use sales_summary::pipeline::{week_of_year, SalesPipeline, TransactionRecord};
use sales_summary::source::SalesDataGenerator;
use std::hint::black_box;
use tokio::runtime::Runtime;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

/// Pre-projected records so only the pipeline is measured
fn create_records(count: usize, companies: u32) -> Vec<TransactionRecord> {
    let source = SourceConfig {
        seed: Some(42),
        payload_bytes: 0,
        companies,
        ..SourceConfig::default()
    };
    SalesDataGenerator::with_today(&source, today())
        .records(count)
        .map(TransactionRecord::from)
        .collect()
}

fn bench_summarize_throughput(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("summarize_throughput");

    for size in &[1_000usize, 10_000, 100_000] {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("records", size), size, |b, &size| {
            b.to_async(&rt).iter_batched(
                || create_records(size, 5),
                |records| async move {
                    let output = SalesPipeline::new(PipelineConfig::default())
                        .with_processing_date(today())
                        .summarize(records)
                        .await
                        .unwrap();
                    black_box(output.summary_count());
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

fn bench_partition_scaling(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("partition_scaling");

    for companies in &[1u32, 5, 50, 500] {
        group.bench_with_input(
            BenchmarkId::new("companies", companies),
            companies,
            |b, &companies| {
                b.to_async(&rt).iter_batched(
                    || create_records(20_000, companies),
                    |records| async move {
                        let output = SalesPipeline::new(PipelineConfig::default())
                            .with_processing_date(today())
                            .summarize(records)
                            .await
                            .unwrap();
                        black_box(output.report().partitions);
                    },
                    BatchSize::LargeInput,
                );
            },
        );
    }

    group.finish();
}

fn bench_bounded_queues(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("bounded_queues");

    for capacity in &[None, Some(16usize), Some(1024)] {
        let label = capacity.map_or_else(|| "unbounded".to_string(), |c| c.to_string());
        group.bench_with_input(
            BenchmarkId::new("partition_capacity", label),
            capacity,
            |b, &capacity| {
                b.to_async(&rt).iter_batched(
                    || create_records(20_000, 5),
                    |records| async move {
                        let config = PipelineConfig {
                            partition_capacity: capacity,
                            ..PipelineConfig::default()
                        };
                        let output = SalesPipeline::new(config)
                            .with_processing_date(today())
                            .summarize(records)
                            .await
                            .unwrap();
                        black_box(output.summary_count());
                    },
                    BatchSize::LargeInput,
                );
            },
        );
    }

    group.finish();
}

fn bench_week_of_year(c: &mut Criterion) {
    let dates: Vec<_> = (0..365)
        .filter_map(|d| NaiveDate::from_yo_opt(2024, d + 1))
        .collect();

    c.bench_function("week_of_year_full_year", |b| {
        b.iter(|| {
            for date in &dates {
                black_box(week_of_year(*date));
            }
        })
    });
}

criterion_group!(
    benches,
    bench_summarize_throughput,
    bench_partition_scaling,
    bench_bounded_queues,
    bench_week_of_year
);

criterion_main!(benches);
