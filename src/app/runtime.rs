//! Runtime wiring
//!
//! Builds the source, pipeline and sink from [`Settings`], runs them in
//! order and reports the outcome on the console. A run that was cancelled
//! or lost a partition is never handed to the sink.

use crate::app::{config::AppConfig, logging::init_logging};
use crate::config::{Settings, SinkFormat};
use crate::error::{ErrorCode, PipelineError};
use crate::pipeline::{PartitionStatus, PipelineOutput, PipelineReport, SalesPipeline};
use crate::sink::{self, SinkReport};
use crate::source::SalesDataGenerator;
use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub pipeline: PipelineReport,
    pub sink: SinkReport,
    pub elapsed: Duration,
}

/// Initialize the application with proper logging and configuration
pub fn initialize_app(config: &AppConfig) {
    init_logging(config);
}

/// Cancel `token` on Ctrl-C
pub fn cancel_on_ctrl_c(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling pipeline");
            token.cancel();
        }
    })
}

/// Generate, aggregate and write summaries as configured
pub async fn run_pipeline(settings: Settings, cancel: CancellationToken) -> Result<RunSummary> {
    settings.validate()?;
    let started = Instant::now();

    println!("Starting...");
    let generator = SalesDataGenerator::new(&settings.source);
    println!("Getting data... ({} records)", settings.source.sample_size);

    let pipeline = SalesPipeline::new(settings.pipeline.clone()).with_cancellation(cancel);
    let output = pipeline
        .summarize(generator.records(settings.source.sample_size))
        .await?;

    ensure_complete(&output)?;

    let rejected = output.rejected();
    if !rejected.is_empty() {
        warn!(
            "{} records were rejected ({} retained for inspection)",
            rejected.total,
            rejected.records.len()
        );
    }

    let mut sink = sink::from_config(&settings.sink)?;
    match (&settings.sink.format, &settings.sink.output) {
        (SinkFormat::Stats, _) => println!("Writing records..."),
        (_, Some(path)) => println!("Writing records to {}...", path.display()),
        (_, None) => {}
    }

    let pipeline_report = output.report().clone();
    let sink_report = tokio::task::spawn_blocking(move || {
        let mut summaries = output.into_summaries();
        sink.write(&mut summaries)
    })
    .await
    .context("Sink task failed")??;

    println!(
        "Records saved. Total record count: {}, Total Volume: {}, Total Price: {}",
        sink_report.records, sink_report.total_volume, sink_report.total_price
    );

    let elapsed = started.elapsed();
    println!(
        "Processing sales data completed. Total time: {} seconds.",
        elapsed.as_secs_f64()
    );
    info!(
        "{} records in {} partitions -> {} summaries",
        pipeline_report.records_ingested, pipeline_report.partitions, pipeline_report.summaries
    );

    Ok(RunSummary {
        pipeline: pipeline_report,
        sink: sink_report,
        elapsed,
    })
}

/// Refuse to commit the output of a run that did not finish cleanly
fn ensure_complete(output: &PipelineOutput) -> std::result::Result<(), PipelineError> {
    if output.is_complete() {
        return Ok(());
    }

    let report = output.report();
    if report.cancelled {
        return Err(PipelineError::cancelled(report.records_ingested));
    }

    let failures: Vec<String> = output
        .failed_partitions()
        .map(|partition| match &partition.status {
            PartitionStatus::Failed(message) => {
                format!("company {}: {}", partition.company_id, message)
            }
            _ => format!(
                "company {}: {} records undelivered",
                partition.company_id, partition.records_undelivered
            ),
        })
        .collect();
    for failure in &failures {
        warn!("Partition failed: {}", failure);
    }

    Err(PipelineError::pipeline(
        ErrorCode::PIPELINE_PARTITION_FAILED,
        format!(
            "{} partition(s) did not complete, summaries were not written: {}",
            failures.len(),
            failures.join("; ")
        ),
    ))
}
