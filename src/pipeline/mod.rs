//! Streaming partition-and-aggregate pipeline
//!
//! Records are pushed from the caller's task into the ingestion queue. A
//! single router task demultiplexes them by company id, lazily spawning one
//! aggregation worker per company. Once the source is exhausted and every
//! worker has drained its partition queue, the collector merges all
//! partition mappings into one output.
//!
//! ```text
//! source -> ingestion queue -> router -> { partition queue -> worker }* -> collector
//! ```

pub mod collector;
pub mod queue;
pub mod rejected;
pub mod router;
pub mod types;
pub mod week;
pub mod worker;

pub use collector::{PipelineOutput, PipelineReport, SummaryStream};
pub use queue::QueueCapacity;
pub use rejected::{RejectedRecord, RejectedRecords, RejectedSummary, RejectionReason};
pub use router::PartitionRouter;
pub use types::{
    Accumulator, AggregationKey, CompanyId, ProductId, SummaryRecord, TransactionRecord, YearWeek,
};
pub use week::{week_of_year, WeekBucketer, YearWeekPolicy};
pub use worker::{AggregationWorker, PartitionResult, PartitionStatus, WorkerContext};

use crate::config::PipelineConfig;
use crate::error::{ErrorCode, PipelineError, Result};
use chrono::NaiveDate;
use collector::RunInfo;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// Records pushed between voluntary yields to the router
const INGEST_YIELD_INTERVAL: u64 = 1024;

/// Entry point of the aggregation core
#[derive(Debug, Clone)]
pub struct SalesPipeline {
    config: PipelineConfig,
    cancel: CancellationToken,
    processing_date: Option<NaiveDate>,
}

impl SalesPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
            processing_date: None,
        }
    }

    /// Stop the pipeline when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Fix the processing date used by the year-week correction instead of
    /// reading the local clock when a run starts
    pub fn with_processing_date(mut self, date: NaiveDate) -> Self {
        self.processing_date = Some(date);
        self
    }

    /// Aggregate every record of `source`.
    ///
    /// The source is read once, on the calling task. Returns once the router
    /// and all workers have terminated. A cancelled run still returns its
    /// partial output; check [`PipelineOutput::is_complete`].
    pub async fn summarize<I>(&self, source: I) -> Result<PipelineOutput>
    where
        I: IntoIterator,
        I::Item: Into<TransactionRecord>,
    {
        let started = Instant::now();
        let policy = self.config.year_week_policy;
        let bucketer = match self.processing_date {
            Some(date) => WeekBucketer::new(policy, date),
            None => WeekBucketer::today(policy),
        };

        info!(
            "Starting pipeline (processing date {}, {:?} week policy)",
            bucketer.processing_date(),
            bucketer.policy()
        );

        // Child token so a failed router can stop its own workers without
        // cancelling the caller's token
        let cancel = self.cancel.child_token();
        let rejected = RejectedRecords::new(self.config.max_rejected_retained);
        let processing_date = bucketer.processing_date();
        let context = WorkerContext {
            bucketer: Arc::new(bucketer),
            rejected: rejected.clone(),
            cancel: cancel.clone(),
        };

        let (ingestion_tx, ingestion_rx) = queue::channel(self.config.ingestion_queue());
        let router = PartitionRouter::new(ingestion_rx, self.config.partition_queue(), context);
        let router_task = tokio::spawn(router.run().instrument(info_span!("router")));

        let mut records_ingested = 0u64;
        let mut interrupted = false;
        for item in source {
            if cancel.is_cancelled() {
                interrupted = true;
                break;
            }
            if ingestion_tx.push(item.into()).await.is_err() {
                warn!("Ingestion queue closed after {} records", records_ingested);
                interrupted = true;
                break;
            }
            records_ingested += 1;
            if records_ingested % INGEST_YIELD_INTERVAL == 0 {
                tokio::task::yield_now().await;
            }
        }
        ingestion_tx.complete();
        debug!("Source exhausted after {} records", records_ingested);

        let outcome = match router_task.await {
            Ok(outcome) => outcome,
            Err(err) => {
                cancel.cancel();
                return Err(PipelineError::pipeline(
                    ErrorCode::PIPELINE_ROUTER_FAILED,
                    router::describe_join_error(err),
                ));
            }
        };

        let cancelled = outcome.cancelled
            || interrupted
            || outcome
                .partitions
                .iter()
                .any(|p| p.status == PartitionStatus::Cancelled);
        if cancelled {
            warn!(
                "Pipeline cancelled after ingesting {} records",
                records_ingested
            );
        }

        let rejected = rejected.drain().await;
        Ok(collector::merge(
            outcome.partitions,
            rejected,
            RunInfo {
                records_ingested,
                records_routed: outcome.records_routed,
                cancelled,
                processing_date,
                year_week_policy: policy,
                elapsed: started.elapsed(),
            },
        ))
    }
}
