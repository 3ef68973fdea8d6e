//! Aggregation worker
//!
//! One worker per company id. It is the only owner of its partition's
//! key -> accumulator map, so folding needs no locking.

use super::queue::{Pull, QueueReceiver};
use super::rejected::{RejectedRecord, RejectedRecords};
use super::types::{Accumulator, AggregationKey, CompanyId, SummaryRecord, TransactionRecord};
use super::week::WeekBucketer;
use crate::error::RecordError;
use std::collections::hash_map::Entry;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Final state of a partition
#[derive(Debug, Clone, PartialEq)]
pub enum PartitionStatus {
    /// Queue drained after its completion signal
    Completed,
    /// Stopped early by a cancellation request; totals are partial
    Cancelled,
    /// Worker stopped on a panic. Totals folded before the failing record
    /// are kept; a task that died outright contributes none.
    Failed(String),
}

/// A partition's contribution to the final output
#[derive(Debug, Clone)]
pub struct PartitionResult {
    pub company_id: CompanyId,
    pub status: PartitionStatus,
    pub accumulators: HashMap<AggregationKey, Accumulator>,
    pub records_folded: u64,
    pub records_rejected: u64,
    /// Records the router could not hand over because the worker was gone
    pub records_undelivered: u64,
    pub duration: Duration,
}

impl PartitionResult {
    pub fn failed(company_id: CompanyId, message: impl Into<String>) -> Self {
        Self {
            company_id,
            status: PartitionStatus::Failed(message.into()),
            accumulators: HashMap::new(),
            records_folded: 0,
            records_rejected: 0,
            records_undelivered: 0,
            duration: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, PartitionStatus::Completed) && self.records_undelivered == 0
    }

    pub fn summary_count(&self) -> usize {
        self.accumulators.len()
    }

    pub fn summaries(&self) -> impl Iterator<Item = SummaryRecord> + '_ {
        self.accumulators.values().map(Accumulator::to_summary)
    }
}

/// Shared settings handed to every worker the router spawns
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub bucketer: Arc<WeekBucketer>,
    pub rejected: RejectedRecords,
    pub cancel: CancellationToken,
}

pub struct AggregationWorker {
    company_id: CompanyId,
    queue: QueueReceiver<TransactionRecord>,
    context: WorkerContext,
    accumulators: HashMap<AggregationKey, Accumulator>,
    records_folded: u64,
    records_rejected: u64,
}

impl AggregationWorker {
    pub fn new(
        company_id: CompanyId,
        queue: QueueReceiver<TransactionRecord>,
        context: WorkerContext,
    ) -> Self {
        Self {
            company_id,
            queue,
            context,
            accumulators: HashMap::new(),
            records_folded: 0,
            records_rejected: 0,
        }
    }

    pub fn accumulators(&self) -> &HashMap<AggregationKey, Accumulator> {
        &self.accumulators
    }

    /// Fold one record into its accumulator
    pub fn fold(&mut self, record: &TransactionRecord) -> Result<(), RecordError> {
        let year_week = self.context.bucketer.bucket(&record.sales_date)?;
        let key = AggregationKey::for_record(record, year_week);

        match self.accumulators.entry(key) {
            Entry::Occupied(mut entry) => entry.get_mut().add(record)?,
            Entry::Vacant(entry) => {
                entry.insert(Accumulator::seed(record, year_week));
            }
        }

        self.records_folded += 1;
        trace!(
            company_id = self.company_id,
            "Folded record into week {}", year_week
        );
        Ok(())
    }

    /// Drain the partition queue until it completes or is cancelled
    pub async fn run(self) -> PartitionResult {
        self.run_with(Self::fold).await
    }

    async fn run_with<F>(mut self, mut fold: F) -> PartitionResult
    where
        F: FnMut(&mut Self, &TransactionRecord) -> Result<(), RecordError>,
    {
        let started = Instant::now();
        debug!(company_id = self.company_id, "Aggregation worker started");

        let status = loop {
            match self.queue.pull(&self.context.cancel).await {
                Pull::Item(record) => {
                    let folded = panic::catch_unwind(AssertUnwindSafe(|| fold(&mut self, &record)));
                    match folded {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => {
                            self.records_rejected += 1;
                            self.context
                                .rejected
                                .add(RejectedRecord::new(record, &err))
                                .await;
                        }
                        Err(payload) => {
                            let message = match panic_message(payload.as_ref()) {
                                Some(message) => format!("panicked while folding: {message}"),
                                None => "panicked while folding".to_string(),
                            };
                            warn!(
                                company_id = self.company_id,
                                "Aggregation worker failed after {} records: {}",
                                self.records_folded,
                                message
                            );
                            break PartitionStatus::Failed(message);
                        }
                    }
                }
                Pull::Completed => break PartitionStatus::Completed,
                Pull::Cancelled => {
                    if self.queue.is_empty() {
                        warn!(company_id = self.company_id, "Aggregation worker cancelled");
                    } else {
                        warn!(
                            company_id = self.company_id,
                            "Aggregation worker cancelled with {} records pending",
                            self.queue.len()
                        );
                    }
                    break PartitionStatus::Cancelled;
                }
            }
        };

        self.queue.close();

        let duration = started.elapsed();
        debug!(
            company_id = self.company_id,
            "Aggregation worker finished: {} records folded into {} keys, {} rejected in {:?}",
            self.records_folded,
            self.accumulators.len(),
            self.records_rejected,
            duration
        );

        PartitionResult {
            company_id: self.company_id,
            status,
            accumulators: self.accumulators,
            records_folded: self.records_folded,
            records_rejected: self.records_rejected,
            records_undelivered: 0,
            duration,
        }
    }
}

/// Text of a panic payload raised with a string message
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> Option<&str> {
    if let Some(message) = payload.downcast_ref::<&str>() {
        Some(*message)
    } else {
        payload.downcast_ref::<String>().map(String::as_str)
    }
}
