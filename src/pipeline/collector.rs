//! Fan-in of every partition's final mapping into one output sequence

use super::rejected::RejectedSummary;
use super::types::{Accumulator, AggregationKey, SummaryRecord};
use super::week::YearWeekPolicy;
use super::worker::{PartitionResult, PartitionStatus};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::hash_map;
use std::time::Duration;
use tracing::{debug, info};

/// Counters describing one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub records_ingested: u64,
    pub records_routed: u64,
    pub records_folded: u64,
    pub records_rejected: u64,
    pub records_undelivered: u64,
    pub partitions: usize,
    pub failed_partitions: usize,
    pub summaries: usize,
    pub cancelled: bool,
    pub processing_date: NaiveDate,
    pub year_week_policy: YearWeekPolicy,
    pub elapsed: Duration,
}

/// Merged result of all partitions
#[derive(Debug)]
pub struct PipelineOutput {
    partitions: Vec<PartitionResult>,
    rejected: RejectedSummary,
    report: PipelineReport,
}

/// Inputs to [`merge`] that are not per-partition
#[derive(Debug, Clone)]
pub struct RunInfo {
    pub records_ingested: u64,
    pub records_routed: u64,
    pub cancelled: bool,
    pub processing_date: NaiveDate,
    pub year_week_policy: YearWeekPolicy,
    pub elapsed: Duration,
}

/// Combine the partition results of a finished run.
///
/// Must only be called once every worker has terminated.
pub fn merge(
    partitions: Vec<PartitionResult>,
    rejected: RejectedSummary,
    run: RunInfo,
) -> PipelineOutput {
    let report = PipelineReport {
        records_ingested: run.records_ingested,
        records_routed: run.records_routed,
        records_folded: partitions.iter().map(|p| p.records_folded).sum(),
        records_rejected: partitions.iter().map(|p| p.records_rejected).sum(),
        records_undelivered: partitions.iter().map(|p| p.records_undelivered).sum(),
        partitions: partitions.len(),
        failed_partitions: partitions
            .iter()
            .filter(|p| matches!(p.status, PartitionStatus::Failed(_)))
            .count(),
        summaries: partitions.iter().map(PartitionResult::summary_count).sum(),
        cancelled: run.cancelled,
        processing_date: run.processing_date,
        year_week_policy: run.year_week_policy,
        elapsed: run.elapsed,
    };

    info!(
        "Merged {} partitions into {} summaries ({} records folded, {} rejected)",
        report.partitions, report.summaries, report.records_folded, report.records_rejected
    );

    PipelineOutput {
        partitions,
        rejected,
        report,
    }
}

impl PipelineOutput {
    /// Read every summary without consuming the output.
    ///
    /// Repeated calls yield the same records; worker and key order are
    /// unspecified.
    pub fn summaries(&self) -> impl Iterator<Item = SummaryRecord> + '_ {
        self.partitions.iter().flat_map(|p| p.summaries())
    }

    /// Consume the output as a single-pass stream of summaries
    pub fn into_summaries(self) -> SummaryStream {
        SummaryStream::new(self.partitions)
    }

    pub fn summary_count(&self) -> usize {
        self.report.summaries
    }

    pub fn partitions(&self) -> &[PartitionResult] {
        &self.partitions
    }

    /// Partitions that did not drain cleanly
    pub fn failed_partitions(&self) -> impl Iterator<Item = &PartitionResult> {
        self.partitions.iter().filter(|p| !p.is_success())
    }

    /// True when nothing was cancelled, failed or left undelivered
    pub fn is_complete(&self) -> bool {
        !self.report.cancelled && self.partitions.iter().all(PartitionResult::is_success)
    }

    pub fn rejected(&self) -> &RejectedSummary {
        &self.rejected
    }

    pub fn report(&self) -> &PipelineReport {
        &self.report
    }
}

/// Lazy, forward-only stream over all summaries.
///
/// Each partition's mapping is released as soon as it has been drained.
pub struct SummaryStream {
    partitions: std::vec::IntoIter<PartitionResult>,
    current: Option<hash_map::IntoValues<AggregationKey, Accumulator>>,
    remaining: usize,
}

impl SummaryStream {
    fn new(partitions: Vec<PartitionResult>) -> Self {
        let remaining = partitions.iter().map(PartitionResult::summary_count).sum();
        Self {
            partitions: partitions.into_iter(),
            current: None,
            remaining,
        }
    }
}

impl Iterator for SummaryStream {
    type Item = SummaryRecord;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(accumulator) = self.current.as_mut().and_then(Iterator::next) {
                self.remaining -= 1;
                return Some(accumulator.into_summary());
            }

            let partition = self.partitions.next()?;
            debug!(
                company_id = partition.company_id,
                "Draining {} summaries",
                partition.summary_count()
            );
            self.current = Some(partition.accumulators.into_values());
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for SummaryStream {}
