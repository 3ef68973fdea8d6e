//! Partition router
//!
//! Sole consumer of the ingestion queue. Demultiplexes records by company
//! id, lazily spawning one aggregation worker per company, and does not
//! finish until every worker it spawned has finished.

use super::queue::{self, Pull, QueueCapacity, QueueReceiver, QueueSender};
use super::types::{CompanyId, TransactionRecord};
use super::worker::{panic_message, AggregationWorker, PartitionResult, WorkerContext};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, info_span, warn, Instrument};

/// Router-side handle on one partition
struct PartitionHandle {
    queue: QueueSender<TransactionRecord>,
    records_routed: u64,
    records_undelivered: u64,
}

/// What the router hands back once it and all its workers are done
#[derive(Debug)]
pub struct RouterOutcome {
    pub partitions: Vec<PartitionResult>,
    pub records_routed: u64,
    pub cancelled: bool,
}

pub struct PartitionRouter {
    ingestion: QueueReceiver<TransactionRecord>,
    partition_capacity: QueueCapacity,
    context: WorkerContext,
    partitions: HashMap<CompanyId, PartitionHandle>,
    workers: Vec<(CompanyId, JoinHandle<PartitionResult>)>,
    records_routed: u64,
}

impl PartitionRouter {
    pub fn new(
        ingestion: QueueReceiver<TransactionRecord>,
        partition_capacity: QueueCapacity,
        context: WorkerContext,
    ) -> Self {
        Self {
            ingestion,
            partition_capacity,
            context,
            partitions: HashMap::new(),
            workers: Vec::new(),
            records_routed: 0,
        }
    }

    /// Number of partitions created so far
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Forward a record to its partition, creating the partition on first sight
    pub async fn route(&mut self, record: TransactionRecord) {
        let company_id = record.company_id;

        let handle = match self.partitions.entry(company_id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let (tx, rx) = queue::channel(self.partition_capacity);
                let worker = AggregationWorker::new(company_id, rx, self.context.clone());
                let join = tokio::spawn(
                    worker
                        .run()
                        .instrument(info_span!("partition", company_id = company_id)),
                );
                self.workers.push((company_id, join));
                debug!(company_id, "Created partition {}", self.workers.len());

                entry.insert(PartitionHandle {
                    queue: tx,
                    records_routed: 0,
                    records_undelivered: 0,
                })
            }
        };

        match handle.queue.push(record).await {
            Ok(()) => {
                handle.records_routed += 1;
                self.records_routed += 1;
            }
            Err(_) => {
                handle.records_undelivered += 1;
                if handle.records_undelivered == 1 {
                    warn!(company_id, "Partition queue closed, records are not delivered");
                }
            }
        }
    }

    /// Route until the ingestion queue completes, then signal completion to
    /// every partition and wait for all workers.
    pub async fn run(mut self) -> RouterOutcome {
        let cancel = self.context.cancel.clone();
        let mut cancelled = false;

        loop {
            match self.ingestion.pull(&cancel).await {
                Pull::Item(record) => self.route(record).await,
                Pull::Completed => break,
                Pull::Cancelled => {
                    cancelled = true;
                    break;
                }
            }
        }
        self.ingestion.close();

        info!(
            "Routed {} records into {} partitions",
            self.records_routed,
            self.partitions.len()
        );

        let mut undelivered = HashMap::with_capacity(self.partitions.len());
        for (company_id, handle) in self.partitions.drain() {
            debug!(
                company_id,
                "Completing partition queue after {} records", handle.records_routed
            );
            undelivered.insert(company_id, handle.records_undelivered);
            handle.queue.complete();
        }

        let partitions = join_workers(self.workers, &undelivered).await;

        RouterOutcome {
            partitions,
            records_routed: self.records_routed,
            cancelled,
        }
    }
}

/// Wait for every spawned worker, however many there turned out to be
async fn join_workers(
    workers: Vec<(CompanyId, JoinHandle<PartitionResult>)>,
    undelivered: &HashMap<CompanyId, u64>,
) -> Vec<PartitionResult> {
    let mut pending: FuturesUnordered<_> = workers
        .into_iter()
        .map(|(company_id, join)| async move { (company_id, join.await) })
        .collect();

    let mut results = Vec::with_capacity(pending.len());
    while let Some((company_id, joined)) = pending.next().await {
        let mut result = match joined {
            Ok(result) => result,
            Err(err) => {
                let message = describe_join_error(err);
                warn!(company_id, "Aggregation worker failed: {}", message);
                PartitionResult::failed(company_id, message)
            }
        };
        result.records_undelivered = undelivered.get(&company_id).copied().unwrap_or(0);
        results.push(result);
    }
    results
}

pub(crate) fn describe_join_error(err: JoinError) -> String {
    if err.is_cancelled() {
        return "task was aborted".to_string();
    }
    match err.try_into_panic() {
        Ok(payload) => match panic_message(payload.as_ref()) {
            Some(message) => format!("task panicked: {message}"),
            None => "task panicked".to_string(),
        },
        Err(err) => err.to_string(),
    }
}
