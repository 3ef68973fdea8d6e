//! Rejected-records side channel
//!
//! Records that cannot be folded (unparseable date, price overflow) are
//! parked here instead of failing their worker, so one bad record never
//! costs a partition its in-flight totals.

use super::types::{CompanyId, TransactionRecord};
use crate::error::RecordError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Why a record was rejected
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum RejectionReason {
    MalformedDate,
    PriceOverflow,
}

impl From<&RecordError> for RejectionReason {
    fn from(err: &RecordError) -> Self {
        match err {
            RecordError::MalformedDate { .. } => Self::MalformedDate,
            RecordError::PriceOverflow { .. } => Self::PriceOverflow,
        }
    }
}

/// A record that was routed to the side channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedRecord {
    pub company_id: CompanyId,
    pub record: TransactionRecord,
    pub reason: RejectionReason,
    pub error_message: String,
    pub rejected_at: DateTime<Utc>,
}

impl RejectedRecord {
    pub fn new(record: TransactionRecord, error: &RecordError) -> Self {
        Self {
            company_id: record.company_id,
            reason: RejectionReason::from(error),
            error_message: error.to_string(),
            rejected_at: Utc::now(),
            record,
        }
    }
}

/// Snapshot of everything that was rejected during a run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RejectedSummary {
    /// Most recent rejections, oldest first
    pub records: Vec<RejectedRecord>,
    /// Total rejections, including evicted ones
    pub total: u64,
    /// Rejections no longer retained because the buffer was full
    pub evicted: u64,
    pub by_reason: HashMap<RejectionReason, u64>,
}

impl RejectedSummary {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

#[derive(Debug, Default)]
struct RejectedState {
    retained: VecDeque<RejectedRecord>,
    total: u64,
    evicted: u64,
    by_reason: HashMap<RejectionReason, u64>,
}

/// Shared handle to the side channel; cheap to clone into every worker
#[derive(Debug, Clone)]
pub struct RejectedRecords {
    state: Arc<Mutex<RejectedState>>,
    max_retained: usize,
}

impl RejectedRecords {
    pub fn new(max_retained: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(RejectedState::default())),
            max_retained,
        }
    }

    /// Add a rejected record, evicting the oldest one when full
    pub async fn add(&self, rejected: RejectedRecord) {
        warn!(
            company_id = rejected.company_id,
            reason = ?rejected.reason,
            "Rejected record: {}",
            rejected.error_message
        );

        let mut state = self.state.lock().await;
        state.total += 1;
        *state.by_reason.entry(rejected.reason).or_insert(0) += 1;

        if self.max_retained == 0 {
            state.evicted += 1;
            return;
        }
        if state.retained.len() >= self.max_retained {
            state.retained.pop_front();
            state.evicted += 1;
        }
        state.retained.push_back(rejected);
    }

    pub async fn total(&self) -> u64 {
        self.state.lock().await.total
    }

    /// Take everything collected so far, leaving the channel empty
    pub async fn drain(&self) -> RejectedSummary {
        let state = std::mem::take(&mut *self.state.lock().await);
        debug!(
            "Drained {} rejected records ({} evicted)",
            state.total, state.evicted
        );

        RejectedSummary {
            records: state.retained.into_iter().collect(),
            total: state.total,
            evicted: state.evicted,
            by_reason: state.by_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn bad_record(date: &str) -> (TransactionRecord, RecordError) {
        let record = TransactionRecord::new(3, "S1", "B1", 1, date, 1.0, Decimal::ONE);
        let err = RecordError::MalformedDate {
            value: date.to_string(),
            reason: "premature end of input".to_string(),
        };
        (record, err)
    }

    #[tokio::test]
    async fn test_add_and_drain() {
        let channel = RejectedRecords::new(10);
        let (record, err) = bad_record("2024-");
        channel.add(RejectedRecord::new(record, &err)).await;

        assert_eq!(channel.total().await, 1);

        let summary = channel.drain().await;
        assert_eq!(summary.total, 1);
        assert_eq!(summary.records.len(), 1);
        assert_eq!(summary.records[0].company_id, 3);
        assert_eq!(summary.records[0].reason, RejectionReason::MalformedDate);
        assert_eq!(summary.by_reason[&RejectionReason::MalformedDate], 1);

        // Draining leaves the channel empty
        assert!(channel.drain().await.is_empty());
    }

    #[tokio::test]
    async fn test_eviction_keeps_most_recent() {
        let channel = RejectedRecords::new(2);
        for date in ["a", "b", "c"] {
            let (record, err) = bad_record(date);
            channel.add(RejectedRecord::new(record, &err)).await;
        }

        let summary = channel.drain().await;
        assert_eq!(summary.total, 3);
        assert_eq!(summary.evicted, 1);
        let dates: Vec<_> = summary
            .records
            .iter()
            .map(|r| r.record.sales_date.to_string())
            .collect();
        assert_eq!(dates, vec!["b", "c"]);
    }
}
