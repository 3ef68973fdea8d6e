//! Core data types for the aggregation pipeline
//!
//! Records flow in as [`TransactionRecord`], are grouped by [`AggregationKey`]
//! inside a partition, folded into an [`Accumulator`] and leave the pipeline as
//! [`SummaryRecord`].

use crate::error::RecordError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Partition key
pub type CompanyId = u32;

pub type ProductId = u32;

/// A single sale as seen by the pipeline.
///
/// Store, brand and date text are shared `Arc<str>` handles so routing a
/// record never copies string data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub product_id: ProductId,
    pub store_id: Arc<str>,
    pub brand_id: Arc<str>,
    pub company_id: CompanyId,
    pub sales_date: Arc<str>,
    pub volume: f64,
    pub price: Decimal,
}

impl TransactionRecord {
    pub fn new(
        company_id: CompanyId,
        store_id: impl Into<Arc<str>>,
        brand_id: impl Into<Arc<str>>,
        product_id: ProductId,
        sales_date: impl Into<Arc<str>>,
        volume: f64,
        price: Decimal,
    ) -> Self {
        Self {
            product_id,
            store_id: store_id.into(),
            brand_id: brand_id.into(),
            company_id,
            sales_date: sales_date.into(),
            volume,
            price,
        }
    }
}

/// Year-week bucket encoded as `year * 100 + week`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct YearWeek(i32);

impl YearWeek {
    pub fn new(year: i32, week: u32) -> Self {
        Self(year * 100 + week as i32)
    }

    pub fn year(&self) -> i32 {
        self.0.div_euclid(100)
    }

    pub fn week(&self) -> u32 {
        self.0.rem_euclid(100) as u32
    }

    pub fn value(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for YearWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Grouping key inside one partition.
///
/// A structured tuple, so component boundaries can never blur the way a
/// concatenated string key would (product `1` + week `23` vs product `12` +
/// week `3`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregationKey {
    pub store_id: Arc<str>,
    pub brand_id: Arc<str>,
    pub product_id: ProductId,
    pub year_week: YearWeek,
}

impl AggregationKey {
    pub fn for_record(record: &TransactionRecord, year_week: YearWeek) -> Self {
        Self {
            store_id: Arc::clone(&record.store_id),
            brand_id: Arc::clone(&record.brand_id),
            product_id: record.product_id,
            year_week,
        }
    }
}

/// Running totals for one aggregation key
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulator {
    pub store_id: Arc<str>,
    pub brand_id: Arc<str>,
    pub product_id: ProductId,
    pub company_id: CompanyId,
    pub year_week: YearWeek,
    pub total_volume: f64,
    pub total_price: Decimal,
    pub records: u64,
}

impl Accumulator {
    /// Start a new accumulator from the first record of its key
    pub fn seed(record: &TransactionRecord, year_week: YearWeek) -> Self {
        Self {
            store_id: Arc::clone(&record.store_id),
            brand_id: Arc::clone(&record.brand_id),
            product_id: record.product_id,
            company_id: record.company_id,
            year_week,
            total_volume: record.volume,
            total_price: record.price,
            records: 1,
        }
    }

    /// Add a record's volume and price.
    ///
    /// The accumulator is left untouched when the price total would overflow.
    pub fn add(&mut self, record: &TransactionRecord) -> Result<(), RecordError> {
        let total_price =
            self.total_price
                .checked_add(record.price)
                .ok_or(RecordError::PriceOverflow {
                    price: record.price,
                })?;

        self.total_price = total_price;
        self.total_volume += record.volume;
        self.records += 1;
        Ok(())
    }

    pub fn to_summary(&self) -> SummaryRecord {
        SummaryRecord {
            product_id: self.product_id,
            company_id: self.company_id,
            store_id: Arc::clone(&self.store_id),
            brand_id: Arc::clone(&self.brand_id),
            week_number: self.year_week.value(),
            total_volume: self.total_volume,
            total_price: self.total_price,
        }
    }

    pub fn into_summary(self) -> SummaryRecord {
        SummaryRecord {
            product_id: self.product_id,
            company_id: self.company_id,
            store_id: self.store_id,
            brand_id: self.brand_id,
            week_number: self.year_week.value(),
            total_volume: self.total_volume,
            total_price: self.total_price,
        }
    }
}

/// One output row per distinct aggregation key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub product_id: ProductId,
    pub company_id: CompanyId,
    pub store_id: Arc<str>,
    pub brand_id: Arc<str>,
    pub week_number: i32,
    pub total_volume: f64,
    pub total_price: Decimal,
}
