//! Year-week bucketing
//!
//! Weeks start on Monday and week 1 is the first *full* week of the year:
//! days before the year's first Monday belong to the last week of the
//! previous year.

use super::types::YearWeek;
use crate::error::RecordError;
use chrono::{DateTime, Datelike, Days, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Which date decides the January year correction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum YearWeekPolicy {
    /// Legacy rule: subtract a year when the *processing* date is in January
    /// and the record's week number is above 4.
    #[default]
    ProcessingDate,
    /// Subtract a year when the *record's own* date is in January and its
    /// week number is above 4.
    RecordDate,
}

/// Derives the year-week bucket of a record's sales date
#[derive(Debug, Clone)]
pub struct WeekBucketer {
    policy: YearWeekPolicy,
    processing_date: NaiveDate,
}

impl WeekBucketer {
    pub fn new(policy: YearWeekPolicy, processing_date: NaiveDate) -> Self {
        Self {
            policy,
            processing_date,
        }
    }

    /// Bucketer whose processing date is today's local date
    pub fn today(policy: YearWeekPolicy) -> Self {
        Self::new(policy, Local::now().date_naive())
    }

    pub fn policy(&self) -> YearWeekPolicy {
        self.policy
    }

    pub fn processing_date(&self) -> NaiveDate {
        self.processing_date
    }

    pub fn bucket(&self, sales_date: &str) -> Result<YearWeek, RecordError> {
        let date = parse_sales_date(sales_date)?;
        Ok(self.bucket_date(date))
    }

    pub fn bucket_date(&self, date: NaiveDate) -> YearWeek {
        let week = week_of_year(date);
        let reference_month = match self.policy {
            YearWeekPolicy::ProcessingDate => self.processing_date.month(),
            YearWeekPolicy::RecordDate => date.month(),
        };
        let year = if reference_month == 1 && week > 4 {
            date.year() - 1
        } else {
            date.year()
        };
        YearWeek::new(year, week)
    }
}

/// Parse a sales date, accepting `yyyy-MM-dd`, `yyyy-MM-ddTHH:MM:SS` and RFC 3339
pub fn parse_sales_date(text: &str) -> Result<NaiveDate, RecordError> {
    let trimmed = text.trim();
    match NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        Ok(date) => Ok(date),
        Err(err) => NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S")
            .map(|dt| dt.date())
            .or_else(|_| DateTime::parse_from_rfc3339(trimmed).map(|dt| dt.date_naive()))
            .map_err(|_| RecordError::MalformedDate {
                value: text.to_string(),
                reason: err.to_string(),
            }),
    }
}

/// Week number under the Monday-first, first-full-week rule (1..=53)
pub fn week_of_year(date: NaiveDate) -> u32 {
    let day_of_year = date.ordinal0() as i64;
    let weekday = date.weekday().num_days_from_monday() as i64;
    let jan1_weekday = (weekday - day_of_year).rem_euclid(7);
    let first_monday = (7 - jan1_weekday) % 7;

    let day = day_of_year - first_monday;
    if day >= 0 {
        return (day / 7 + 1) as u32;
    }

    // Before the first Monday: same week as the previous year's last day
    match date.checked_sub_days(Days::new(day_of_year as u64 + 1)) {
        Some(previous_year_end) => week_of_year(previous_year_end),
        None => 1,
    }
}
