//! End-to-end behaviour of the aggregation pipeline
//!
//! Totals, cardinality, per-partition ordering, rejection handling and
//! cancellation, exercised through `SalesPipeline::summarize`.

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use sales_summary::config::PipelineConfig;
use sales_summary::pipeline::{
    RejectionReason, SalesPipeline, SummaryRecord, TransactionRecord, WeekBucketer, YearWeekPolicy,
};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

type OutputKey = (u32, String, String, u32, i32);

fn processing_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

fn pipeline(config: PipelineConfig) -> SalesPipeline {
    SalesPipeline::new(config).with_processing_date(processing_date())
}

fn record_date_config() -> PipelineConfig {
    PipelineConfig {
        year_week_policy: YearWeekPolicy::RecordDate,
        ..PipelineConfig::default()
    }
}

fn sale(
    company_id: u32,
    store: &str,
    brand: &str,
    product_id: u32,
    date: &str,
    volume: f64,
    price: Decimal,
) -> TransactionRecord {
    TransactionRecord::new(company_id, store, brand, product_id, date, volume, price)
}

fn key_of(summary: &SummaryRecord) -> OutputKey {
    (
        summary.company_id,
        summary.store_id.to_string(),
        summary.brand_id.to_string(),
        summary.product_id,
        summary.week_number,
    )
}

fn by_key(summaries: impl IntoIterator<Item = SummaryRecord>) -> HashMap<OutputKey, SummaryRecord> {
    let mut map = HashMap::new();
    for summary in summaries {
        let previous = map.insert(key_of(&summary), summary);
        assert!(previous.is_none(), "duplicate summary for one key");
    }
    map
}

#[tokio::test]
async fn test_empty_input_yields_empty_output() {
    let output = pipeline(PipelineConfig::default())
        .summarize(Vec::<TransactionRecord>::new())
        .await
        .unwrap();

    assert!(output.is_complete());
    assert_eq!(output.summary_count(), 0);
    assert_eq!(output.into_summaries().count(), 0);
}

#[tokio::test]
async fn test_single_key_totals() {
    let records = vec![
        sale(1, "S1", "B1", 7, "2024-03-04", 10.0, Decimal::new(500, 2)),
        sale(1, "S1", "B1", 7, "2024-03-04", 20.0, Decimal::new(250, 2)),
    ];

    let output = pipeline(PipelineConfig::default())
        .summarize(records)
        .await
        .unwrap();
    let summaries: Vec<_> = output.into_summaries().collect();

    assert_eq!(summaries.len(), 1);
    let summary = &summaries[0];
    assert_eq!(summary.company_id, 1);
    assert_eq!(summary.product_id, 7);
    assert_eq!(summary.week_number, 202410);
    assert_eq!(summary.total_volume, 30.0);
    assert_eq!(summary.total_price, Decimal::new(750, 2));
}

#[tokio::test]
async fn test_two_companies_are_isolated() {
    let records = vec![
        sale(1, "S1", "B1", 7, "2024-03-04", 10.0, Decimal::new(100, 2)),
        sale(2, "S2", "B2", 8, "2024-03-04", 5.0, Decimal::new(300, 2)),
        sale(1, "S1", "B1", 7, "2024-03-05", 1.0, Decimal::new(100, 2)),
        sale(2, "S2", "B2", 8, "2024-03-06", 5.0, Decimal::new(300, 2)),
    ];

    let output = pipeline(PipelineConfig::default())
        .summarize(records)
        .await
        .unwrap();
    assert_eq!(output.report().partitions, 2);

    let summaries = by_key(output.into_summaries());
    assert_eq!(summaries.len(), 2);

    let first = &summaries[&(1, "S1".into(), "B1".into(), 7, 202410)];
    assert_eq!(first.total_volume, 11.0);
    assert_eq!(first.total_price, Decimal::new(200, 2));

    let second = &summaries[&(2, "S2".into(), "B2".into(), 8, 202410)];
    assert_eq!(second.total_volume, 10.0);
    assert_eq!(second.total_price, Decimal::new(600, 2));
}

#[tokio::test]
async fn test_same_tuple_in_two_companies_gives_two_rows() {
    let records = vec![
        sale(1, "S1", "B1", 7, "2024-03-04", 1.0, Decimal::ONE),
        sale(2, "S1", "B1", 7, "2024-03-04", 2.0, Decimal::ONE),
    ];

    let output = pipeline(PipelineConfig::default())
        .summarize(records)
        .await
        .unwrap();

    let mut volumes: Vec<_> = output.summaries().map(|s| s.total_volume).collect();
    volumes.sort_by(f64::total_cmp);
    assert_eq!(volumes, vec![1.0, 2.0]);
}

#[tokio::test]
async fn test_fold_order_is_preserved_per_partition() {
    // Floating point addition is not associative: only source order gives 1.0
    let ordered = [1e16, 1.0, -1e16, 1.0];
    let expected = ordered.iter().fold(0.0, |acc, v| acc + v);
    assert_eq!(expected, 1.0);

    for capacity in [None, Some(1), Some(3)] {
        let mut records = Vec::new();
        for (i, volume) in ordered.iter().enumerate() {
            for noise in 0..25u32 {
                records.push(sale(
                    2 + noise % 6,
                    "S9",
                    "B9",
                    noise,
                    "2024-03-04",
                    i as f64,
                    Decimal::ONE,
                ));
            }
            records.push(sale(1, "S1", "B1", 7, "2024-03-04", *volume, Decimal::ONE));
        }

        let config = PipelineConfig {
            partition_capacity: capacity,
            ..PipelineConfig::default()
        };
        let output = pipeline(config).summarize(records).await.unwrap();
        let summaries = by_key(output.into_summaries());

        let target = &summaries[&(1, "S1".into(), "B1".into(), 7, 202410)];
        assert_eq!(target.total_volume, expected, "capacity {capacity:?}");
    }
}

#[tokio::test]
async fn test_summaries_read_is_idempotent() {
    let records: Vec<_> = (0..200u32)
        .map(|i| sale(i % 4, "S1", "B1", i % 9, "2024-03-04", 1.0, Decimal::ONE))
        .collect();

    let output = pipeline(PipelineConfig::default())
        .summarize(records)
        .await
        .unwrap();

    let first = by_key(output.summaries());
    let second = by_key(output.summaries());
    assert_eq!(first, second);
    assert_eq!(first.len(), output.summary_count());

    let consumed = by_key(output.into_summaries());
    assert_eq!(first, consumed);
}

#[tokio::test]
async fn test_malformed_date_does_not_lose_partition() {
    let records = vec![
        sale(1, "S1", "B1", 7, "2024-03-04", 10.0, Decimal::ONE),
        sale(1, "S1", "B1", 7, "31/12/2024", 99.0, Decimal::ONE),
        sale(1, "S1", "B1", 7, "2024-03-05", 5.0, Decimal::ONE),
    ];

    let output = pipeline(PipelineConfig::default())
        .summarize(records)
        .await
        .unwrap();

    assert!(output.is_complete());
    let rejected = output.rejected();
    assert_eq!(rejected.total, 1);
    assert_eq!(rejected.records[0].reason, RejectionReason::MalformedDate);
    assert_eq!(&*rejected.records[0].record.sales_date, "31/12/2024");

    let summaries: Vec<_> = output.summaries().collect();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].total_volume, 15.0);
}

#[tokio::test]
async fn test_price_overflow_is_rejected() {
    let records = vec![
        sale(1, "S1", "B1", 7, "2024-03-04", 1.0, Decimal::MAX),
        sale(1, "S1", "B1", 7, "2024-03-04", 1.0, Decimal::ONE),
    ];

    let output = pipeline(PipelineConfig::default())
        .summarize(records)
        .await
        .unwrap();

    assert_eq!(
        output.rejected().by_reason[&RejectionReason::PriceOverflow],
        1
    );
    let summary = output.summaries().next().unwrap();
    assert_eq!(summary.total_price, Decimal::MAX);
    assert_eq!(summary.total_volume, 1.0);
}

#[tokio::test]
async fn test_cancellation_stops_unbounded_source() {
    let token = CancellationToken::new();
    let trigger = token.clone();
    let endless = (0u64..).map(move |i| {
        if i == 100 {
            trigger.cancel();
        }
        sale((i % 3) as u32, "S1", "B1", 1, "2024-03-04", 1.0, Decimal::ONE)
    });

    let output = pipeline(PipelineConfig::default())
        .with_cancellation(token)
        .summarize(endless)
        .await
        .unwrap();

    let report = output.report();
    assert!(report.cancelled);
    assert!(!output.is_complete());
    assert_eq!(report.records_ingested, 100);
    assert!(report.records_folded <= 100);
}

#[tokio::test]
async fn test_bounded_queues_match_unbounded() {
    let records: Vec<_> = (0..2_000u32)
        .map(|i| {
            sale(
                i % 7,
                ["S1", "S2", "S3"][(i % 3) as usize],
                "B1",
                i % 11,
                ["2024-03-04", "2024-03-12", "2024-05-20"][(i % 5 % 3) as usize],
                f64::from(i % 13),
                Decimal::new(i64::from(i), 2),
            )
        })
        .collect();

    let unbounded = pipeline(PipelineConfig::default())
        .summarize(records.clone())
        .await
        .unwrap();
    let bounded = pipeline(PipelineConfig {
        ingestion_capacity: Some(8),
        partition_capacity: Some(2),
        ..PipelineConfig::default()
    })
    .summarize(records)
    .await
    .unwrap();

    assert!(bounded.is_complete());
    assert_eq!(by_key(unbounded.summaries()), by_key(bounded.summaries()));
}

fn arb_record() -> impl Strategy<Value = TransactionRecord> {
    (
        0u32..4,
        prop::sample::select(vec!["S1", "S2", "S3"]),
        prop::sample::select(vec!["B1", "B2"]),
        0u32..5,
        prop::sample::select(vec![
            "2023-01-01",
            "2023-12-31",
            "2024-01-01",
            "2024-03-04",
            "2024-03-10",
            "2024-12-30",
        ]),
        0u32..1000,
        0i64..100_000,
    )
        .prop_map(|(company, store, brand, product, date, volume, cents)| {
            sale(
                company,
                store,
                brand,
                product,
                date,
                f64::from(volume),
                Decimal::new(cents, 2),
            )
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every key's totals equal the sums over its records, and there is
    /// exactly one summary per distinct key
    #[test]
    fn prop_totals_and_cardinality(records in prop::collection::vec(arb_record(), 0..300)) {
        let bucketer = WeekBucketer::new(YearWeekPolicy::RecordDate, processing_date());
        let mut expected: HashMap<OutputKey, (f64, Decimal)> = HashMap::new();
        for record in &records {
            let week = bucketer.bucket(&record.sales_date).unwrap().value();
            let key = (
                record.company_id,
                record.store_id.to_string(),
                record.brand_id.to_string(),
                record.product_id,
                week,
            );
            let entry = expected.entry(key).or_insert((0.0, Decimal::ZERO));
            entry.0 += record.volume;
            entry.1 += record.price;
        }

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let output = runtime
            .block_on(pipeline(record_date_config()).summarize(records.clone()))
            .unwrap();

        prop_assert!(output.is_complete());
        prop_assert_eq!(output.report().records_folded as usize, records.len());

        let actual = by_key(output.into_summaries());
        prop_assert_eq!(actual.len(), expected.len());
        for (key, (volume, price)) in &expected {
            let summary = actual.get(key);
            prop_assert!(summary.is_some(), "missing summary for {:?}", key);
            let summary = summary.unwrap();
            prop_assert_eq!(summary.total_volume, *volume);
            prop_assert_eq!(summary.total_price, *price);
        }
    }
}
