//! Synthetic sales record source
//!
//! Generates a lazy stream of [`SalesData`] over a fixed catalogue of
//! brands, companies, stores and products. Each record carries an opaque
//! payload that the pipeline never sees: it is dropped when the record is
//! projected into a [`TransactionRecord`].

use crate::config::SourceConfig;
use crate::pipeline::{CompanyId, ProductId, TransactionRecord};
use chrono::{Days, Local, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_LENGTH: usize = 5;

/// A full sales record as produced by the source
#[derive(Debug, Clone, PartialEq)]
pub struct SalesData {
    pub id: u64,
    pub product_id: ProductId,
    pub product_name: Arc<str>,
    pub store_id: Arc<str>,
    pub store_name: Arc<str>,
    pub brand_id: Arc<str>,
    pub brand_name: Arc<str>,
    pub company_id: CompanyId,
    pub company_name: Arc<str>,
    pub sales_date: String,
    pub volume: f64,
    pub price: Decimal,
    pub other_data: Vec<u8>,
}

impl From<SalesData> for TransactionRecord {
    fn from(sale: SalesData) -> Self {
        TransactionRecord {
            product_id: sale.product_id,
            store_id: sale.store_id,
            brand_id: sale.brand_id,
            company_id: sale.company_id,
            sales_date: sale.sales_date.into(),
            volume: sale.volume,
            price: sale.price,
        }
    }
}

/// Code and display name of a catalogue entry
#[derive(Debug, Clone)]
struct Labelled {
    code: Arc<str>,
    name: Arc<str>,
}

pub struct SalesDataGenerator {
    rng: StdRng,
    today: NaiveDate,
    payload_bytes: usize,
    max_days_back: u32,
    brands: Vec<Labelled>,
    stores: Vec<Labelled>,
    companies: Vec<Arc<str>>,
    products: Vec<Arc<str>>,
}

impl SalesDataGenerator {
    pub fn new(settings: &SourceConfig) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::with_rng(settings, rng, Local::now().date_naive())
    }

    /// Generator whose sales dates count back from `today`
    pub fn with_today(settings: &SourceConfig, today: NaiveDate) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::with_rng(settings, rng, today)
    }

    fn with_rng(settings: &SourceConfig, mut rng: StdRng, today: NaiveDate) -> Self {
        let brands = labelled(&mut rng, settings.brands, "Brand Text");
        let stores = labelled(&mut rng, settings.stores, "Store Name");
        let companies = (0..settings.companies)
            .map(|i| Arc::from(format!("Company Name - {i}")))
            .collect();
        let products = (0..settings.products)
            .map(|i| Arc::from(format!("Product description - {i}")))
            .collect();

        debug!(
            "Built catalogue: {} brands, {} stores, {} companies, {} products",
            settings.brands, settings.stores, settings.companies, settings.products
        );

        Self {
            rng,
            today,
            payload_bytes: settings.payload_bytes,
            max_days_back: settings.max_days_back.max(1),
            brands,
            stores,
            companies,
            products,
        }
    }

    pub fn brand_codes(&self) -> impl Iterator<Item = &str> {
        self.brands.iter().map(|b| &*b.code)
    }

    pub fn store_codes(&self) -> impl Iterator<Item = &str> {
        self.stores.iter().map(|s| &*s.code)
    }

    /// Lazily generate `count` records
    pub fn records(self, count: usize) -> SalesRecords {
        SalesRecords {
            generator: self,
            next_id: 1,
            remaining: count,
        }
    }

    fn next_sale(&mut self, id: u64) -> SalesData {
        let brand = &self.brands[self.rng.random_range(0..self.brands.len())];
        let company_id = self.rng.random_range(0..self.companies.len());
        let store = &self.stores[self.rng.random_range(0..self.stores.len())];
        let product_id = self.rng.random_range(0..self.products.len());

        let price = Decimal::from_f64_retain(self.rng.random::<f64>() * 1000.0)
            .unwrap_or_default()
            .round_dp(12);
        let volume = (self.rng.random::<f64>() * 100_000.0).round() / 100.0;
        let days_back = self.rng.random_range(1..=self.max_days_back);
        let sales_date = self
            .today
            .checked_sub_days(Days::new(u64::from(days_back)))
            .unwrap_or(self.today);

        let mut other_data = vec![0u8; self.payload_bytes];
        self.rng.fill(&mut other_data[..]);

        SalesData {
            id,
            product_id: product_id as ProductId,
            product_name: Arc::clone(&self.products[product_id]),
            store_id: Arc::clone(&store.code),
            store_name: Arc::clone(&store.name),
            brand_id: Arc::clone(&brand.code),
            brand_name: Arc::clone(&brand.name),
            company_id: company_id as CompanyId,
            company_name: Arc::clone(&self.companies[company_id]),
            sales_date: sales_date.format("%Y-%m-%d").to_string(),
            volume,
            price,
            other_data,
        }
    }
}

/// Iterator returned by [`SalesDataGenerator::records`]
pub struct SalesRecords {
    generator: SalesDataGenerator,
    next_id: u64,
    remaining: usize,
}

impl Iterator for SalesRecords {
    type Item = SalesData;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let sale = self.generator.next_sale(self.next_id);
        self.next_id += 1;
        Some(sale)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for SalesRecords {}

/// `count` entries with distinct random codes
fn labelled(rng: &mut StdRng, count: usize, prefix: &str) -> Vec<Labelled> {
    let mut seen = HashSet::with_capacity(count);
    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let code = loop {
            let candidate = random_code(rng);
            if seen.insert(candidate.clone()) {
                break candidate;
            }
        };
        entries.push(Labelled {
            code: code.into(),
            name: format!("{prefix} - {i}").into(),
        });
    }
    entries
}

fn random_code(rng: &mut StdRng) -> String {
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(seed: u64) -> SourceConfig {
        SourceConfig {
            seed: Some(seed),
            payload_bytes: 64,
            ..SourceConfig::default()
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn test_seeded_generator_is_reproducible() {
        let a: Vec<_> = SalesDataGenerator::with_today(&settings(7), today())
            .records(50)
            .collect();
        let b: Vec<_> = SalesDataGenerator::with_today(&settings(7), today())
            .records(50)
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_catalogue_codes_are_unique() {
        let generator = SalesDataGenerator::with_today(&settings(1), today());

        let stores: HashSet<_> = generator.store_codes().collect();
        assert_eq!(stores.len(), 100);
        let brands: HashSet<_> = generator.brand_codes().collect();
        assert_eq!(brands.len(), 10);
        for code in stores.iter().chain(brands.iter()) {
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_records_stay_within_configured_ranges() {
        let config = settings(3);
        let earliest = today() - Days::new(59);
        let records = SalesDataGenerator::with_today(&config, today()).records(500);
        assert_eq!(records.len(), 500);

        for (i, sale) in records.enumerate() {
            assert_eq!(sale.id, i as u64 + 1);
            assert!(sale.company_id < config.companies);
            assert!(sale.product_id < config.products);
            assert!((0.0..=1000.0).contains(&sale.volume));
            assert!(sale.price >= Decimal::ZERO && sale.price <= Decimal::from(1000));
            assert_eq!(sale.other_data.len(), 64);

            let date = NaiveDate::parse_from_str(&sale.sales_date, "%Y-%m-%d").unwrap();
            assert!(date >= earliest && date < today());
        }
    }

    #[test]
    fn test_projection_drops_heavy_fields() {
        let sale = SalesDataGenerator::with_today(&settings(5), today())
            .records(1)
            .next()
            .unwrap();
        let record = TransactionRecord::from(sale.clone());

        assert_eq!(record.company_id, sale.company_id);
        assert_eq!(&*record.sales_date, sale.sales_date.as_str());
        assert!(Arc::ptr_eq(&record.store_id, &sale.store_id));
        assert_eq!(record.price, sale.price);
    }
}
