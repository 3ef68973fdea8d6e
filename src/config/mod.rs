//! Run configuration
//!
//! Settings are read from an optional TOML file; every section and field
//! has a default, so an empty file is a valid configuration. Command-line
//! flags are applied on top by the binary.

use crate::error::{ErrorCode, PipelineError, Result};
use crate::pipeline::{QueueCapacity, YearWeekPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Records generated when no sample size is configured
pub const DEFAULT_SAMPLE_SIZE: usize = 10_000_000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub pipeline: PipelineConfig,
    pub source: SourceConfig,
    pub sink: SinkConfig,
}

/// Queue sizing and bucketing rules of the aggregation core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Ingestion queue bound; unbounded when absent
    pub ingestion_capacity: Option<usize>,
    /// Per-partition queue bound; unbounded when absent
    pub partition_capacity: Option<usize>,
    pub year_week_policy: YearWeekPolicy,
    /// Rejected records kept for reporting; older ones are only counted
    pub max_rejected_retained: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ingestion_capacity: None,
            partition_capacity: None,
            year_week_policy: YearWeekPolicy::default(),
            max_rejected_retained: 1000,
        }
    }
}

impl PipelineConfig {
    pub fn ingestion_queue(&self) -> QueueCapacity {
        QueueCapacity::from_setting(self.ingestion_capacity)
    }

    pub fn partition_queue(&self) -> QueueCapacity {
        QueueCapacity::from_setting(self.partition_capacity)
    }
}

/// Synthetic record generator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub sample_size: usize,
    /// Fixed seed for reproducible runs; random when absent
    pub seed: Option<u64>,
    /// Size of the opaque payload carried by each generated record
    pub payload_bytes: usize,
    pub brands: usize,
    pub companies: u32,
    pub stores: usize,
    pub products: u32,
    /// Sales dates fall between 1 and this many days before today
    pub max_days_back: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            seed: None,
            payload_bytes: 10 * 1024,
            brands: 10,
            companies: 5,
            stores: 100,
            products: 50,
            max_days_back: 59,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SinkFormat {
    /// Print count and totals only
    #[default]
    Stats,
    /// Write summaries as CSV
    Csv,
    /// Write summaries as JSON lines
    Jsonl,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub format: SinkFormat,
    /// Destination file; required for `csv` and `jsonl`
    pub output: Option<PathBuf>,
}

impl Settings {
    /// Load settings from a TOML file
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::config_with_code(
                ErrorCode::CONFIG_NOT_FOUND,
                format!("Configuration file not found: {}", path.display()),
            ));
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            PipelineError::config(format!("Failed to read {}", path.display())).with_source(e)
        })?;
        let settings = Self::from_toml_str(&content)
            .map_err(|e| e.with_context(format!("while loading {}", path.display())))?;

        debug!("Loaded configuration from {}", path.display());
        Ok(settings)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| -> Result<()> {
            Err(PipelineError::config_with_code(
                ErrorCode::CONFIG_INVALID_VALUE,
                message,
            ))
        };

        if self.pipeline.ingestion_capacity == Some(0) {
            return invalid("pipeline.ingestion_capacity must be greater than 0".to_string());
        }
        if self.pipeline.partition_capacity == Some(0) {
            return invalid("pipeline.partition_capacity must be greater than 0".to_string());
        }

        let counts = [
            ("source.brands", self.source.brands),
            ("source.companies", self.source.companies as usize),
            ("source.stores", self.source.stores),
            ("source.products", self.source.products as usize),
            ("source.max_days_back", self.source.max_days_back as usize),
        ];
        for (name, value) in counts {
            if value == 0 {
                return invalid(format!("{name} must be greater than 0"));
            }
        }

        if self.sink.format != SinkFormat::Stats && self.sink.output.is_none() {
            return invalid(format!(
                "sink.output is required for the {:?} format",
                self.sink.format
            ));
        }

        Ok(())
    }
}
