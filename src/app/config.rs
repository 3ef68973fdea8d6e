//! Application configuration
//!
//! Process-level settings (verbosity) and the command-line overrides applied
//! on top of the settings file.

use crate::config::{Settings, SinkFormat};
use crate::pipeline::YearWeekPolicy;
use clap::Args;
use std::path::PathBuf;

/// Application configuration structure
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Verbosity level for logging
    pub verbose: u8,
}

impl AppConfig {
    pub fn new(verbose: u8) -> Self {
        Self { verbose }
    }

    /// Get the log level string based on verbosity
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Flags of the `run` command
#[derive(Debug, Clone, Default, Args)]
pub struct RunOverrides {
    /// Path to a TOML settings file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Number of records to generate (default: 10,000,000)
    #[arg(short = 'n', long)]
    pub sample_size: Option<usize>,

    /// Seed for reproducible record generation
    #[arg(long)]
    pub seed: Option<u64>,

    /// Bound each partition queue; the router waits while a queue is full
    #[arg(long)]
    pub partition_capacity: Option<usize>,

    /// Apply the January year correction to the record's own date
    #[arg(long)]
    pub record_date_weeks: bool,

    /// Output format
    #[arg(short = 'f', long, value_enum)]
    pub format: Option<SinkFormat>,

    /// Output file for csv and jsonl formats
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,
}

impl RunOverrides {
    /// Apply every flag that was given on top of `settings`
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(sample_size) = self.sample_size {
            settings.source.sample_size = sample_size;
        }
        if let Some(seed) = self.seed {
            settings.source.seed = Some(seed);
        }
        if let Some(capacity) = self.partition_capacity {
            settings.pipeline.partition_capacity = Some(capacity);
        }
        if self.record_date_weeks {
            settings.pipeline.year_week_policy = YearWeekPolicy::RecordDate;
        }
        if let Some(format) = self.format {
            settings.sink.format = format;
        }
        if let Some(output) = &self.output {
            settings.sink.output = Some(output.clone());
        }
    }
}
