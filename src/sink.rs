//! Summary sinks
//!
//! A sink consumes the pipeline's summary sequence exactly once. File sinks
//! write to a temporary file next to the destination and only move it into
//! place once every record has been written, so a failed write never leaves
//! a truncated output behind.

use crate::config::{SinkConfig, SinkFormat};
use crate::error::{ErrorCode, PipelineError, Result};
use crate::pipeline::SummaryRecord;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Totals observed while writing
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SinkReport {
    pub records: u64,
    pub total_volume: f64,
    pub total_price: Decimal,
    pub path: Option<PathBuf>,
}

impl SinkReport {
    /// Add one summary to the running totals.
    ///
    /// The report is left untouched when the price total would overflow.
    fn observe(&mut self, summary: &SummaryRecord) -> Result<()> {
        let total_price = self
            .total_price
            .checked_add(summary.total_price)
            .ok_or_else(|| {
                PipelineError::sink(
                    ErrorCode::SINK_TOTAL_OVERFLOW,
                    format!(
                        "total price overflowed after {} summaries (adding {})",
                        self.records, summary.total_price
                    ),
                    None,
                )
            })?;

        self.records += 1;
        self.total_volume += summary.total_volume;
        self.total_price = total_price;
        Ok(())
    }
}

/// Destination of the final summaries
pub trait SummarySink {
    fn write(&mut self, summaries: &mut dyn Iterator<Item = SummaryRecord>) -> Result<SinkReport>;
}

/// Build the sink described by `config`
pub fn from_config(config: &SinkConfig) -> Result<Box<dyn SummarySink + Send>> {
    let output = || {
        config.output.clone().ok_or_else(|| {
            PipelineError::config_with_code(
                ErrorCode::CONFIG_INVALID_VALUE,
                format!("an output path is required for the {:?} sink", config.format),
            )
        })
    };

    let sink: Box<dyn SummarySink + Send> = match config.format {
        SinkFormat::Stats => Box::new(StatisticsSink),
        SinkFormat::Csv => Box::new(CsvSink::new(output()?)),
        SinkFormat::Jsonl => Box::new(JsonLinesSink::new(output()?)),
    };
    Ok(sink)
}

/// Only counts records and sums their totals
#[derive(Debug, Default)]
pub struct StatisticsSink;

impl SummarySink for StatisticsSink {
    fn write(&mut self, summaries: &mut dyn Iterator<Item = SummaryRecord>) -> Result<SinkReport> {
        let mut report = SinkReport::default();
        for summary in summaries {
            report.observe(&summary)?;
        }
        debug!("Counted {} summaries", report.records);
        Ok(report)
    }
}

#[derive(Debug)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SummarySink for CsvSink {
    fn write(&mut self, summaries: &mut dyn Iterator<Item = SummaryRecord>) -> Result<SinkReport> {
        let mut temp = staging_file(&self.path)?;
        let mut report = SinkReport::default();

        {
            let mut writer = csv::Writer::from_writer(temp.as_file_mut());
            for summary in summaries {
                report.observe(&summary)?;
                writer.serialize(&summary)?;
            }
            writer.flush().map_err(|e| io_error(&self.path, e))?;
        }

        commit(temp, &self.path)?;
        info!("Wrote {} summaries to {}", report.records, self.path.display());
        report.path = Some(self.path.clone());
        Ok(report)
    }
}

/// One JSON object per line
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SummarySink for JsonLinesSink {
    fn write(&mut self, summaries: &mut dyn Iterator<Item = SummaryRecord>) -> Result<SinkReport> {
        let mut temp = staging_file(&self.path)?;
        let mut report = SinkReport::default();

        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            for summary in summaries {
                report.observe(&summary)?;
                serde_json::to_writer(&mut writer, &summary)?;
                writer
                    .write_all(b"\n")
                    .map_err(|e| io_error(&self.path, e))?;
            }
            writer.flush().map_err(|e| io_error(&self.path, e))?;
        }

        commit(temp, &self.path)?;
        info!("Wrote {} summaries to {}", report.records, self.path.display());
        report.path = Some(self.path.clone());
        Ok(report)
    }
}

/// Temp file in the destination's directory, so the final rename stays on
/// one filesystem
fn staging_file(destination: &Path) -> Result<NamedTempFile> {
    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| io_error(destination, e))?;
    NamedTempFile::new_in(dir).map_err(|e| io_error(destination, e))
}

fn commit(temp: NamedTempFile, destination: &Path) -> Result<()> {
    temp.as_file()
        .sync_all()
        .map_err(|e| io_error(destination, e))?;
    temp.persist(destination).map_err(|e| {
        PipelineError::sink(
            ErrorCode::SINK_IO_ERROR,
            "Failed to move summaries into place",
            Some(destination.to_path_buf()),
        )
        .with_source(e.error)
    })?;
    Ok(())
}

fn io_error(path: &Path, err: std::io::Error) -> PipelineError {
    PipelineError::sink(
        ErrorCode::SINK_IO_ERROR,
        "Failed to write summaries",
        Some(path.to_path_buf()),
    )
    .with_source(err)
}
