use rust_decimal::Decimal;
use std::fmt::Display;
use std::path::PathBuf;
use thiserror::Error;

pub mod codes;

pub use codes::{describe_error_code, ErrorCode};

/// Errors raised while folding a single record.
///
/// These never abort a worker; the record is handed to the rejected
/// channel and aggregation continues.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("malformed sales date '{value}': {reason}")]
    MalformedDate { value: String, reason: String },

    #[error("price total overflowed while adding {price}")]
    PriceOverflow { price: Decimal },
}

impl RecordError {
    pub fn code(&self) -> u16 {
        match self {
            Self::MalformedDate { .. } => ErrorCode::RECORD_MALFORMED_DATE,
            Self::PriceOverflow { .. } => ErrorCode::RECORD_PRICE_OVERFLOW,
        }
    }
}

/// Pipeline-level error type
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("[E{code:04}] Configuration error: {message}")]
    Config {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Pipeline error: {message}")]
    Pipeline {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Pipeline cancelled after ingesting {records_ingested} records")]
    Cancelled { code: u16, records_ingested: u64 },

    #[error("[E{code:04}] Sink error: {message}")]
    Sink {
        code: u16,
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl PipelineError {
    /// Create a configuration error with default code
    pub fn config(message: impl Into<String>) -> Self {
        Self::config_with_code(ErrorCode::CONFIG_GENERIC, message)
    }

    /// Create a configuration error with specific code
    pub fn config_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Config {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create a pipeline error with specific code
    pub fn pipeline(code: u16, message: impl Into<String>) -> Self {
        Self::Pipeline {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create a cancellation error
    pub fn cancelled(records_ingested: u64) -> Self {
        Self::Cancelled {
            code: ErrorCode::PIPELINE_CANCELLED,
            records_ingested,
        }
    }

    /// Create a sink error with specific code and path
    pub fn sink(code: u16, message: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self::Sink {
            code,
            message: message.into(),
            path,
            source: None,
        }
    }

    /// Attach a source error
    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        match &mut self {
            Self::Config { source: s, .. }
            | Self::Pipeline { source: s, .. }
            | Self::Sink { source: s, .. } => *s = Some(source.into()),
            Self::Cancelled { .. } => {}
        }
        self
    }

    /// Prefix the message with additional context
    pub fn with_context(mut self, context: impl Display) -> Self {
        match &mut self {
            Self::Config { message, .. }
            | Self::Pipeline { message, .. }
            | Self::Sink { message, .. } => *message = format!("{context}: {message}"),
            Self::Cancelled { .. } => {}
        }
        self
    }

    /// Get the error code
    pub fn code(&self) -> u16 {
        match self {
            Self::Config { code, .. }
            | Self::Pipeline { code, .. }
            | Self::Cancelled { code, .. }
            | Self::Sink { code, .. } => *code,
        }
    }

    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => 2,
            Self::Sink { .. } => 4,
            Self::Pipeline { .. } => 5,
            Self::Cancelled { .. } => 130,
        }
    }

    /// Message shown to the user on the console
    pub fn user_message(&self) -> String {
        match self {
            Self::Sink {
                path: Some(path), ..
            } => format!("{} ({})", self, path.display()),
            _ => self.to_string(),
        }
    }

    /// Full message including the source chain
    pub fn developer_message(&self) -> String {
        let mut out = format!("{} - {}", self, describe_error_code(self.code()));
        let mut current = std::error::Error::source(self);
        while let Some(cause) = current {
            out.push_str(&format!("\n  caused by: {cause}"));
            current = std::error::Error::source(cause);
        }
        out
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::sink(ErrorCode::SINK_IO_ERROR, "I/O failure", None).with_source(err)
    }
}

impl From<csv::Error> for PipelineError {
    fn from(err: csv::Error) -> Self {
        PipelineError::sink(
            ErrorCode::SINK_SERIALIZATION_ERROR,
            "CSV serialization failed",
            None,
        )
        .with_source(err)
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::sink(
            ErrorCode::SINK_SERIALIZATION_ERROR,
            "JSON serialization failed",
            None,
        )
        .with_source(err)
    }
}

impl From<toml::de::Error> for PipelineError {
    fn from(err: toml::de::Error) -> Self {
        PipelineError::config_with_code(ErrorCode::CONFIG_PARSE_ERROR, "invalid TOML")
            .with_source(err)
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_and_exit_codes() {
        let err = PipelineError::config("bad capacity");
        assert_eq!(err.code(), ErrorCode::CONFIG_GENERIC);
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("[E1000]"));

        let cancelled = PipelineError::cancelled(42);
        assert_eq!(cancelled.code(), ErrorCode::PIPELINE_CANCELLED);
        assert_eq!(cancelled.exit_code(), 130);
        assert!(cancelled.to_string().contains("42 records"));
    }

    #[test]
    fn test_developer_message_includes_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only volume");
        let err = PipelineError::from(io).with_context("writing summaries");

        let message = err.developer_message();
        assert!(message.contains("writing summaries: I/O failure"));
        assert!(message.contains("caused by: read-only volume"));
    }

    #[test]
    fn test_record_error_codes() {
        let err = RecordError::MalformedDate {
            value: "2024-13-45".to_string(),
            reason: "input is out of range".to_string(),
        };
        assert_eq!(err.code(), ErrorCode::RECORD_MALFORMED_DATE);
        assert!(err.to_string().contains("2024-13-45"));
    }
}
