//! # sales-summary
//!
//! Streaming partition-and-aggregate pipeline that folds a large stream of
//! sales transactions into weekly summaries per store, brand and product.
//!
//! ## Usage
//!
//! ```bash
//! sales-summary run [--sample-size N] [--seed S] [--format stats|csv|jsonl] [--output FILE]
//! sales-summary week 2024-03-04
//! ```
//!
//! ## Modules
//!
//! - `pipeline` - Ingestion queue, partition router, aggregation workers and collector
//! - `source` - Seedable synthetic sales record generator
//! - `sink` - Consumers of the final summary sequence (statistics, CSV, JSON lines)
//! - `config` - TOML settings for the pipeline, source and sink
//! - `error` - Error types and error code registry
//! - `app` - Logging, runtime wiring and fatal error reporting for the binary
pub mod app;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod sink;
pub mod source;
