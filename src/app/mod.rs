//! Application module
//!
//! Process-level concerns of the binary:
//! - Verbosity and command-line overrides
//! - Logging setup
//! - Running source, pipeline and sink
//! - Fatal error reporting

pub mod config;
pub mod error_handling;
pub mod logging;
pub mod runtime;

pub use config::{AppConfig, RunOverrides};
pub use error_handling::handle_fatal_error;
pub use logging::init_logging;
pub use runtime::{cancel_on_ctrl_c, initialize_app, run_pipeline, RunSummary};
