//! Error handling utilities

use tracing::error;

/// Handle fatal errors and exit with appropriate status code
///
/// - For `PipelineError`: shows the user message, plus the error code
///   description and source chain in verbose mode, and exits with the
///   error's own exit code
/// - For other errors: shows the message (and chain in verbose mode) and
///   exits with 1
pub fn handle_fatal_error(error: anyhow::Error, verbose: u8) -> ! {
    use crate::error::PipelineError;

    error!("Fatal error: {}", error);

    let exit_code = if let Some(pipeline_err) = error.downcast_ref::<PipelineError>() {
        eprintln!("{}", pipeline_err.user_message());

        if verbose >= 1 {
            eprintln!("\nContext Chain:\n{}", pipeline_err.developer_message());
        }

        pipeline_err.exit_code()
    } else {
        eprintln!("Error: {error}");

        if verbose >= 1 {
            eprintln!("\nError chain:");
            for (i, cause) in error.chain().enumerate() {
                eprintln!("  {}: {}", i, cause);
            }
        }

        1
    };

    std::process::exit(exit_code)
}
