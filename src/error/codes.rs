/// Error code registry for the sales summary pipeline
///
/// Error codes are organized by category:
/// - 1000-1999: Configuration errors
/// - 2000-2999: Record errors (recoverable, routed to the rejected channel)
/// - 3000-3999: Sink errors
/// - 4000-4999: Pipeline errors
pub struct ErrorCode;

impl ErrorCode {
    // Configuration errors (1000-1999)
    pub const CONFIG_GENERIC: u16 = 1000;
    pub const CONFIG_NOT_FOUND: u16 = 1001;
    pub const CONFIG_PARSE_ERROR: u16 = 1002;
    pub const CONFIG_INVALID_VALUE: u16 = 1003;

    // Record errors (2000-2999)
    pub const RECORD_MALFORMED_DATE: u16 = 2001;
    pub const RECORD_PRICE_OVERFLOW: u16 = 2002;

    // Sink errors (3000-3999)
    pub const SINK_IO_ERROR: u16 = 3001;
    pub const SINK_SERIALIZATION_ERROR: u16 = 3002;
    pub const SINK_TOTAL_OVERFLOW: u16 = 3003;

    // Pipeline errors (4000-4999)
    pub const PIPELINE_ROUTER_FAILED: u16 = 4002;
    pub const PIPELINE_PARTITION_FAILED: u16 = 4003;
    pub const PIPELINE_CANCELLED: u16 = 4004;
}

/// Get a human-readable description for an error code
pub fn describe_error_code(code: u16) -> &'static str {
    match code {
        1000 => "Generic configuration error",
        1001 => "Configuration file not found",
        1002 => "Failed to parse configuration",
        1003 => "Invalid value in configuration",

        2001 => "Sales date could not be parsed",
        2002 => "Price total exceeded the decimal range",

        3001 => "Sink I/O error",
        3002 => "Sink serialization error",
        3003 => "Summary totals exceeded the decimal range",

        4002 => "Partition router task failed",
        4003 => "One or more partitions failed",
        4004 => "Pipeline was cancelled",

        _ => "Unknown error code",
    }
}
