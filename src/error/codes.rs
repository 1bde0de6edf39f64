/// Error code registry for shardscript
///
/// Error codes are organized by category:
/// - 1000-1999: Configuration errors
/// - 2000-2999: Sandbox setup errors
/// - 4000-4999: Query execution errors
#[allow(dead_code)]
pub struct ErrorCode;

impl ErrorCode {
    // Configuration errors (1000-1999)
    pub const CONFIG_GENERIC: u16 = 1000;
    pub const CONFIG_NOT_FOUND: u16 = 1001;
    pub const CONFIG_PARSE_ERROR: u16 = 1002;
    pub const CONFIG_INVALID_VALUE: u16 = 1003;

    // Sandbox errors (2000-2999)
    pub const SANDBOX_GENERIC: u16 = 2000;
    pub const SANDBOX_ENGINE_INIT: u16 = 2001;

    // Query errors (4000-4999)
    pub const QUERY_GENERIC: u16 = 4000;
    pub const QUERY_NO_PARTITIONS: u16 = 4001;
    pub const QUERY_INVALID_SCRIPT: u16 = 4002;
    pub const QUERY_PARTITIONS_FAILED: u16 = 4003;
    pub const QUERY_REDUCE_FAILED: u16 = 4004;
    pub const QUERY_TIMEOUT: u16 = 4005;
    pub const QUERY_CANCELLED: u16 = 4006;
}

/// Get a human-readable description for an error code
pub fn describe_error_code(code: u16) -> &'static str {
    match code {
        ErrorCode::CONFIG_GENERIC => "General configuration error",
        ErrorCode::CONFIG_NOT_FOUND => "Configuration file not found",
        ErrorCode::CONFIG_PARSE_ERROR => "Configuration file could not be parsed",
        ErrorCode::CONFIG_INVALID_VALUE => "Configuration value out of range",

        ErrorCode::SANDBOX_GENERIC => "General sandbox error",
        ErrorCode::SANDBOX_ENGINE_INIT => "Script engine could not be initialized",

        ErrorCode::QUERY_GENERIC => "General query error",
        ErrorCode::QUERY_NO_PARTITIONS => "Query was submitted without partitions",
        ErrorCode::QUERY_INVALID_SCRIPT => "Map or reduce script was rejected before execution",
        ErrorCode::QUERY_PARTITIONS_FAILED => "Too many partitions failed for the failure policy",
        ErrorCode::QUERY_REDUCE_FAILED => "The reduce step failed",
        ErrorCode::QUERY_TIMEOUT => "The query budget was exhausted",
        ErrorCode::QUERY_CANCELLED => "The query was cancelled",

        _ => "Unknown error code",
    }
}
