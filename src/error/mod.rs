//! Crate-level error type
//!
//! Library modules report their own precise errors (`ConfigError`,
//! `ScriptError`, `QueryError`). `ShardScriptError` folds them into one type
//! with a stable numeric code for embedders that surface errors to users.

use thiserror::Error;

use crate::config::ConfigError;
use crate::mapreduce::QueryError;
use crate::sandbox::ScriptError;

pub mod codes;

pub use codes::{describe_error_code, ErrorCode};

/// The unified error type for shardscript
#[derive(Error, Debug)]
pub enum ShardScriptError {
    #[error("[E{code:04}] Configuration error: {source}")]
    Config {
        code: u16,
        #[source]
        source: ConfigError,
    },

    #[error("[E{code:04}] Sandbox error: {source}")]
    Sandbox {
        code: u16,
        #[source]
        source: ScriptError,
    },

    #[error("[E{code:04}] Query failed: {source}")]
    Query {
        code: u16,
        #[source]
        source: QueryError,
    },
}

impl ShardScriptError {
    /// Stable numeric code of this error
    pub fn code(&self) -> u16 {
        match self {
            Self::Config { code, .. } | Self::Sandbox { code, .. } | Self::Query { code, .. } => {
                *code
            }
        }
    }

    /// Human-readable description of the error code
    pub fn describe(&self) -> &'static str {
        describe_error_code(self.code())
    }
}

impl From<ConfigError> for ShardScriptError {
    fn from(source: ConfigError) -> Self {
        let code = match &source {
            ConfigError::NotFound { .. } => ErrorCode::CONFIG_NOT_FOUND,
            ConfigError::Parse { .. } => ErrorCode::CONFIG_PARSE_ERROR,
            ConfigError::Invalid { .. } => ErrorCode::CONFIG_INVALID_VALUE,
            ConfigError::Io { .. } => ErrorCode::CONFIG_GENERIC,
        };
        Self::Config { code, source }
    }
}

impl From<ScriptError> for ShardScriptError {
    fn from(source: ScriptError) -> Self {
        Self::Sandbox {
            code: ErrorCode::SANDBOX_ENGINE_INIT,
            source,
        }
    }
}

impl From<QueryError> for ShardScriptError {
    fn from(source: QueryError) -> Self {
        let code = match &source {
            QueryError::NoPartitions => ErrorCode::QUERY_NO_PARTITIONS,
            QueryError::InvalidScript { .. } => ErrorCode::QUERY_INVALID_SCRIPT,
            QueryError::PartitionsFailed { .. } => ErrorCode::QUERY_PARTITIONS_FAILED,
            QueryError::ReduceFailed(_) => ErrorCode::QUERY_REDUCE_FAILED,
            QueryError::Timeout { .. } => ErrorCode::QUERY_TIMEOUT,
            QueryError::Cancelled => ErrorCode::QUERY_CANCELLED,
        };
        Self::Query { code, source }
    }
}

/// Result alias used by the engine facade
pub type Result<T> = std::result::Result<T, ShardScriptError>;
