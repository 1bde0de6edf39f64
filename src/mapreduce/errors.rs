//! Map/reduce error types

use super::policy::FailurePolicy;
use crate::sandbox::ScriptError;
use crate::storage::{PartitionId, StorageError};
use crate::value::TypeMismatch;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Which script function a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Map,
    Reduce,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Map => write!(f, "map"),
            Self::Reduce => write!(f, "reduce"),
        }
    }
}

/// Why one partition contributed no result
#[derive(Debug, Clone, Error)]
pub enum PartitionError {
    #[error("partition {partition} is unavailable: {source}")]
    Unavailable {
        partition: PartitionId,
        source: StorageError,
    },

    #[error("onNode failed on partition {partition}: {source}")]
    Script {
        partition: PartitionId,
        source: ScriptError,
    },

    #[error("partition {partition} returned an unusable value: {source}")]
    TypeMismatch {
        partition: PartitionId,
        source: TypeMismatch,
    },

    #[error("partition {partition} did not finish within {budget:?}")]
    Timeout {
        partition: PartitionId,
        budget: Duration,
    },

    #[error("partition {partition} was cancelled")]
    Cancelled { partition: PartitionId },

    #[error("partition {partition} task crashed: {message}")]
    Crashed {
        partition: PartitionId,
        message: String,
    },
}

impl PartitionError {
    pub fn partition(&self) -> PartitionId {
        match self {
            Self::Unavailable { partition, .. }
            | Self::Script { partition, .. }
            | Self::TypeMismatch { partition, .. }
            | Self::Timeout { partition, .. }
            | Self::Cancelled { partition }
            | Self::Crashed { partition, .. } => *partition,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Failure of the `onReducer` invocation
#[derive(Debug, Clone, Error)]
pub enum ReduceFailure {
    #[error(transparent)]
    Script(ScriptError),

    #[error(transparent)]
    TypeMismatch(TypeMismatch),
}

/// Terminal outcome of a query that produced no value
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query names no partitions")]
    NoPartitions,

    #[error("{phase} script is invalid: {source}")]
    InvalidScript { phase: Phase, source: ScriptError },

    #[error(
        "{} of {} partitions failed under the {policy} failure policy",
        .failures.len(),
        .failures.len() + .succeeded
    )]
    PartitionsFailed {
        policy: FailurePolicy,
        succeeded: usize,
        failures: Vec<PartitionError>,
    },

    #[error("reduce failed: {0}")]
    ReduceFailed(#[source] ReduceFailure),

    #[error("query exceeded its budget of {budget:?}")]
    Timeout {
        budget: Duration,
        failures: Vec<PartitionError>,
    },

    #[error("query was cancelled")]
    Cancelled,
}

impl QueryError {
    /// Partition failures recorded before the query was rejected
    pub fn failures(&self) -> &[PartitionError] {
        match self {
            Self::PartitionsFailed { failures, .. } | Self::Timeout { failures, .. } => failures,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partitions_failed_message_counts() {
        let err = QueryError::PartitionsFailed {
            policy: FailurePolicy::Strict,
            succeeded: 1,
            failures: vec![PartitionError::Cancelled {
                partition: PartitionId(2),
            }],
        };
        assert_eq!(
            err.to_string(),
            "1 of 2 partitions failed under the strict failure policy"
        );
        assert_eq!(err.failures()[0].partition(), PartitionId(2));
    }

    #[test]
    fn test_missing_function_is_named() {
        let err = QueryError::InvalidScript {
            phase: Phase::Map,
            source: ScriptError::MissingFunction {
                name: "onNode".to_string(),
            },
        };
        assert_eq!(
            err.to_string(),
            "map script is invalid: required function onNode not found"
        );
    }
}
