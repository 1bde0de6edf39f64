//! Partition failure policy

use serde::{Deserialize, Serialize};
use std::fmt;

/// How many failed partitions a query tolerates before it is rejected.
///
/// At least one partition must succeed in every mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Any failure fails the query
    #[default]
    Strict,
    /// Tolerate up to `max_failures` failed partitions
    Threshold { max_failures: usize },
    /// Reduce over whatever succeeded
    BestEffort,
}

impl FailurePolicy {
    /// Whether a map phase with these counts may proceed to the reduce step
    pub fn accepts(&self, succeeded: usize, failed: usize) -> bool {
        if succeeded == 0 {
            return false;
        }
        match self {
            Self::Strict => failed == 0,
            Self::Threshold { max_failures } => failed <= *max_failures,
            Self::BestEffort => true,
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Threshold { max_failures } => write!(f, "threshold({max_failures})"),
            Self::BestEffort => write!(f, "best_effort"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_rejects_any_failure() {
        assert!(FailurePolicy::Strict.accepts(3, 0));
        assert!(!FailurePolicy::Strict.accepts(3, 1));
    }

    #[test]
    fn test_threshold() {
        let policy = FailurePolicy::Threshold { max_failures: 2 };
        assert!(policy.accepts(1, 2));
        assert!(!policy.accepts(5, 3));
    }

    #[test]
    fn test_every_mode_needs_one_success() {
        for policy in [
            FailurePolicy::Strict,
            FailurePolicy::Threshold { max_failures: 10 },
            FailurePolicy::BestEffort,
        ] {
            assert!(!policy.accepts(0, 0), "{policy}");
            assert!(!policy.accepts(0, 1), "{policy}");
        }
        assert!(FailurePolicy::BestEffort.accepts(1, 100));
    }
}
