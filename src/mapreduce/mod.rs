//! Scatter/gather execution of map and reduce scripts over partitions
//!
//! A [`Query`] carries the script sources and a time budget. The
//! [`Coordinator`] runs `onNode` on every partition through a
//! [`PartitionExecutor`], builds a [`ResultCollection`] in ascending partition
//! order, checks the [`FailurePolicy`] and hands the collection to
//! `onReducer`.

pub mod collection;
pub mod coordinator;
pub mod errors;
pub mod partition;
pub mod policy;
pub mod query;

pub use collection::{NodeResult, ResultCollection};
pub use coordinator::{Coordinator, QueryOutcome};
pub use errors::{PartitionError, Phase, QueryError, ReduceFailure};
pub use partition::PartitionExecutor;
pub use policy::FailurePolicy;
pub use query::{Query, QueryId};

/// Entry point run once per partition
pub const MAP_FUNCTION: &str = "onNode";

/// Entry point run once over the collected results
pub const REDUCE_FUNCTION: &str = "onReducer";
