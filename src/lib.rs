//! # shardscript
//!
//! Distributed map/reduce query execution over a partitioned, ordered
//! key-value store. A query supplies an `onNode` function that runs once per
//! partition against a forward iterator over that partition's records, and an
//! `onReducer` function that combines the per-partition numbers into one
//! answer.
//!
//! ## Usage
//!
//! ```ignore
//! use shardscript::{EngineConfig, MemoryStore, PartitionId, Query, ShardEngine};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let store = Arc::new(MemoryStore::new());
//! store.put(PartitionId(0), "key", "value").await;
//!
//! let engine = ShardEngine::new(EngineConfig::default(), store)?;
//! let query = Query::single_source(
//!     include_str!("../scripts/longest_key.wat"),
//!     Duration::from_secs(5),
//! );
//! let longest = engine.execute(&query, &[PartitionId(0)]).await?;
//! ```
//!
//! ## Modules
//!
//! - `config` - TOML configuration with environment overrides
//! - `error` - Crate-level error type with stable codes
//! - `logging` - tracing subscriber setup
//! - `mapreduce` - Coordinator, partition executor, failure policy and results
//! - `sandbox` - WebAssembly script host with deadlines and cancellation
//! - `storage` - Partition store traits and the in-memory store
//! - `value` - Numeric values exchanged with scripts
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod mapreduce;
pub mod sandbox;
pub mod storage;
pub mod value;

pub use config::{EngineConfig, ExecutionConfig, LoggingConfig, SandboxConfig};
pub use engine::ShardEngine;
pub use error::{ErrorCode, ShardScriptError};
pub use mapreduce::{
    Coordinator, FailurePolicy, NodeResult, PartitionError, Query, QueryError, QueryOutcome,
    ResultCollection,
};
pub use sandbox::{CancelFlag, ScriptEngine, ScriptError};
pub use storage::{MemoryStore, PartitionId, PartitionStore};
pub use value::ScalarValue;
