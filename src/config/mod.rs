//! Engine configuration
//!
//! Configuration is plain serde data loaded from TOML, with environment
//! overrides applied on top. Every section has defaults, so an empty file is a
//! valid configuration.

pub mod loader;

pub use loader::{ConfigError, ENV_FAILURE_POLICY, ENV_LOG_LEVEL, ENV_MAX_PARALLEL};

use crate::mapreduce::FailurePolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration for a [`crate::ShardEngine`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub execution: ExecutionConfig,
    pub sandbox: SandboxConfig,
    pub logging: LoggingConfig,
}

/// Fan-out, deadline and failure-policy settings for the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Maximum number of partitions executed concurrently
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Budget for one partition: slot wait, snapshot acquisition and `onNode`
    #[serde(with = "humantime_serde", default = "default_partition_timeout")]
    pub partition_timeout: Duration,

    /// Budget for the `onReducer` invocation
    #[serde(with = "humantime_serde", default = "default_reduce_timeout")]
    pub reduce_timeout: Duration,

    /// How many failed partitions a query tolerates
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            partition_timeout: default_partition_timeout(),
            reduce_timeout: default_reduce_timeout(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

fn default_max_parallel() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_partition_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_reduce_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Resource limits applied to every script invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Linear memory cap per invocation, in bytes
    #[serde(default = "default_max_memory_bytes")]
    pub max_memory_bytes: usize,

    /// Maximum number of live host handles per invocation
    #[serde(default = "default_max_handles")]
    pub max_handles: usize,

    /// How often running scripts check their deadline and cancellation flag
    #[serde(with = "humantime_serde", default = "default_epoch_tick")]
    pub epoch_tick: Duration,

    /// Script log lines retained per invocation
    #[serde(default = "default_max_log_lines")]
    pub max_log_lines: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_memory_bytes: default_max_memory_bytes(),
            max_handles: default_max_handles(),
            epoch_tick: default_epoch_tick(),
            max_log_lines: default_max_log_lines(),
        }
    }
}

fn default_max_memory_bytes() -> usize {
    64 * 1024 * 1024 // 64 MiB
}

fn default_max_handles() -> usize {
    4096
}

fn default_epoch_tick() -> Duration {
    Duration::from_millis(10)
}

fn default_max_log_lines() -> usize {
    256
}

/// Logging setup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. "info" or "shardscript=debug"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 0 = plain, 1 = show targets, 2+ = also thread ids and line numbers
    #[serde(default)]
    pub verbose: u8,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            verbose: 0,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
