use super::EngineConfig;
use crate::mapreduce::FailurePolicy;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Overrides `execution.max_parallel`
pub const ENV_MAX_PARALLEL: &str = "SHARDSCRIPT_MAX_PARALLEL";
/// Overrides `logging.level`
pub const ENV_LOG_LEVEL: &str = "SHARDSCRIPT_LOG_LEVEL";
/// Overrides `execution.failure_policy` with `strict` or `best_effort`
pub const ENV_FAILURE_POLICY: &str = "SHARDSCRIPT_FAILURE_POLICY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file {path} not found")]
    NotFound { path: PathBuf },

    #[error("failed to read configuration file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration{}", describe_path(.path))]
    Parse {
        path: Option<PathBuf>,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

fn describe_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" file {}", p.display()))
        .unwrap_or_default()
}

impl EngineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|source| ConfigError::Parse { path: None, source })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, apply environment overrides, and validate
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let mut config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: Some(path.to_path_buf()),
            source,
        })?;
        config.merge_env_vars()?;
        config.validate()?;

        debug!("Loaded engine configuration from {}", path.display());
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn merge_env_vars(&mut self) -> Result<(), ConfigError> {
        self.merge_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn merge_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MAX_PARALLEL) {
            self.execution.max_parallel =
                raw.trim().parse().map_err(|_| ConfigError::Invalid {
                    field: ENV_MAX_PARALLEL.to_string(),
                    reason: format!("'{raw}' is not a positive integer"),
                })?;
        }

        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }

        if let Some(raw) = lookup(ENV_FAILURE_POLICY) {
            self.execution.failure_policy = match raw.trim() {
                "strict" => FailurePolicy::Strict,
                "best_effort" => FailurePolicy::BestEffort,
                other => {
                    return Err(ConfigError::Invalid {
                        field: ENV_FAILURE_POLICY.to_string(),
                        reason: format!("unknown policy '{other}'"),
                    })
                }
            };
        }

        Ok(())
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, reason: &str| {
            Err(ConfigError::Invalid {
                field: field.to_string(),
                reason: reason.to_string(),
            })
        };

        if self.execution.max_parallel == 0 {
            return invalid("execution.max_parallel", "must be greater than zero");
        }
        if self.execution.partition_timeout.is_zero() {
            return invalid("execution.partition_timeout", "must be greater than zero");
        }
        if self.execution.reduce_timeout.is_zero() {
            return invalid("execution.reduce_timeout", "must be greater than zero");
        }
        if self.sandbox.epoch_tick.is_zero() {
            return invalid("sandbox.epoch_tick", "must be greater than zero");
        }
        if self.sandbox.max_handles == 0 {
            return invalid("sandbox.max_handles", "must be greater than zero");
        }
        if self.sandbox.max_memory_bytes == 0 {
            return invalid("sandbox.max_memory_bytes", "must be greater than zero");
        }

        Ok(())
    }
}
