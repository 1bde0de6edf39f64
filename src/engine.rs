//! Engine facade
//!
//! [`ShardEngine`] wires a [`ScriptEngine`] and a [`Coordinator`] together
//! from one [`EngineConfig`] and reports errors as
//! [`ShardScriptError`](crate::error::ShardScriptError).

use crate::config::EngineConfig;
use crate::error::Result;
use crate::mapreduce::{Coordinator, Query, QueryOutcome};
use crate::sandbox::{CancelFlag, ScriptEngine};
use crate::storage::{PartitionId, PartitionStore};
use crate::value::ScalarValue;
use std::sync::Arc;
use tracing::info;

/// Entry point for running map/reduce queries against a partition store
pub struct ShardEngine {
    config: EngineConfig,
    store: Arc<dyn PartitionStore>,
    coordinator: Coordinator,
}

impl ShardEngine {
    /// Build the script engine and coordinator described by `config`
    pub fn new(config: EngineConfig, store: Arc<dyn PartitionStore>) -> Result<Self> {
        config.validate()?;

        let scripts = Arc::new(ScriptEngine::new(config.sandbox.clone())?);
        let coordinator =
            Coordinator::new(scripts, Arc::clone(&store), config.execution.clone());
        info!(
            "Shard engine ready (max_parallel={}, policy={})",
            config.execution.max_parallel, config.execution.failure_policy
        );

        Ok(Self {
            config,
            store,
            coordinator,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `query` over `partitions` and return the reduced value
    pub async fn execute(&self, query: &Query, partitions: &[PartitionId]) -> Result<ScalarValue> {
        Ok(self.coordinator.execute(query, partitions).await?)
    }

    /// Run `query` over `partitions` and keep the diagnostics
    pub async fn execute_detailed(
        &self,
        query: &Query,
        partitions: &[PartitionId],
    ) -> Result<QueryOutcome> {
        Ok(self.coordinator.execute_detailed(query, partitions).await?)
    }

    /// Run `query` under an external cancellation flag
    pub async fn execute_with_cancel(
        &self,
        query: &Query,
        partitions: &[PartitionId],
        cancel: &CancelFlag,
    ) -> Result<QueryOutcome> {
        Ok(self
            .coordinator
            .execute_with_cancel(query, partitions, cancel)
            .await?)
    }

    /// Run `query` over every partition the store knows about
    pub async fn execute_all(&self, query: &Query) -> Result<QueryOutcome> {
        let partitions = self.store.partitions().await;
        self.execute_detailed(query, &partitions).await
    }
}

impl std::fmt::Debug for ShardEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
