//! Partition executor
//!
//! Runs `onNode` against a single partition: acquires the partition snapshot,
//! hands its data-access handle to the sandbox and normalises the returned
//! value. No retries happen here.

use super::collection::NodeResult;
use super::errors::PartitionError;
use super::MAP_FUNCTION;
use crate::sandbox::{CancelFlag, SandboxInvoker, ScriptArg, ScriptError};
use crate::storage::{PartitionId, PartitionStore};
use crate::value::ScalarValue;
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

/// Executes the map function of one query against individual partitions
#[derive(Clone)]
pub struct PartitionExecutor {
    store: Arc<dyn PartitionStore>,
    invoker: SandboxInvoker,
}

impl PartitionExecutor {
    /// Create an executor for the compiled map script in `invoker`
    pub fn new(store: Arc<dyn PartitionStore>, invoker: SandboxInvoker) -> Self {
        Self { store, invoker }
    }

    /// Run `onNode` on `partition`.
    ///
    /// `deadline` covers both snapshot acquisition and script execution.
    pub async fn run(
        &self,
        partition: PartitionId,
        deadline: Instant,
        cancel: &CancelFlag,
    ) -> Result<NodeResult, PartitionError> {
        let started = Instant::now();
        let budget = deadline.saturating_duration_since(started);

        let acquired = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PartitionError::Cancelled { partition }),
            acquired = timeout_at(deadline, self.store.open(partition)) => acquired,
        };
        let snapshot = match acquired {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(source)) => return Err(PartitionError::Unavailable { partition, source }),
            Err(_) => return Err(PartitionError::Timeout { partition, budget }),
        };
        debug!("Acquired snapshot after {:?}", started.elapsed());

        let invocation = self
            .invoker
            .invoke_async(
                MAP_FUNCTION,
                vec![ScriptArg::DataAccess(snapshot)],
                deadline.into_std(),
                cancel.clone(),
            )
            .await
            .map_err(|source| match source {
                ScriptError::Timeout { .. } => PartitionError::Timeout { partition, budget },
                ScriptError::Cancelled { .. } => PartitionError::Cancelled { partition },
                source => PartitionError::Script { partition, source },
            })?;

        let value = ScalarValue::try_from(invocation.value)
            .map_err(|source| PartitionError::TypeMismatch { partition, source })?;

        let duration = started.elapsed();
        debug!("onNode returned {} in {:?}", value, duration);

        Ok(NodeResult {
            partition,
            value,
            duration,
            logs: invocation.logs,
        })
    }
}
