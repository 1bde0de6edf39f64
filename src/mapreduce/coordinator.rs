//! Query coordinator
//!
//! Fans a query out to every requested partition, gathers what comes back,
//! applies the failure policy and runs `onReducer` over the ordered result
//! collection.
//!
//! # Query lifecycle
//!
//! ```text
//! ┌─────────┐  invalid                    ┌──────────────────────┐
//! │ Compile │ ──────────────────────────> │    InvalidScript     │
//! └────┬────┘                             └──────────────────────┘
//!      v
//! ┌─────────┐  cancelled, or cut off      ┌──────────────────────┐
//! │   Map   │  with no result             │ Cancelled / Timeout  │
//! └────┬────┘ ──────────────────────────> └──────────────────────┘
//!      v
//! ┌─────────┐  policy rejects             ┌──────────────────────┐
//! │ Policy  │ ──────────────────────────> │   PartitionsFailed   │
//! └────┬────┘                             └──────────────────────┘
//!      v
//! ┌─────────┐  script error / timeout     ┌──────────────────────┐
//! │ Reduce  │ ──────────────────────────> │     ReduceFailed     │
//! └────┬────┘                             └──────────────────────┘
//!      v
//!    value
//! ```
//!
//! Partitions run concurrently, bounded by `max_parallel`. Each partition's
//! deadline is the earlier of its own timeout and the map cutoff, and covers
//! the wait for a worker slot. The map cutoff is the query budget less the
//! reduce window, or the whole budget when it is shorter than that window.
//! Partitions cut off this way are ordinary timeouts for the failure policy.
//! The collection is assembled only after every partition task has finished,
//! in ascending partition order, and the reduce then runs within its own
//! `reduce_timeout`.

use super::collection::{NodeResult, ResultCollection};
use super::errors::{PartitionError, Phase, QueryError, ReduceFailure};
use super::partition::PartitionExecutor;
use super::query::{Query, QueryId};
use super::{MAP_FUNCTION, REDUCE_FUNCTION};
use crate::config::ExecutionConfig;
use crate::sandbox::{CancelFlag, SandboxInvoker, ScriptArg, ScriptEngine, ScriptError};
use crate::storage::{PartitionId, PartitionStore};
use crate::value::ScalarValue;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, info_span, warn, Instrument};

/// Everything known about a successfully reduced query
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub query_id: QueryId,
    pub value: ScalarValue,
    pub collection: ResultCollection,
    /// Partitions the failure policy allowed the query to proceed without
    #[serde(serialize_with = "serialize_excluded")]
    pub excluded: Vec<PartitionError>,
    pub started_at: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}

#[derive(Serialize)]
struct ExcludedPartition {
    partition: PartitionId,
    error: String,
}

fn serialize_excluded<S: Serializer>(
    failures: &[PartitionError],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(failures.iter().map(|failure| ExcludedPartition {
        partition: failure.partition(),
        error: failure.to_string(),
    }))
}

/// Executes queries against a partition store
pub struct Coordinator {
    engine: Arc<ScriptEngine>,
    store: Arc<dyn PartitionStore>,
    config: ExecutionConfig,
}

impl Coordinator {
    /// Create a new coordinator
    pub fn new(
        engine: Arc<ScriptEngine>,
        store: Arc<dyn PartitionStore>,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            engine,
            store,
            config,
        }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Run `query` over `partitions` and return the reduced value
    pub async fn execute(
        &self,
        query: &Query,
        partitions: &[PartitionId],
    ) -> Result<ScalarValue, QueryError> {
        self.execute_detailed(query, partitions)
            .await
            .map(|outcome| outcome.value)
    }

    /// Run `query` and return the value together with its diagnostics
    pub async fn execute_detailed(
        &self,
        query: &Query,
        partitions: &[PartitionId],
    ) -> Result<QueryOutcome, QueryError> {
        self.execute_with_cancel(query, partitions, &CancelFlag::new())
            .await
    }

    /// Run `query`, aborting every running script once `cancel` is raised
    pub async fn execute_with_cancel(
        &self,
        query: &Query,
        partitions: &[PartitionId],
        cancel: &CancelFlag,
    ) -> Result<QueryOutcome, QueryError> {
        let query_id = QueryId::new();
        let span = info_span!("query", query_id = %query_id);
        self.run_query(query_id, query, partitions, cancel)
            .instrument(span)
            .await
    }

    async fn run_query(
        &self,
        query_id: QueryId,
        query: &Query,
        partitions: &[PartitionId],
        cancel: &CancelFlag,
    ) -> Result<QueryOutcome, QueryError> {
        let started_at = Utc::now();
        let started = Instant::now();
        let cutoff = self.map_cutoff(started, query.budget());

        let partitions: BTreeSet<PartitionId> = partitions.iter().copied().collect();
        if partitions.is_empty() {
            return Err(QueryError::NoPartitions);
        }

        let (map, reduce) = self.compile(query)?;
        info!(
            "Executing query over {} partitions (budget {:?}, policy {})",
            partitions.len(),
            query.budget(),
            self.config.failure_policy
        );

        let deadline = std::cmp::min(started + self.config.partition_timeout, cutoff);
        let outcomes = self.map_phase(map, &partitions, deadline, cancel).await;

        let mut succeeded: Vec<NodeResult> = Vec::with_capacity(outcomes.len());
        let mut failures: Vec<PartitionError> = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(result) => succeeded.push(result),
                Err(failure) => {
                    warn!("{}", failure);
                    failures.push(failure);
                }
            }
        }

        if cancel.is_cancelled() {
            warn!("Query cancelled during map phase");
            return Err(QueryError::Cancelled);
        }
        if succeeded.is_empty() && Instant::now() >= cutoff {
            warn!(
                "Query budget of {:?} spent before any partition finished",
                query.budget()
            );
            return Err(QueryError::Timeout {
                budget: query.budget(),
                failures,
            });
        }

        let policy = self.config.failure_policy;
        if !policy.accepts(succeeded.len(), failures.len()) {
            return Err(QueryError::PartitionsFailed {
                policy,
                succeeded: succeeded.len(),
                failures,
            });
        }

        let collection = ResultCollection::from_results(succeeded);
        debug!(
            "Map phase produced {} results, {} partitions excluded",
            collection.len(),
            failures.len()
        );

        let value = self.reduce_phase(reduce, &collection, cancel).await?;

        let elapsed = started.elapsed();
        info!("Query finished with {} in {:?}", value, elapsed);

        Ok(QueryOutcome {
            query_id,
            value,
            collection,
            excluded: failures,
            started_at,
            elapsed,
        })
    }

    /// End of the map phase: the budget less the reduce window, or the whole
    /// budget when it does not cover that window
    fn map_cutoff(&self, started: Instant, budget: Duration) -> Instant {
        match budget.checked_sub(self.config.reduce_timeout) {
            Some(map_budget) if !map_budget.is_zero() => started + map_budget,
            _ => started + budget,
        }
    }

    /// Compile both scripts once and check their entry points exist
    fn compile(&self, query: &Query) -> Result<(SandboxInvoker, SandboxInvoker), QueryError> {
        let invalid_map = |source| QueryError::InvalidScript {
            phase: Phase::Map,
            source,
        };
        let invalid_reduce = |source| QueryError::InvalidScript {
            phase: Phase::Reduce,
            source,
        };

        let map = self.engine.compile(query.map_source()).map_err(invalid_map)?;
        map.require_function(MAP_FUNCTION).map_err(invalid_map)?;

        let reduce = if query.shares_source() {
            map.clone()
        } else {
            self.engine
                .compile(query.reduce_source())
                .map_err(invalid_reduce)?
        };
        reduce
            .require_function(REDUCE_FUNCTION)
            .map_err(invalid_reduce)?;

        Ok((
            SandboxInvoker::new(Arc::clone(&self.engine), map),
            SandboxInvoker::new(Arc::clone(&self.engine), reduce),
        ))
    }

    async fn map_phase(
        &self,
        invoker: SandboxInvoker,
        partitions: &BTreeSet<PartitionId>,
        deadline: Instant,
        cancel: &CancelFlag,
    ) -> Vec<Result<NodeResult, PartitionError>> {
        let executor = PartitionExecutor::new(Arc::clone(&self.store), invoker);
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel));

        let tasks = partitions.iter().map(|&partition| {
            let executor = executor.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let span = info_span!("partition", partition = %partition);

            let handle = tokio::spawn(
                async move {
                    let budget = deadline.saturating_duration_since(Instant::now());
                    let acquired = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return Err(PartitionError::Cancelled { partition });
                        }
                        acquired = timeout_at(deadline, semaphore.acquire_owned()) => acquired,
                    };
                    let _permit = match acquired {
                        Ok(Ok(permit)) => permit,
                        Ok(Err(_)) => {
                            return Err(PartitionError::Crashed {
                                partition,
                                message: "worker pool closed".to_string(),
                            })
                        }
                        Err(_) => return Err(PartitionError::Timeout { partition, budget }),
                    };
                    executor.run(partition, deadline, &cancel).await
                }
                .instrument(span),
            );

            async move {
                handle.await.unwrap_or_else(|e| {
                    Err(PartitionError::Crashed {
                        partition,
                        message: e.to_string(),
                    })
                })
            }
        });

        join_all(tasks).await
    }

    async fn reduce_phase(
        &self,
        invoker: SandboxInvoker,
        collection: &ResultCollection,
        cancel: &CancelFlag,
    ) -> Result<ScalarValue, QueryError> {
        let deadline = Instant::now() + self.config.reduce_timeout;

        let span = info_span!("reduce", results = collection.len());
        let invocation = invoker
            .invoke_async(
                REDUCE_FUNCTION,
                vec![ScriptArg::Results(collection.values_arc())],
                deadline.into_std(),
                cancel.clone(),
            )
            .instrument(span)
            .await
            .map_err(|err| match err {
                ScriptError::Cancelled { .. } => QueryError::Cancelled,
                err => QueryError::ReduceFailed(ReduceFailure::Script(err)),
            })?;

        ScalarValue::try_from(invocation.value)
            .map_err(|e| QueryError::ReduceFailed(ReduceFailure::TypeMismatch(e)))
    }
}
