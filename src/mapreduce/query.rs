//! Query definition

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Identifier assigned to each executed query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(Uuid);

impl QueryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for QueryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One map/reduce request: the two script sources plus an overall time budget.
///
/// Sources are WebAssembly modules in text or binary form. A query is
/// consumed by a single execution and never retried.
#[derive(Clone)]
pub struct Query {
    map_source: Arc<[u8]>,
    reduce_source: Arc<[u8]>,
    budget: Duration,
}

impl Query {
    pub fn new(
        map_source: impl AsRef<[u8]>,
        reduce_source: impl AsRef<[u8]>,
        budget: Duration,
    ) -> Self {
        Self {
            map_source: Arc::from(map_source.as_ref()),
            reduce_source: Arc::from(reduce_source.as_ref()),
            budget,
        }
    }

    /// A query whose `onNode` and `onReducer` live in the same module
    pub fn single_source(source: impl AsRef<[u8]>, budget: Duration) -> Self {
        let source: Arc<[u8]> = Arc::from(source.as_ref());
        Self {
            map_source: Arc::clone(&source),
            reduce_source: source,
            budget,
        }
    }

    pub fn map_source(&self) -> &[u8] {
        &self.map_source
    }

    pub fn reduce_source(&self) -> &[u8] {
        &self.reduce_source
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Whether both functions come from one module
    pub fn shares_source(&self) -> bool {
        Arc::ptr_eq(&self.map_source, &self.reduce_source) || self.map_source == self.reduce_source
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("map_source_len", &self.map_source.len())
            .field("reduce_source_len", &self.reduce_source.len())
            .field("budget", &self.budget)
            .finish()
    }
}
