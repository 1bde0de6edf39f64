//! Per-partition results and the ordered collection handed to the reducer

use crate::storage::PartitionId;
use crate::value::ScalarValue;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Successful `onNode` result of one partition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeResult {
    pub partition: PartitionId,
    pub value: ScalarValue,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub logs: Vec<String>,
}

/// Immutable, partition-ordered set of node results
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultCollection {
    results: Vec<NodeResult>,
}

impl ResultCollection {
    /// Build the collection, ordering by ascending partition id regardless of
    /// the order results arrived in
    pub fn from_results(mut results: Vec<NodeResult>) -> Self {
        results.sort_by_key(|r| r.partition);
        Self { results }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&NodeResult> {
        self.results.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NodeResult> {
        self.results.iter()
    }

    pub fn values(&self) -> Vec<ScalarValue> {
        self.results.iter().map(|r| r.value).collect()
    }

    /// Values in collection order, as handed to the reducer
    pub fn values_arc(&self) -> Arc<[ScalarValue]> {
        self.results.iter().map(|r| r.value).collect()
    }

    pub fn partitions(&self) -> Vec<PartitionId> {
        self.results.iter().map(|r| r.partition).collect()
    }

    pub fn max(&self) -> Option<ScalarValue> {
        self.results.iter().map(|r| r.value).max()
    }

    pub fn min(&self) -> Option<ScalarValue> {
        self.results.iter().map(|r| r.value).min()
    }

    /// Integer sum while every value is an integer and it fits, float otherwise
    pub fn sum(&self) -> ScalarValue {
        let exact = self.results.iter().try_fold(0i64, |acc, r| match r.value {
            ScalarValue::Int(v) => acc.checked_add(v),
            ScalarValue::Float(_) => None,
        });

        match exact {
            Some(total) => ScalarValue::Int(total),
            None => ScalarValue::Float(self.results.iter().map(|r| r.value.as_f64()).sum()),
        }
    }
}

impl<'a> IntoIterator for &'a ResultCollection {
    type Item = &'a NodeResult;
    type IntoIter = std::slice::Iter<'a, NodeResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}
