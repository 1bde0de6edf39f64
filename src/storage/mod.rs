//! Partitioned ordered storage as seen by the query engine
//!
//! The engine needs exactly two things from storage: a way to open a
//! consistent snapshot of one partition, and a forward-only cursor over that
//! snapshot in ascending key order. Everything else (on-disk format,
//! replication, compaction) belongs to the storage engine behind
//! [`PartitionStore`].

pub mod memory;

pub use memory::{MemoryIterator, MemorySnapshot, MemoryStore};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Identifier of one partition (node) of the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionId(pub u32);

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

impl From<u32> for PartitionId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Immutable, cheaply clonable byte sequence used for keys and values
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteSeq(Arc<[u8]>);

/// Raw key bytes
pub type Key = ByteSeq;

/// Raw value bytes
pub type Value = ByteSeq;

impl ByteSeq {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Number of unread bytes. Views handed out by the engine are never
    /// consumed, so this is always the full length.
    pub fn remaining(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Byte at `index`, if in range
    pub fn byte_at(&self, index: usize) -> Option<u8> {
        self.0.get(index).copied()
    }
}

impl fmt::Debug for ByteSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0))
    }
}

impl From<&[u8]> for ByteSeq {
    fn from(bytes: &[u8]) -> Self {
        Self(Arc::from(bytes))
    }
}

impl From<Vec<u8>> for ByteSeq {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Arc::from(bytes))
    }
}

impl From<&str> for ByteSeq {
    fn from(s: &str) -> Self {
        Self::from(s.as_bytes())
    }
}

impl From<String> for ByteSeq {
    fn from(s: String) -> Self {
        Self::from(s.into_bytes())
    }
}

/// One stored key/value pair, read at a specific iteration position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    key: Key,
    value: Value,
}

impl Record {
    pub fn new(key: impl Into<Key>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_parts(self) -> (Key, Value) {
        (self.key, self.value)
    }
}

/// Returned by [`RecordIterator::next`] once the cursor has passed the last record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("iterator is exhausted")]
pub struct IteratorExhausted;

/// Forward-only cursor over one partition snapshot, in ascending key order
pub trait RecordIterator: Send {
    /// Whether another record is available. Never moves the cursor.
    fn has_next(&self) -> bool;

    /// Advance exactly one position and return the record there
    fn next(&mut self) -> Result<Record, IteratorExhausted>;
}

/// Consistent, read-only view of one partition as of the moment it was opened
pub trait PartitionSnapshot: Send + Sync + fmt::Debug {
    fn partition(&self) -> PartitionId;

    /// Fresh cursor positioned before the first record
    fn iterator_from_beginning(&self) -> Box<dyn RecordIterator>;
}

/// Errors raised while acquiring a partition
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("partition {partition} is unavailable: {reason}")]
    Unavailable {
        partition: PartitionId,
        reason: String,
    },

    #[error("partition {partition} is not part of this store")]
    UnknownPartition { partition: PartitionId },
}

/// Source of partition snapshots
///
/// `open` is a suspension point: for remote partitions it may wait on the
/// network, so callers bound it with a deadline.
#[async_trait]
pub trait PartitionStore: Send + Sync {
    async fn open(&self, partition: PartitionId)
        -> Result<Arc<dyn PartitionSnapshot>, StorageError>;

    /// Every partition currently known to the store, ascending
    async fn partitions(&self) -> Vec<PartitionId>;
}

/// Adapts a boxed [`RecordIterator`] to [`std::iter::Iterator`]
pub struct Records {
    inner: Box<dyn RecordIterator>,
}

impl Records {
    pub fn new(inner: Box<dyn RecordIterator>) -> Self {
        Self { inner }
    }
}

impl Iterator for Records {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        if self.inner.has_next() {
            self.inner.next().ok()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_counts_all_bytes() {
        let key = Key::from("hello");
        assert_eq!(key.remaining(), 5);
        assert_eq!(key.byte_at(1), Some(b'e'));
        assert_eq!(key.byte_at(5), None);
        assert!(Key::from("").is_empty());
    }

    #[test]
    fn test_keys_order_bytewise() {
        let mut keys = vec![Key::from("b"), Key::from("ab"), Key::from("a")];
        keys.sort();
        let sorted: Vec<&[u8]> = keys.iter().map(ByteSeq::as_bytes).collect();
        assert_eq!(sorted, vec![b"a".as_slice(), b"ab", b"b"]);
    }

    #[test]
    fn test_partition_id_display() {
        assert_eq!(PartitionId(7).to_string(), "p7");
    }
}
