//! Copy-on-write in-memory partition store
//!
//! Each partition holds its table behind an `Arc`. Writers clone the table
//! when a snapshot still references it, so an opened snapshot never observes
//! later mutations.

use super::{
    IteratorExhausted, Key, PartitionId, PartitionSnapshot, PartitionStore, Record,
    RecordIterator, StorageError, Value,
};
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::ops::Bound;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, trace};

type Table = BTreeMap<Key, Value>;

#[derive(Debug, Clone)]
struct PartitionState {
    table: Arc<Table>,
    online: bool,
    /// Artificial acquisition delay, used to stand in for a remote node
    latency: Option<Duration>,
}

impl Default for PartitionState {
    fn default() -> Self {
        Self {
            table: Arc::new(Table::new()),
            online: true,
            latency: None,
        }
    }
}

/// In-memory [`PartitionStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    partitions: RwLock<BTreeMap<PartitionId, PartitionState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with the given (empty) partitions
    pub fn with_partitions(ids: impl IntoIterator<Item = PartitionId>) -> Self {
        let partitions = ids
            .into_iter()
            .map(|id| (id, PartitionState::default()))
            .collect();
        Self {
            partitions: RwLock::new(partitions),
        }
    }

    /// Insert or replace a record. Creates the partition if needed.
    pub async fn put(&self, partition: PartitionId, key: impl Into<Key>, value: impl Into<Value>) {
        let mut partitions = self.partitions.write().await;
        let state = partitions.entry(partition).or_default();
        Arc::make_mut(&mut state.table).insert(key.into(), value.into());
    }

    /// Remove a record, returning whether it existed
    pub async fn delete(&self, partition: PartitionId, key: impl Into<Key>) -> bool {
        let mut partitions = self.partitions.write().await;
        match partitions.get_mut(&partition) {
            Some(state) => Arc::make_mut(&mut state.table).remove(&key.into()).is_some(),
            None => false,
        }
    }

    /// Insert a record into the partition its key hashes to.
    ///
    /// Keys are spread as `hash(key) % partition_count` over the known
    /// partitions in ascending order. Returns `None` when the store has no
    /// partitions.
    pub async fn put_routed(
        &self,
        key: impl Into<Key>,
        value: impl Into<Value>,
    ) -> Option<PartitionId> {
        let key = key.into();
        let mut partitions = self.partitions.write().await;
        if partitions.is_empty() {
            return None;
        }

        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() % partitions.len() as u64) as usize;

        let (id, state) = partitions.iter_mut().nth(index)?;
        Arc::make_mut(&mut state.table).insert(key, value.into());
        trace!("Routed key to partition {}", id);
        Some(*id)
    }

    /// Mark a partition reachable or unreachable
    pub async fn set_online(&self, partition: PartitionId, online: bool) {
        let mut partitions = self.partitions.write().await;
        partitions.entry(partition).or_default().online = online;
        debug!("Partition {} online={}", partition, online);
    }

    /// Delay every `open` of this partition by `latency`
    pub async fn set_latency(&self, partition: PartitionId, latency: Option<Duration>) {
        let mut partitions = self.partitions.write().await;
        partitions.entry(partition).or_default().latency = latency;
    }

    /// Number of records currently stored in a partition
    pub async fn len(&self, partition: PartitionId) -> usize {
        let partitions = self.partitions.read().await;
        partitions.get(&partition).map_or(0, |s| s.table.len())
    }
}

#[async_trait]
impl PartitionStore for MemoryStore {
    async fn open(
        &self,
        partition: PartitionId,
    ) -> Result<Arc<dyn PartitionSnapshot>, StorageError> {
        let state = {
            let partitions = self.partitions.read().await;
            partitions
                .get(&partition)
                .cloned()
                .ok_or(StorageError::UnknownPartition { partition })?
        };

        if let Some(latency) = state.latency {
            tokio::time::sleep(latency).await;
        }

        if !state.online {
            return Err(StorageError::Unavailable {
                partition,
                reason: "partition is offline".to_string(),
            });
        }

        debug!(
            "Opened snapshot of partition {} ({} records)",
            partition,
            state.table.len()
        );
        Ok(Arc::new(MemorySnapshot {
            partition,
            table: state.table,
        }))
    }

    async fn partitions(&self) -> Vec<PartitionId> {
        self.partitions.read().await.keys().copied().collect()
    }
}

/// Frozen view of one [`MemoryStore`] partition
#[derive(Debug, Clone)]
pub struct MemorySnapshot {
    partition: PartitionId,
    table: Arc<Table>,
}

impl MemorySnapshot {
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl PartitionSnapshot for MemorySnapshot {
    fn partition(&self) -> PartitionId {
        self.partition
    }

    fn iterator_from_beginning(&self) -> Box<dyn RecordIterator> {
        Box::new(MemoryIterator::new(Arc::clone(&self.table)))
    }
}

/// Cursor over a [`MemorySnapshot`]
///
/// Remembers the last key it returned and resumes strictly after it, so it
/// holds no borrow into the table.
#[derive(Debug)]
pub struct MemoryIterator {
    table: Arc<Table>,
    last: Option<Key>,
}

impl MemoryIterator {
    fn new(table: Arc<Table>) -> Self {
        Self { table, last: None }
    }

    fn peek(&self) -> Option<(&Key, &Value)> {
        match &self.last {
            None => self.table.iter().next(),
            Some(last) => self
                .table
                .range((Bound::Excluded(last), Bound::Unbounded))
                .next(),
        }
    }
}

impl RecordIterator for MemoryIterator {
    fn has_next(&self) -> bool {
        self.peek().is_some()
    }

    fn next(&mut self) -> Result<Record, IteratorExhausted> {
        let (key, value) = self
            .peek()
            .map(|(k, v)| (k.clone(), v.clone()))
            .ok_or(IteratorExhausted)?;
        self.last = Some(key.clone());
        Ok(Record::new(key, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Records;

    const P0: PartitionId = PartitionId(0);

    #[tokio::test]
    async fn test_iterates_in_ascending_key_order() {
        let store = MemoryStore::new();
        for key in ["delta", "alpha", "charlie", "bravo"] {
            store.put(P0, key, "v").await;
        }

        let snapshot = store.open(P0).await.unwrap();
        let keys: Vec<Vec<u8>> = Records::new(snapshot.iterator_from_beginning())
            .map(|r| r.key().as_bytes().to_vec())
            .collect();

        assert_eq!(
            keys,
            vec![
                b"alpha".to_vec(),
                b"bravo".to_vec(),
                b"charlie".to_vec(),
                b"delta".to_vec()
            ]
        );
    }

    #[tokio::test]
    async fn test_next_after_exhaustion_fails() {
        let store = MemoryStore::new();
        store.put(P0, "only", "v").await;

        let snapshot = store.open(P0).await.unwrap();
        let mut iter = snapshot.iterator_from_beginning();
        assert!(iter.has_next());
        assert!(iter.has_next());
        assert_eq!(iter.next().unwrap().key(), &Key::from("only"));
        assert!(!iter.has_next());
        assert_eq!(iter.next(), Err(IteratorExhausted));
        assert_eq!(iter.next(), Err(IteratorExhausted));
    }

    #[tokio::test]
    async fn test_snapshot_ignores_later_writes() {
        let store = MemoryStore::new();
        store.put(P0, "a", "1").await;
        store.put(P0, "b", "2").await;

        let snapshot = store.open(P0).await.unwrap();
        store.put(P0, "c", "3").await;
        assert!(store.delete(P0, "a").await);

        let seen: Vec<Record> = Records::new(snapshot.iterator_from_beginning()).collect();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].key(), &Key::from("a"));
        assert_eq!(store.len(P0).await, 2);
    }

    #[tokio::test]
    async fn test_offline_partition_is_unavailable() {
        let store = MemoryStore::with_partitions([P0]);
        store.set_online(P0, false).await;

        let err = store.open(P0).await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable { partition, .. } if partition == P0));

        let err = store.open(PartitionId(9)).await.unwrap_err();
        assert_eq!(
            err,
            StorageError::UnknownPartition {
                partition: PartitionId(9)
            }
        );
    }

    #[tokio::test]
    async fn test_routed_puts_land_on_known_partitions() {
        let store = MemoryStore::with_partitions((0..3).map(PartitionId));
        let mut total = 0;
        for i in 0..30 {
            let id = store.put_routed(format!("key-{i}"), "v").await.unwrap();
            assert!(id.0 < 3);
            total += 1;
        }

        let mut stored = 0;
        for id in store.partitions().await {
            stored += store.len(id).await;
        }
        assert_eq!(stored, total);
        assert!(MemoryStore::new().put_routed("k", "v").await.is_none());
    }
}
