//! Common test utilities and helpers
#![allow(dead_code)]

use shardscript::{EngineConfig, MemoryStore, PartitionId, ShardEngine};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

pub const LONGEST_KEY: &str = include_str!("../../scripts/longest_key.wat");
pub const LONGEST_KEY_ITERABLE: &str = include_str!("../../scripts/longest_key_iterable.wat");
pub const LEGACY_LONGEST_KEY: &str = include_str!("../../scripts/legacy_longest_key.wat");
pub const RECORD_COUNT_SUM: &str = include_str!("../../scripts/record_count_sum.wat");

/// Counts records, but never returns on an empty partition
pub const HANG_ON_EMPTY: &str = r#"
(module
  (import "dao" "iterator_from_beginning" (func $iterator (param i32) (result i32)))
  (import "dao" "has_next" (func $has_next (param i32) (result i32)))
  (import "dao" "next" (func $next (param i32) (result i32)))
  (import "results" "len" (func $len (param i32) (result i32)))
  (import "results" "get_i64" (func $get (param i32 i32) (result i64)))

  (func (export "onNode") (param $dao i32) (result i64)
    (local $it i32)
    (local $n i64)
    (local.set $it (call $iterator (local.get $dao)))
    (if (i32.eqz (call $has_next (local.get $it)))
      (then (loop $forever (br $forever))))
    (block $done
      (loop $walk
        (br_if $done (i32.eqz (call $has_next (local.get $it))))
        (drop (call $next (local.get $it)))
        (local.set $n (i64.add (local.get $n) (i64.const 1)))
        (br $walk)))
    (local.get $n))

  (func (export "onReducer") (param $results i32) (result i64)
    (local $i i32)
    (local $max i64)
    (local $v i64)
    (block $done
      (loop $scan
        (br_if $done (i32.ge_s (local.get $i) (call $len (local.get $results))))
        (local.set $v (call $get (local.get $results) (local.get $i)))
        (if (i64.gt_s (local.get $v) (local.get $max))
          (then (local.set $max (local.get $v))))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $scan)))
    (local.get $max)))
"#;

/// A key of exactly `len` bytes, distinct for each `index` below 26
pub fn key_of_length(index: usize, len: usize) -> String {
    let first = (b'a' + (index % 26) as u8) as char;
    format!("{first}{}", "x".repeat(len.saturating_sub(1)))
}

pub fn ids(raw: &[u32]) -> Vec<PartitionId> {
    raw.iter().copied().map(PartitionId).collect()
}

/// Builder for in-memory stores used by integration tests
#[derive(Default)]
pub struct TestStoreBuilder {
    partitions: BTreeMap<PartitionId, Vec<usize>>,
    offline: BTreeSet<PartitionId>,
    latency: BTreeMap<PartitionId, Duration>,
}

impl TestStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a partition holding one key per entry of `key_lengths`
    pub fn partition(mut self, id: u32, key_lengths: &[usize]) -> Self {
        self.partitions.insert(PartitionId(id), key_lengths.to_vec());
        self
    }

    /// Make a partition unreachable
    pub fn offline(mut self, id: u32) -> Self {
        self.offline.insert(PartitionId(id));
        self
    }

    /// Delay snapshot acquisition of a partition
    pub fn latency(mut self, id: u32, latency: Duration) -> Self {
        self.latency.insert(PartitionId(id), latency);
        self
    }

    pub async fn build(self) -> Arc<MemoryStore> {
        let store = MemoryStore::with_partitions(self.partitions.keys().copied());
        for (partition, lengths) in &self.partitions {
            for (index, len) in lengths.iter().enumerate() {
                store
                    .put(*partition, key_of_length(index, *len), "value")
                    .await;
            }
        }
        for partition in self.offline {
            store.set_online(partition, false).await;
        }
        for (partition, latency) in self.latency {
            store.set_latency(partition, Some(latency)).await;
        }
        Arc::new(store)
    }
}

/// Engine over `store` with test-friendly defaults, adjusted by `configure`
pub fn engine(store: Arc<MemoryStore>, configure: impl FnOnce(&mut EngineConfig)) -> ShardEngine {
    let mut config = EngineConfig::default();
    config.execution.max_parallel = 4;
    configure(&mut config);
    ShardEngine::new(config, store).expect("engine should build")
}

pub fn budget() -> Duration {
    Duration::from_secs(10)
}
