//! End-to-end tests for the longest-key query and its calling conventions

mod common;

use anyhow::Result;
use common::*;
use shardscript::{PartitionId, Query, ScalarValue};

#[tokio::test]
async fn test_longest_key_across_three_partitions() -> Result<()> {
    let store = TestStoreBuilder::new()
        .partition(1, &[4, 1, 3])
        .partition(2, &[2, 9])
        .partition(3, &[2])
        .build()
        .await;
    let engine = engine(store, |_| {});

    let outcome = engine
        .execute_detailed(&Query::single_source(LONGEST_KEY, budget()), &ids(&[3, 1, 2]))
        .await?;

    assert_eq!(
        outcome.collection.values(),
        vec![ScalarValue::Int(4), ScalarValue::Int(9), ScalarValue::Int(2)]
    );
    assert_eq!(outcome.value, ScalarValue::Int(9));
    Ok(())
}

#[tokio::test]
async fn test_indexable_and_iterable_reducers_agree() -> Result<()> {
    let store = TestStoreBuilder::new()
        .partition(0, &[3])
        .partition(1, &[12])
        .partition(2, &[7])
        .build()
        .await;
    let engine = engine(store, |_| {});
    let partitions = ids(&[0, 1, 2]);

    let indexable = engine
        .execute(&Query::single_source(LONGEST_KEY, budget()), &partitions)
        .await?;
    let iterable = engine
        .execute(
            &Query::single_source(LONGEST_KEY_ITERABLE, budget()),
            &partitions,
        )
        .await?;

    assert_eq!(indexable, ScalarValue::Int(12));
    assert_eq!(indexable, iterable);
    Ok(())
}

#[tokio::test]
async fn test_legacy_script_matches_canonical_script() -> Result<()> {
    let store = TestStoreBuilder::new()
        .partition(0, &[4])
        .partition(1, &[9])
        .partition(2, &[2])
        .build()
        .await;
    let engine = engine(store, |_| {});
    let partitions = ids(&[0, 1, 2]);

    let legacy = engine
        .execute_detailed(
            &Query::single_source(LEGACY_LONGEST_KEY, budget()),
            &partitions,
        )
        .await?;
    let canonical = engine
        .execute(&Query::single_source(LONGEST_KEY, budget()), &partitions)
        .await?;

    assert_eq!(legacy.value, canonical);
    assert_eq!(legacy.collection.values(), vec![
        ScalarValue::Int(4),
        ScalarValue::Int(9),
        ScalarValue::Int(2)
    ]);
    Ok(())
}

#[tokio::test]
async fn test_hash_routed_keys_cover_every_partition() -> Result<()> {
    let store = TestStoreBuilder::new()
        .partition(0, &[])
        .partition(1, &[])
        .partition(2, &[])
        .build()
        .await;

    let mut longest = 0;
    for len in 1..=40 {
        let key = key_of_length(len, len);
        let routed = store.put_routed(key, "value").await;
        assert!(matches!(routed, Some(PartitionId(0..=2))));
        longest = longest.max(len);
    }

    let engine = engine(store, |_| {});
    let outcome = engine
        .execute_all(&Query::single_source(LONGEST_KEY, budget()))
        .await?;
    assert_eq!(outcome.value, ScalarValue::Int(longest as i64));
    Ok(())
}

#[tokio::test]
async fn test_float_reduction() -> Result<()> {
    let store = TestStoreBuilder::new()
        .partition(0, &[1, 2, 3])
        .partition(1, &[1])
        .build()
        .await;
    let engine = engine(store, |_| {});

    let total = engine
        .execute(&Query::single_source(RECORD_COUNT_SUM, budget()), &ids(&[0, 1]))
        .await?;
    assert_eq!(total, ScalarValue::Float(4.0));
    Ok(())
}
