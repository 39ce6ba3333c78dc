use std::sync::Arc;

use proptest::prelude::*;
use serde_json::Value;

use ur_core::{Clock, ManualClock, RedirectorConfig, Rule};
use ur_service::codec::{chunk_count, from_chunks, to_storage_items};
use ur_service::{KeyValueStore, MemoryStore, RuleStore, StorageError};

fn store_over(backend: Arc<MemoryStore>) -> RuleStore {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(0));
    RuleStore::new(backend, RedirectorConfig::default(), clock)
}

async fn count_of(store: &RuleStore, id: i64) -> u64 {
    let rules = store.get_rules().await.expect("get");
    rules.iter().find(|rule| rule.id == id).expect("rule").count
}

#[tokio::test]
async fn concurrent_increments_on_one_store_both_land() {
    let store = store_over(Arc::new(MemoryStore::new().yielding()));
    store.add_rule(Rule::new(1, "a.com", "b.com")).await.expect("add");

    let (first, second) = tokio::join!(store.increment_count(1, 1, None), store.increment_count(1, 1, None));
    first.expect("first");
    second.expect("second");

    assert_eq!(count_of(&store, 1).await, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_spawned_increments_all_land() {
    let store = Arc::new(store_over(Arc::new(MemoryStore::new().yielding())));
    store.add_rule(Rule::new(1, "a.com", "b.com")).await.expect("add");

    let handles: Vec<_> = (0..40)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.increment_count(1, 1, None).await })
        })
        .collect();
    for handle in handles {
        handle.await.expect("join").expect("increment");
    }

    assert_eq!(count_of(&store, 1).await, 40);
}

#[tokio::test]
async fn separate_stores_race_last_write_wins() {
    // Two stores over one backend do not share a lock, so their
    // read-modify-writes interleave and one increment is lost.
    let backend = Arc::new(MemoryStore::new().yielding());
    let left = store_over(backend.clone());
    let right = store_over(backend);
    left.add_rule(Rule::new(1, "a.com", "b.com")).await.expect("add");

    let (first, second) = tokio::join!(left.increment_count(1, 1, None), right.increment_count(1, 1, None));
    first.expect("first");
    second.expect("second");

    assert_eq!(count_of(&left, 1).await, 1);
}

#[tokio::test]
async fn large_rule_sets_fit_sync_quota() {
    let backend = Arc::new(MemoryStore::new().with_item_limit(8192));
    let store = store_over(backend.clone());

    let rules: Vec<Rule> = (0..600)
        .map(|i| {
            let mut rule = Rule::new(1_700_000_000_000 + i, format!("distracting-site-{}.com/feed", i), ":shuffle:");
            rule.count = i as u64 * 13;
            rule
        })
        .collect();
    store.save_rules(rules.clone()).await.expect("save");

    let meta = backend.snapshot()["rules_meta"].clone();
    assert!(chunk_count(&meta).expect("meta") > 1);
    assert_eq!(store.get_rules().await.expect("get"), rules);
}

#[tokio::test]
async fn oversized_chunk_is_rejected_without_partial_write() {
    let backend = Arc::new(MemoryStore::new().with_item_limit(100));
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(0));
    let config = RedirectorConfig {
        chunk_size: 500,
        ..RedirectorConfig::default()
    };
    let store = RuleStore::new(backend.clone(), config, clock);

    let rules: Vec<Rule> = (0..20).map(|i| Rule::new(i, format!("site{}.com", i), "focus.com")).collect();
    let err = store.save_rules(rules).await.unwrap_err();
    assert!(matches!(err, StorageError::QuotaExceeded { limit: 100, .. }));
    assert!(backend.snapshot().is_empty());
}

#[tokio::test]
async fn read_failure_propagates() {
    let backend = Arc::new(MemoryStore::new());
    let store = store_over(backend.clone());
    backend.fail_reads(true);

    assert!(matches!(store.get_rules().await, Err(StorageError::Backend(_))));
    assert!(matches!(store.increment_count(1, 1, None).await, Err(StorageError::Backend(_))));
}

#[tokio::test]
async fn corrupt_chunk_is_a_codec_error() {
    let backend = Arc::new(MemoryStore::new());
    backend.insert("rules_meta", serde_json::json!({"chunks": 1}));
    backend.insert("rules_0", Value::String("[[1,\"a.com\"".to_string()));
    let store = store_over(backend.clone());

    assert!(matches!(store.get_rules().await, Err(StorageError::Codec(_))));
    let fetched = backend.get(&["rules_0".to_string()]).await.expect("get");
    assert_eq!(fetched.len(), 1);
}

fn arb_rule() -> impl Strategy<Value = Rule> {
    (
        any::<i64>(),
        "[a-z\"\\\\é]{1,12}\\.com",
        "([a-z]{1,10}\\.org|:shuffle:)",
        any::<u64>(),
        any::<bool>(),
        proptest::option::of(any::<i64>()),
        proptest::option::of(any::<i64>()),
        proptest::option::of("[ -~]{0,20}"),
    )
        .prop_map(|(id, source, target, count, active, paused_until, override_until, message)| Rule {
            id,
            source,
            target,
            count,
            active,
            paused_until,
            override_until,
            last_count_message: message,
        })
}

proptest! {
    #[test]
    fn chunked_layout_preserves_rules_and_respects_size(
        rules in prop::collection::vec(arb_rule(), 0..30),
        chunk_size in 16usize..300,
    ) {
        let items = to_storage_items(&rules, "rules", chunk_size);
        let count = chunk_count(&items["rules_meta"]).expect("meta");

        for (key, value) in &items {
            if key != "rules_meta" {
                prop_assert!(value.to_string().len() <= chunk_size);
            }
        }
        prop_assert_eq!(from_chunks(&items, "rules", count).expect("decode"), rules);
    }
}
