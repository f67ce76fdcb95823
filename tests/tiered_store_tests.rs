//! End-to-end tests for the tiered write and read path

use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

use vectier::{
    MemoryTierClient, StoreError, Tier, TierClient, TieredStore, TierSet, TrackingLedger, VectorId,
    VectorRecord, VectorStoreConfig,
};

struct Harness {
    store: TieredStore,
    authoritative: Arc<MemoryTierClient>,
    cold: Arc<MemoryTierClient>,
    warm: Arc<MemoryTierClient>,
    hot: Arc<MemoryTierClient>,
    _dir: TempDir,
}

fn harness() -> Harness {
    let dir = TempDir::new().expect("temp dir");
    let ledger = Arc::new(TrackingLedger::open(dir.path()).expect("open ledger"));
    let authoritative = MemoryTierClient::handle(Tier::Authoritative);
    let cold = MemoryTierClient::handle(Tier::Cold);
    let warm = MemoryTierClient::handle(Tier::Warm);
    let hot = MemoryTierClient::handle(Tier::Hot);
    let tiers = TierSet {
        authoritative: authoritative.clone(),
        cold: cold.clone(),
        warm: Some(warm.clone()),
        hot: Some(hot.clone()),
    };
    let store = TieredStore::new(VectorStoreConfig::default(), tiers, ledger);
    Harness {
        store,
        authoritative,
        cold,
        warm,
        hot,
        _dir: dir,
    }
}

fn record(id: &str) -> VectorRecord {
    let mut metadata = HashMap::new();
    metadata.insert("source".to_string(), serde_json::json!("ingest"));
    VectorRecord::new(id, vec![0.25, -0.5, 0.75, 1.0], metadata, None)
}

#[tokio::test]
async fn durable_tiers_hold_copy_before_ack() {
    let h = harness();
    let ack = h.store.store(record("v1")).await.expect("store");

    assert!(ack.tiers_written.contains(&Tier::Authoritative));
    assert!(ack.tiers_written.contains(&Tier::Cold));

    let id = VectorId::from("v1");
    assert!(h
        .authoritative
        .get(&id, None)
        .await
        .expect("get")
        .is_some());
    assert!(h.cold.get(&id, None).await.expect("get").is_some());
}

#[tokio::test]
async fn authoritative_failure_aborts_whole_store() {
    let h = harness();
    h.authoritative.set_fail_puts(true);

    let err = h.store.store(record("v1")).await.unwrap_err();
    assert_eq!(err.code(), "TIER_UNAVAILABLE");

    // No tier copy and no ledger claims were left behind
    let id = VectorId::from("v1");
    assert!(h.cold.get(&id, None).await.expect("get").is_none());
    assert!(h.store.ledger().tier_set(&id, None).expect("tier_set").is_empty());
}

#[tokio::test]
async fn cache_outage_degrades_write_instead_of_failing() {
    let h = harness();
    h.hot.set_fail_puts(true);
    h.warm.set_fail_puts(true);

    let ack = h.store.store(record("v1")).await.expect("store succeeds");
    assert!(!ack.fully_written());
    assert_eq!(ack.degraded_tiers.len(), 2);

    // The vector is still retrievable through the durable tiers
    let rec = h.store.get(&VectorId::from("v1"), None).await.expect("get");
    assert_eq!(rec.id.as_str(), "v1");
}

#[tokio::test]
async fn read_prefers_fastest_tier_and_counts_access() {
    let h = harness();
    h.store.store(record("v1")).await.expect("store");

    let id = VectorId::from("v1");
    for _ in 0..3 {
        h.store.get(&id, None).await.expect("get");
    }

    let hot_entry = h
        .store
        .ledger()
        .entry(&id, None, Tier::Hot)
        .expect("entry")
        .expect("present");
    assert_eq!(hot_entry.access_count, 3);

    // Slower tiers saw no traffic
    let cold_entry = h
        .store
        .ledger()
        .entry(&id, None, Tier::Cold)
        .expect("entry")
        .expect("present");
    assert_eq!(cold_entry.access_count, 0);
}

#[tokio::test]
async fn read_falls_through_outage_to_durable_copy() {
    let h = harness();
    h.store.store(record("v1")).await.expect("store");
    h.hot.set_fail_gets(true);
    h.warm.set_fail_gets(true);
    h.cold.set_fail_gets(true);

    // Every cache and even cold erroring still leaves authoritative
    let rec = h.store.get(&VectorId::from("v1"), None).await.expect("get");
    assert_eq!(rec.id.as_str(), "v1");
}

#[tokio::test]
async fn durable_hit_repopulates_hot_cache() {
    let h = harness();
    h.store.store(record("v1")).await.expect("store");

    let id = VectorId::from("v1");
    // Caches lose the copy out of band
    h.hot.remove_out_of_band(&id, None);
    h.warm.remove_out_of_band(&id, None);
    h.store.ledger().clear_presence(&id, None, Tier::Hot).expect("clear");
    h.store.ledger().clear_presence(&id, None, Tier::Warm).expect("clear");

    h.store.get(&id, None).await.expect("get");

    // The cold hit re-seeded the hot tier
    assert!(h.hot.get(&id, None).await.expect("get").is_some());
}

#[tokio::test]
async fn delete_removes_from_every_claimed_tier() {
    let h = harness();
    h.store.store(record("v1")).await.expect("store");

    let id = VectorId::from("v1");
    h.store.delete(&id, None).await.expect("delete");

    assert!(h.authoritative.get(&id, None).await.expect("get").is_none());
    assert!(h.cold.get(&id, None).await.expect("get").is_none());
    assert!(h.hot.get(&id, None).await.expect("get").is_none());
    assert!(h.store.ledger().tier_set(&id, None).expect("tier_set").is_empty());

    let err = h.store.get(&id, None).await.unwrap_err();
    assert_eq!(err.code(), "VECTOR_NOT_FOUND");
}

#[tokio::test]
async fn partial_delete_reports_survivors_and_is_retryable() {
    let h = harness();
    h.store.store(record("v1")).await.expect("store");
    h.cold.set_fail_deletes(true);

    let id = VectorId::from("v1");
    let err = h.store.delete(&id, None).await.unwrap_err();
    let StoreError::PartialDelete { surviving_tiers, .. } = err else {
        panic!("expected PartialDelete");
    };
    assert_eq!(surviving_tiers, vec![Tier::Cold]);

    // Only the surviving tier still has a ledger claim
    assert_eq!(
        h.store.ledger().tier_set(&id, None).expect("tier_set"),
        vec![Tier::Cold]
    );

    h.cold.set_fail_deletes(false);
    h.store.delete(&id, None).await.expect("retry");
    assert!(h.store.ledger().tier_set(&id, None).expect("tier_set").is_empty());
}

#[tokio::test]
async fn delete_unknown_vector_is_not_found() {
    let h = harness();
    let err = h
        .store
        .delete(&VectorId::from("never-stored"), None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VECTOR_NOT_FOUND");
}

#[tokio::test]
async fn invalid_records_are_rejected_before_any_write() {
    let h = harness();

    let empty_id = VectorRecord::new("", vec![0.1], HashMap::new(), None);
    let err = h.store.store(empty_id).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_RECORD");

    let nan = VectorRecord::new("v1", vec![f32::NAN], HashMap::new(), None);
    let err = h.store.store(nan).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_RECORD");

    assert!(h.authoritative.is_empty());
    assert!(h.cold.is_empty());
}

#[tokio::test]
async fn namespaces_partition_records() {
    let h = harness();
    let mut a = record("v1");
    a.namespace = Some("tenant-a".to_string());
    let mut b = record("v1");
    b.namespace = Some("tenant-b".to_string());
    b.embedding = vec![9.0, 9.0, 9.0, 9.0];

    h.store.store(a).await.expect("store a");
    h.store.store(b).await.expect("store b");

    let id = VectorId::from("v1");
    let got = h.store.get(&id, Some("tenant-b")).await.expect("get");
    assert_eq!(got.embedding, vec![9.0, 9.0, 9.0, 9.0]);
}

#[tokio::test]
async fn same_id_in_two_namespaces_deletes_independently() {
    let h = harness();
    let mut a = record("v1");
    a.namespace = Some("tenant-a".to_string());
    let mut b = record("v1");
    b.namespace = Some("tenant-b".to_string());

    h.store.store(a).await.expect("store a");
    h.store.store(b).await.expect("store b");

    let id = VectorId::from("v1");
    h.store.delete(&id, Some("tenant-a")).await.expect("delete a");

    // tenant-a is gone everywhere, ledger included
    assert!(h
        .authoritative
        .get(&id, Some("tenant-a"))
        .await
        .expect("get")
        .is_none());
    assert!(h
        .store
        .ledger()
        .tier_set(&id, Some("tenant-a"))
        .expect("tier_set")
        .is_empty());

    // tenant-b's copies and tracking survive untouched
    let kept = h.store.get(&id, Some("tenant-b")).await.expect("get b");
    assert_eq!(kept.namespace.as_deref(), Some("tenant-b"));
    assert!(!h
        .store
        .ledger()
        .tier_set(&id, Some("tenant-b"))
        .expect("tier_set")
        .is_empty());

    // And it deletes on its own terms afterwards
    h.store.delete(&id, Some("tenant-b")).await.expect("delete b");
    assert!(h
        .store
        .ledger()
        .tier_set(&id, Some("tenant-b"))
        .expect("tier_set")
        .is_empty());
}

#[tokio::test]
async fn metadata_update_is_authoritative_only_and_versioned() {
    let h = harness();
    h.store.store(record("v1")).await.expect("store");

    let id = VectorId::from("v1");
    let before = h
        .authoritative
        .get(&id, None)
        .await
        .expect("get")
        .expect("present");

    let mut meta = HashMap::new();
    meta.insert("label".to_string(), serde_json::json!("updated"));
    h.store
        .update_metadata(&id, meta.clone(), None)
        .await
        .expect("update");

    let after = h
        .authoritative
        .get(&id, None)
        .await
        .expect("get")
        .expect("present");
    assert_eq!(after.metadata, meta);
    assert!(after.updated_at >= before.updated_at);
    assert_eq!(after.embedding, before.embedding);
}

#[tokio::test]
async fn stats_reflect_ledger_state() {
    let h = harness();
    h.store.store(record("v1")).await.expect("store");
    h.store.store(record("v2")).await.expect("store");
    h.store
        .delete(&VectorId::from("v1"), None)
        .await
        .expect("delete");

    let stats = h.store.stats().expect("stats");
    assert_eq!(stats.authoritative_count, 1);
    assert_eq!(stats.cold_count, 1);
    assert_eq!(stats.distinct_vectors, 1);
}

#[tokio::test]
async fn store_without_cache_tiers_still_works() {
    let dir = TempDir::new().expect("temp dir");
    let ledger = Arc::new(TrackingLedger::open(dir.path()).expect("open ledger"));
    let tiers = TierSet {
        authoritative: MemoryTierClient::handle(Tier::Authoritative),
        cold: MemoryTierClient::handle(Tier::Cold),
        warm: None,
        hot: None,
    };
    let store = TieredStore::new(VectorStoreConfig::default(), tiers, ledger);

    let ack = store.store(record("v1")).await.expect("store");
    assert_eq!(ack.tiers_written, vec![Tier::Authoritative, Tier::Cold]);
    assert!(ack.degraded_tiers.is_empty());

    let rec = store.get(&VectorId::from("v1"), None).await.expect("get");
    assert_eq!(rec.id.as_str(), "v1");
}
