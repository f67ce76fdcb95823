//! Tier client capability and role binding
//!
//! The coordinator talks to every backend through the same narrow
//! capability: put/get/delete/exists/list_ids on vector records. Concrete
//! adapters (a Redis hot cache, a wide-column warm cache, a vector-index
//! cold store, a relational metadata store) implement `TierClient`; the
//! store and migration engine never see backend specifics.

use async_trait::async_trait;
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::{Result, StoreError};
use crate::types::{Tier, VectorId, VectorRecord};

/// Uniform capability implemented by every tier backend.
///
/// `get` returning `Ok(None)` means definite absence; backend outages and
/// timeouts surface as `Err(TierUnavailable)` so the read path can tell
/// "not here" from "can't ask".
#[async_trait]
pub trait TierClient: Send + Sync {
    /// Idempotent upsert: re-writing the same record is a no-op in effect
    async fn put(&self, record: &VectorRecord) -> Result<()>;

    /// Fetch a record by id, `None` if absent
    async fn get(&self, id: &VectorId, namespace: Option<&str>) -> Result<Option<VectorRecord>>;

    /// Delete by id; deleting an absent id succeeds
    async fn delete(&self, id: &VectorId, namespace: Option<&str>) -> Result<()>;

    /// Presence probe, used by reconciliation
    async fn exists(&self, id: &VectorId, namespace: Option<&str>) -> Result<bool>;

    /// Every (namespace, id) pair currently held by this tier, used by
    /// reconciliation to discover copies the ledger does not know about
    async fn list_ids(&self) -> Result<Vec<(Option<String>, VectorId)>>;
}

/// Shared, thread-safe handle to a tier backend
pub type TierHandle = Arc<dyn TierClient>;

/// Concrete backends bound to their roles.
///
/// Authoritative and cold are mandatory (they are the durability
/// guarantee); warm and hot are optional cache tiers.
#[derive(Clone)]
pub struct TierSet {
    pub authoritative: TierHandle,
    pub cold: TierHandle,
    pub warm: Option<TierHandle>,
    pub hot: Option<TierHandle>,
}

impl TierSet {
    /// Client bound to `tier`, `None` when the cache tier is disabled
    pub fn client_for(&self, tier: Tier) -> Option<&TierHandle> {
        match tier {
            Tier::Authoritative => Some(&self.authoritative),
            Tier::Cold => Some(&self.cold),
            Tier::Warm => self.warm.as_ref(),
            Tier::Hot => self.hot.as_ref(),
        }
    }

    /// Tiers with a bound client, slowest first
    pub fn enabled_tiers(&self) -> Vec<Tier> {
        Tier::ALL
            .iter()
            .copied()
            .filter(|t| self.client_for(*t).is_some())
            .collect()
    }
}

/// Run one tier-client call under the per-backend timeout, mapping
/// elapsed deadlines to `TierUnavailable`.
pub(crate) async fn call_with_timeout<T, F>(tier: Tier, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::TierUnavailable {
            tier,
            detail: format!("call exceeded {}s timeout", timeout.as_secs()),
        }),
    }
}

/// In-process tier backend over a concurrent map.
///
/// Serves as the embedded backend for single-node deployments and as the
/// test double for the coordinator: `fail_*` toggles simulate backend
/// outages, and `remove_out_of_band` creates ledger/tier divergence for
/// reconciliation to find.
pub struct MemoryTierClient {
    tier: Tier,
    records: DashMap<String, VectorRecord>,
    fail_puts: AtomicBool,
    fail_gets: AtomicBool,
    fail_deletes: AtomicBool,
    latency_ms: AtomicU64,
}

impl MemoryTierClient {
    pub fn new(tier: Tier) -> Self {
        Self {
            tier,
            records: DashMap::new(),
            fail_puts: AtomicBool::new(false),
            fail_gets: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
        }
    }

    pub fn handle(tier: Tier) -> Arc<Self> {
        Arc::new(Self::new(tier))
    }

    fn key(id: &VectorId, namespace: Option<&str>) -> String {
        match namespace {
            Some(ns) => format!("{ns}\u{1f}{id}"),
            None => format!("\u{1f}{id}"),
        }
    }

    fn unavailable(&self, op: &str) -> StoreError {
        StoreError::TierUnavailable {
            tier: self.tier,
            detail: format!("injected {op} failure"),
        }
    }

    /// Simulate a backend that rejects writes
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Simulate a backend that rejects reads
    pub fn set_fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    /// Simulate a backend that rejects deletes
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Simulate a slow backend: every operation sleeps this long first
    pub fn set_latency_ms(&self, ms: u64) {
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    async fn simulate_latency(&self) {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    /// Drop a record directly, bypassing failure injection. Simulates
    /// out-of-band data loss for reconciliation tests.
    pub fn remove_out_of_band(&self, id: &VectorId, namespace: Option<&str>) {
        self.records.remove(&Self::key(id, namespace));
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl TierClient for MemoryTierClient {
    async fn put(&self, record: &VectorRecord) -> Result<()> {
        self.simulate_latency().await;
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(self.unavailable("put"));
        }
        self.records
            .insert(Self::key(&record.id, record.namespace()), record.clone());
        Ok(())
    }

    async fn get(&self, id: &VectorId, namespace: Option<&str>) -> Result<Option<VectorRecord>> {
        self.simulate_latency().await;
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(self.unavailable("get"));
        }
        Ok(self
            .records
            .get(&Self::key(id, namespace))
            .map(|r| r.value().clone()))
    }

    async fn delete(&self, id: &VectorId, namespace: Option<&str>) -> Result<()> {
        self.simulate_latency().await;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(self.unavailable("delete"));
        }
        self.records.remove(&Self::key(id, namespace));
        Ok(())
    }

    async fn exists(&self, id: &VectorId, namespace: Option<&str>) -> Result<bool> {
        self.simulate_latency().await;
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(self.unavailable("exists"));
        }
        Ok(self.records.contains_key(&Self::key(id, namespace)))
    }

    async fn list_ids(&self) -> Result<Vec<(Option<String>, VectorId)>> {
        self.simulate_latency().await;
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(self.unavailable("list_ids"));
        }
        Ok(self
            .records
            .iter()
            .map(|entry| (entry.value().namespace.clone(), entry.value().id.clone()))
            .collect())
    }
}
