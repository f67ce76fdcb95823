//! Tiered store: the client-facing write and read path
//!
//! `store()` fans a vector out to its tiers with a durable/best-effort
//! split: the authoritative and cold writes are the durability guarantee
//! and must both succeed; warm/hot writes are best-effort and degrade to
//! a logged soft failure. `get()` serves from the fastest tier the ledger
//! claims holds the vector, falling through on tier *errors* so an outage
//! degrades latency, never correctness.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::VectorStoreConfig;
use crate::errors::{Result, StoreError};
use crate::ledger::TrackingLedger;
use crate::metrics::{
    Timer, CACHE_WRITE_DEGRADED_TOTAL, DELETE_TOTAL, GET_DURATION, GET_TIER_DURATION, GET_TOTAL,
    STORE_DURATION, STORE_TOTAL, TRACKED_VECTORS_BY_TIER,
};
use crate::tier::{call_with_timeout, TierHandle, TierSet};
use crate::types::{StoreAck, StoreStats, Tier, VectorId, VectorRecord};
use crate::validation::{validate_metadata, validate_record};

pub struct TieredStore {
    config: VectorStoreConfig,
    tiers: TierSet,
    ledger: Arc<TrackingLedger>,
}

impl TieredStore {
    pub fn new(config: VectorStoreConfig, tiers: TierSet, ledger: Arc<TrackingLedger>) -> Self {
        Self {
            config,
            tiers,
            ledger,
        }
    }

    pub fn ledger(&self) -> &Arc<TrackingLedger> {
        &self.ledger
    }

    /// Client for a tier, honoring the cache enable flags. Durable tiers
    /// are always reachable; a disabled cache tier yields `None` even if
    /// a backend is bound.
    fn client_for(&self, tier: Tier) -> Option<&TierHandle> {
        let enabled = match tier {
            Tier::Hot => self.config.hot_cache_enabled,
            Tier::Warm => self.config.warm_cache_enabled,
            Tier::Authoritative | Tier::Cold => true,
        };
        if !enabled {
            return None;
        }
        self.tiers.client_for(tier)
    }

    /// Write a vector to all its tiers.
    ///
    /// Authoritative and cold writes are mandatory; a failure in either
    /// aborts the call and nothing is marked present in the ledger.
    /// Cache writes are best-effort: a failure there is logged, counted,
    /// and reported in the ack's `degraded_tiers` — callers must not
    /// assume cache-tier presence synchronously.
    pub async fn store(&self, record: VectorRecord) -> Result<StoreAck> {
        let _timer = Timer::new(STORE_DURATION.clone());
        match self.store_inner(record).await {
            Ok(ack) => {
                STORE_TOTAL.with_label_values(&["success"]).inc();
                Ok(ack)
            }
            Err(e) => {
                STORE_TOTAL.with_label_values(&["error"]).inc();
                Err(e)
            }
        }
    }

    async fn store_inner(&self, record: VectorRecord) -> Result<StoreAck> {
        validate_record(&record)?;
        let timeout = self.config.operation_timeout();

        // Durable writes first; both must succeed before the ledger
        // learns anything.
        call_with_timeout(
            Tier::Authoritative,
            timeout,
            self.tiers.authoritative.put(&record),
        )
        .await?;
        call_with_timeout(Tier::Cold, timeout, self.tiers.cold.put(&record)).await?;

        self.ledger
            .upsert_presence(&record.id, record.namespace(), Tier::Authoritative, None)?;
        self.ledger.upsert_presence(&record.id, record.namespace(), Tier::Cold, None)?;

        let mut tiers_written = vec![Tier::Authoritative, Tier::Cold];
        let mut degraded_tiers = Vec::new();

        for (tier, ttl) in [
            (Tier::Warm, self.config.warm_ttl()),
            (Tier::Hot, self.config.hot_ttl()),
        ] {
            let Some(client) = self.client_for(tier) else {
                continue;
            };
            match call_with_timeout(tier, timeout, client.put(&record)).await {
                Ok(()) => {
                    self.ledger
                        .upsert_presence(&record.id, record.namespace(), tier, Some(Utc::now() + ttl))?;
                    tiers_written.push(tier);
                }
                Err(e) => {
                    // Soft failure: the durable copies exist, the cache
                    // copy will arrive via promotion or repopulation.
                    warn!(
                        vector_id = %record.id,
                        tier = tier.as_str(),
                        error = %e,
                        "cache write degraded"
                    );
                    CACHE_WRITE_DEGRADED_TOTAL
                        .with_label_values(&[tier.as_str()])
                        .inc();
                    degraded_tiers.push(tier);
                }
            }
        }

        debug!(
            vector_id = %record.id,
            tiers = ?tiers_written,
            degraded = ?degraded_tiers,
            "vector stored"
        );

        Ok(StoreAck {
            vector_id: record.id,
            tiers_written,
            degraded_tiers,
        })
    }

    /// Fetch a vector from the fastest tier currently holding it.
    ///
    /// Probes hot, warm, cold, then authoritative, skipping tiers the
    /// ledger does not claim (durable tiers are always probed as the
    /// backstop). A tier *error* falls through to the next slower tier;
    /// only absence from every tier is `VectorNotFound`.
    pub async fn get(&self, id: &VectorId, namespace: Option<&str>) -> Result<VectorRecord> {
        let _timer = Timer::new(GET_DURATION.clone());
        let claimed = self.ledger.tier_set(id, namespace)?;
        let timeout = self.config.operation_timeout();

        for tier in Tier::READ_ORDER {
            if !claimed.contains(&tier) && !tier.is_durable() {
                continue;
            }
            let Some(client) = self.client_for(tier) else {
                continue;
            };
            let fetched = {
                let _tier_timer =
                    Timer::new(GET_TIER_DURATION.with_label_values(&[tier.as_str()]));
                call_with_timeout(tier, timeout, client.get(id, namespace)).await
            };
            match fetched {
                Ok(Some(record)) => {
                    self.ledger.record_access(id, namespace, tier)?;
                    GET_TOTAL
                        .with_label_values(&[tier.as_str(), "hit"])
                        .inc();
                    if tier.is_durable() {
                        self.repopulate_cache(&record).await;
                    }
                    return Ok(record);
                }
                Ok(None) => continue,
                Err(e) => {
                    warn!(
                        vector_id = %id,
                        tier = tier.as_str(),
                        error = %e,
                        "tier fetch failed, falling through to slower tier"
                    );
                    continue;
                }
            }
        }

        GET_TOTAL.with_label_values(&["none", "miss"]).inc();
        Err(StoreError::VectorNotFound(id.to_string()))
    }

    /// Lazily re-seed the fastest enabled cache tier after a durable-tier
    /// hit. Best-effort: failures are logged and left to the next sweep.
    async fn repopulate_cache(&self, record: &VectorRecord) {
        let (tier, ttl) = if self.client_for(Tier::Hot).is_some() {
            (Tier::Hot, self.config.hot_ttl())
        } else if self.client_for(Tier::Warm).is_some() {
            (Tier::Warm, self.config.warm_ttl())
        } else {
            return;
        };
        // client_for just returned Some for this tier
        let Some(client) = self.client_for(tier) else {
            return;
        };
        let timeout = self.config.operation_timeout();
        match call_with_timeout(tier, timeout, client.put(record)).await {
            Ok(()) => {
                if let Err(e) =
                    self.ledger
                        .upsert_presence(&record.id, record.namespace(), tier, Some(Utc::now() + ttl))
                {
                    warn!(vector_id = %record.id, error = %e, "ledger update after repopulation failed");
                }
                debug!(vector_id = %record.id, tier = tier.as_str(), "cache repopulated on durable hit");
            }
            Err(e) => {
                debug!(vector_id = %record.id, tier = tier.as_str(), error = %e, "cache repopulation failed");
            }
        }
    }

    /// Delete a vector from every tier the ledger claims holds it.
    ///
    /// Tier failures are collected, not short-circuited; the ledger row
    /// for a tier is cleared only after that tier's delete succeeds. Any
    /// failure surfaces as `PartialDelete` naming the surviving tiers so
    /// the caller can retry just those.
    pub async fn delete(&self, id: &VectorId, namespace: Option<&str>) -> Result<()> {
        let claimed = self.ledger.tier_set(id, namespace)?;
        if claimed.is_empty() {
            DELETE_TOTAL.with_label_values(&["not_found"]).inc();
            return Err(StoreError::VectorNotFound(id.to_string()));
        }

        let timeout = self.config.operation_timeout();
        let mut surviving = Vec::new();

        for tier in claimed {
            let Some(client) = self.tiers.client_for(tier) else {
                // Tier disabled since the entry was written; nothing is
                // reachable there, so the stale row is dropped.
                warn!(
                    vector_id = %id,
                    tier = tier.as_str(),
                    "clearing ledger row for unbound tier"
                );
                self.ledger.clear_presence(id, namespace, tier)?;
                continue;
            };
            match call_with_timeout(tier, timeout, client.delete(id, namespace)).await {
                Ok(()) => {
                    self.ledger.clear_presence(id, namespace, tier)?;
                }
                Err(e) => {
                    warn!(
                        vector_id = %id,
                        tier = tier.as_str(),
                        error = %e,
                        "tier delete failed"
                    );
                    surviving.push(tier);
                }
            }
        }

        if surviving.is_empty() {
            DELETE_TOTAL.with_label_values(&["success"]).inc();
            Ok(())
        } else {
            DELETE_TOTAL.with_label_values(&["partial"]).inc();
            Err(StoreError::PartialDelete {
                vector_id: id.to_string(),
                surviving_tiers: surviving,
            })
        }
    }

    /// Replace a vector's metadata against the authoritative tier only.
    ///
    /// Cache copies are not touched here; they are corrected by
    /// reconciliation or refreshed on the next promotion.
    pub async fn update_metadata(
        &self,
        id: &VectorId,
        metadata: HashMap<String, serde_json::Value>,
        namespace: Option<&str>,
    ) -> Result<()> {
        validate_metadata(&metadata)?;
        let timeout = self.config.operation_timeout();

        let mut record = call_with_timeout(
            Tier::Authoritative,
            timeout,
            self.tiers.authoritative.get(id, namespace),
        )
        .await?
        .ok_or_else(|| StoreError::VectorNotFound(id.to_string()))?;

        record.metadata = metadata;
        record.updated_at = Utc::now();

        call_with_timeout(
            Tier::Authoritative,
            timeout,
            self.tiers.authoritative.put(&record),
        )
        .await?;

        debug!(vector_id = %id, "metadata updated on authoritative tier");
        Ok(())
    }

    /// Tracked-vector counts from the ledger, also pushed to the per-tier
    /// gauges.
    pub fn stats(&self) -> Result<StoreStats> {
        let stats = self.ledger.tier_counts()?;
        TRACKED_VECTORS_BY_TIER
            .with_label_values(&["authoritative"])
            .set(stats.authoritative_count as i64);
        TRACKED_VECTORS_BY_TIER
            .with_label_values(&["cold"])
            .set(stats.cold_count as i64);
        TRACKED_VECTORS_BY_TIER
            .with_label_values(&["warm"])
            .set(stats.warm_count as i64);
        TRACKED_VECTORS_BY_TIER
            .with_label_values(&["hot"])
            .set(stats.hot_count as i64);
        Ok(stats)
    }

    /// Flush ledger state; call during graceful shutdown
    pub fn shutdown(&self) -> Result<()> {
        info!("flushing tracking ledger");
        self.ledger.flush()
    }
}
