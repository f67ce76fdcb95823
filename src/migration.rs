//! Background migration engine: demotion, promotion, reconciliation
//!
//! A periodic sweep runs three passes over the tracking ledger. Demotion
//! walks expired cache entries down the tier chain one step at a time,
//! copy-then-remove so the vector is never unreachable mid-migration.
//! Promotion copies frequently-read entries up a tier and never removes
//! the source. Reconciliation compares the ledger against what the tiers
//! actually hold and repairs divergence in both directions.
//!
//! Sweeps are single-flight: an overlapping trigger is skipped, not
//! queued, so a slow sweep can never stack up behind itself.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::VectorStoreConfig;
use crate::errors::{Result, StoreError};
use crate::ledger::TrackingLedger;
use crate::metrics::{
    Timer, CONSISTENCY_VIOLATIONS_TOTAL, MIGRATIONS_TOTAL, RECONCILIATION_REPAIRS_TOTAL,
    SWEEP_DURATION, SWEEP_TOTAL, TRACKED_VECTORS_BY_TIER,
};
use crate::migration_log::MigrationLog;
use crate::tier::{call_with_timeout, TierHandle, TierSet};
use crate::types::{MigrationAttempt, MigrationReason, Tier, TrackingEntry, VectorId};

/// What one sweep did, returned to the caller and logged as the sweep
/// summary line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub demotions: u64,
    pub promotions: u64,
    pub repairs: u64,
    pub failures: u64,
    pub quarantined: u64,
    pub windows_rolled: u64,
}

pub struct MigrationEngine {
    config: VectorStoreConfig,
    tiers: TierSet,
    ledger: Arc<TrackingLedger>,
    log: Arc<MigrationLog>,
    /// Single-flight guard: `try_lock` failure means a sweep is already
    /// running and the new trigger is dropped.
    sweep_lock: tokio::sync::Mutex<()>,
    /// Vectors whose authoritative copy went missing, keyed by
    /// (namespace, id). Excluded from automatic repair until an operator
    /// intervenes.
    quarantine: RwLock<HashSet<(Option<String>, VectorId)>>,
}

impl MigrationEngine {
    pub fn new(
        config: VectorStoreConfig,
        tiers: TierSet,
        ledger: Arc<TrackingLedger>,
        log: Arc<MigrationLog>,
    ) -> Self {
        Self {
            config,
            tiers,
            ledger,
            log,
            sweep_lock: tokio::sync::Mutex::new(()),
            quarantine: RwLock::new(HashSet::new()),
        }
    }

    /// Client for a tier, honoring the cache enable flags
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

    /// Cache TTL applied when a copy lands in `tier`; durable tiers have
    /// none.
    fn ttl_for(&self, tier: Tier) -> Option<chrono::Duration> {
        match tier {
            Tier::Hot => Some(self.config.hot_ttl()),
            Tier::Warm => Some(self.config.warm_ttl()),
            Tier::Authoritative | Tier::Cold => None,
        }
    }

    /// Append to the audit log; a failed append never aborts a migration
    fn log_attempt(&self, attempt: MigrationAttempt) {
        if let Err(e) = self.log.append(&attempt) {
            warn!(error = %e, "migration log append failed");
        }
    }

    /// Vectors currently excluded from automatic repair
    pub fn quarantined(&self) -> Vec<(Option<String>, VectorId)> {
        let mut vectors: Vec<_> = self.quarantine.read().iter().cloned().collect();
        vectors.sort();
        vectors
    }

    /// Clear a vector from the quarantine set after operator intervention
    pub fn release_quarantine(&self, id: &VectorId, namespace: Option<&str>) -> bool {
        self.quarantine
            .write()
            .remove(&(namespace.map(str::to_string), id.clone()))
    }

    /// Run one full sweep: demotion, promotion, reconciliation, then the
    /// window roll. Returns `None` when another sweep already holds the
    /// lock.
    pub async fn sweep(&self) -> Result<Option<SweepReport>> {
        let Ok(_guard) = self.sweep_lock.try_lock() else {
            debug!("sweep already in flight, skipping this trigger");
            SWEEP_TOTAL.with_label_values(&["skipped"]).inc();
            return Ok(None);
        };

        let _timer = Timer::new(SWEEP_DURATION.clone());
        let mut report = SweepReport::default();

        let outcome: Result<()> = async {
            self.demotion_pass(&mut report).await?;
            self.promotion_pass(&mut report).await?;
            self.reconciliation_pass(&mut report).await?;
            report.windows_rolled = self
                .ledger
                .roll_windows(self.config.reconciliation_window(), Utc::now())?;
            self.refresh_gauges()?;
            Ok(())
        }
        .await;

        match outcome {
            Ok(()) => {
                SWEEP_TOTAL.with_label_values(&["success"]).inc();
                info!(
                    demotions = report.demotions,
                    promotions = report.promotions,
                    repairs = report.repairs,
                    failures = report.failures,
                    quarantined = report.quarantined,
                    windows_rolled = report.windows_rolled,
                    "sweep complete"
                );
                Ok(Some(report))
            }
            Err(e) => {
                SWEEP_TOTAL.with_label_values(&["error"]).inc();
                Err(e)
            }
        }
    }

    /// Periodic sweep loop; stops when `shutdown` flips to true
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.sweep_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so startup isn't a
        // sweep storm when many nodes restart together.
        interval.tick().await;

        info!(
            interval_seconds = self.config.sweep_interval_seconds,
            "migration engine started"
        );
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.sweep().await {
                        error!(error = %e, "sweep failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("migration engine stopping");
                        break;
                    }
                }
            }
        }
    }

    /// Demotion: expired hot entries move to warm, expired warm entries
    /// to cold. The chain never skips a tier; with the warm tier disabled
    /// hot entries stay put rather than jump straight to cold.
    async fn demotion_pass(&self, report: &mut SweepReport) -> Result<()> {
        for source in [Tier::Hot, Tier::Warm] {
            let Some(target) = source.demotes_to() else {
                continue;
            };
            if self.client_for(source).is_none() {
                continue;
            }
            if self.client_for(target).is_none() {
                debug!(
                    source = source.as_str(),
                    target = target.as_str(),
                    "demotion target disabled, leaving expired entries in place"
                );
                continue;
            }

            let expired = self.ledger.expired_entries(source, Utc::now())?;
            if expired.is_empty() {
                continue;
            }
            info!(
                count = expired.len(),
                source = source.as_str(),
                target = target.as_str(),
                "demoting expired entries"
            );

            let ok = AtomicU64::new(0);
            let failed = AtomicU64::new(0);
            stream::iter(expired)
                .for_each_concurrent(Some(self.config.max_concurrent_migrations), |entry| {
                    let ok = &ok;
                    let failed = &failed;
                    async move {
                        match self.demote_one(&entry, source, target).await {
                            Ok(()) => {
                                ok.fetch_add(1, Ordering::Relaxed);
                                MIGRATIONS_TOTAL
                                    .with_label_values(&["demotion", "success"])
                                    .inc();
                                self.log_attempt(MigrationAttempt::success(
                                    entry.vector_id.clone(),
                                    source,
                                    target,
                                    MigrationReason::TtlExpired,
                                ));
                            }
                            Err(e) => {
                                failed.fetch_add(1, Ordering::Relaxed);
                                MIGRATIONS_TOTAL
                                    .with_label_values(&["demotion", "failure"])
                                    .inc();
                                warn!(
                                    vector_id = %entry.vector_id,
                                    source = source.as_str(),
                                    error = %e,
                                    "demotion failed, source copy left in place"
                                );
                                self.log_attempt(MigrationAttempt::failure(
                                    entry.vector_id.clone(),
                                    source,
                                    target,
                                    MigrationReason::TtlExpired,
                                    e.message(),
                                ));
                            }
                        }
                    }
                })
                .await;

            report.demotions += ok.load(Ordering::Relaxed);
            report.failures += failed.load(Ordering::Relaxed);
        }
        Ok(())
    }

    /// Copy one expired entry down a tier, then remove the source copy.
    /// Any failure leaves the source copy and its ledger row intact.
    async fn demote_one(&self, entry: &TrackingEntry, source: Tier, target: Tier) -> Result<()> {
        let id = &entry.vector_id;
        let ns = entry.namespace.as_deref();
        let timeout = self.config.operation_timeout();

        // Both checked by the caller
        let source_client = self
            .client_for(source)
            .ok_or_else(|| StoreError::Ledger(format!("no client for {source}")))?;
        let target_client = self
            .client_for(target)
            .ok_or_else(|| StoreError::Ledger(format!("no client for {target}")))?;

        let record = call_with_timeout(source, timeout, source_client.get(id, ns))
            .await?
            .ok_or_else(|| StoreError::ConsistencyViolation {
                vector_id: id.to_string(),
                detail: format!("ledger claims a {source} copy but the tier has none"),
            })?;

        call_with_timeout(target, timeout, target_client.put(&record)).await?;
        let expiry = self.ttl_for(target).map(|ttl| Utc::now() + ttl);
        self.ledger.upsert_presence(id, ns, target, expiry)?;

        // Target copy is durable and tracked; now the source can go
        call_with_timeout(source, timeout, source_client.delete(id, ns)).await?;
        self.ledger.clear_presence(id, ns, source)?;

        debug!(vector_id = %id, source = source.as_str(), target = target.as_str(), "demoted");
        Ok(())
    }

    /// Promotion: entries read at least `threshold` times within the
    /// current window are copied up one tier. The source copy is never
    /// removed.
    async fn promotion_pass(&self, report: &mut SweepReport) -> Result<()> {
        let window = self.config.reconciliation_window();
        let passes = [
            (Tier::Cold, Tier::Warm, self.config.cold_promote_threshold),
            (Tier::Warm, Tier::Hot, self.config.warm_promote_threshold),
        ];

        for (source, target, threshold) in passes {
            if self.client_for(source).is_none() || self.client_for(target).is_none() {
                continue;
            }

            let now = Utc::now();
            let candidates: Vec<TrackingEntry> = self
                .ledger
                .entries_for_tier(source)?
                .into_iter()
                .filter(|e| e.windowed_accesses(window, now) >= threshold)
                .collect();
            if candidates.is_empty() {
                continue;
            }
            info!(
                count = candidates.len(),
                source = source.as_str(),
                target = target.as_str(),
                threshold,
                "promoting frequently-read entries"
            );

            let ok = AtomicU64::new(0);
            let failed = AtomicU64::new(0);
            stream::iter(candidates)
                .for_each_concurrent(Some(self.config.max_concurrent_migrations), |entry| {
                    let ok = &ok;
                    let failed = &failed;
                    async move {
                        match self.promote_one(&entry, source, target).await {
                            Ok(true) => {
                                ok.fetch_add(1, Ordering::Relaxed);
                                MIGRATIONS_TOTAL
                                    .with_label_values(&["promotion", "success"])
                                    .inc();
                                self.log_attempt(MigrationAttempt::success(
                                    entry.vector_id.clone(),
                                    source,
                                    target,
                                    MigrationReason::PromotedFrequent,
                                ));
                            }
                            Ok(false) => {} // already resident in the target
                            Err(e) => {
                                failed.fetch_add(1, Ordering::Relaxed);
                                MIGRATIONS_TOTAL
                                    .with_label_values(&["promotion", "failure"])
                                    .inc();
                                warn!(
                                    vector_id = %entry.vector_id,
                                    target = target.as_str(),
                                    error = %e,
                                    "promotion failed"
                                );
                                self.log_attempt(MigrationAttempt::failure(
                                    entry.vector_id.clone(),
                                    source,
                                    target,
                                    MigrationReason::PromotedFrequent,
                                    e.message(),
                                ));
                            }
                        }
                    }
                })
                .await;

            report.promotions += ok.load(Ordering::Relaxed);
            report.failures += failed.load(Ordering::Relaxed);
        }
        Ok(())
    }

    /// Copy one hot entry up a tier. Returns `Ok(false)` when the target
    /// already holds the vector.
    async fn promote_one(&self, entry: &TrackingEntry, source: Tier, target: Tier) -> Result<bool> {
        let id = &entry.vector_id;
        let ns = entry.namespace.as_deref();
        if self.ledger.entry(id, ns, target)?.is_some() {
            return Ok(false);
        }

        let timeout = self.config.operation_timeout();
        let source_client = self
            .client_for(source)
            .ok_or_else(|| StoreError::Ledger(format!("no client for {source}")))?;
        let target_client = self
            .client_for(target)
            .ok_or_else(|| StoreError::Ledger(format!("no client for {target}")))?;

        let record = call_with_timeout(source, timeout, source_client.get(id, ns))
            .await?
            .ok_or_else(|| StoreError::ConsistencyViolation {
                vector_id: id.to_string(),
                detail: format!("ledger claims a {source} copy but the tier has none"),
            })?;

        call_with_timeout(target, timeout, target_client.put(&record)).await?;
        let expiry = self.ttl_for(target).map(|ttl| Utc::now() + ttl);
        self.ledger.upsert_presence(id, ns, target, expiry)?;

        debug!(vector_id = %id, source = source.as_str(), target = target.as_str(), "promoted");
        Ok(true)
    }

    /// Reconciliation: repair divergence between the ledger and the
    /// tiers, both directions.
    ///
    /// Ledger-claims-but-tier-lacks is repaired by re-copying from the
    /// authoritative tier, except when the authoritative copy itself is
    /// missing: that vector is quarantined and surfaced, never silently
    /// dropped. Tier-holds-but-ledger-lacks gets a fresh tracking row so
    /// the copy re-enters TTL and frequency accounting.
    async fn reconciliation_pass(&self, report: &mut SweepReport) -> Result<()> {
        let repairs = AtomicU64::new(0);
        let failures = AtomicU64::new(0);
        let quarantined = AtomicU64::new(0);
        let timeout = self.config.operation_timeout();

        let vectors = self.ledger.all_vectors()?;
        stream::iter(vectors)
            .for_each_concurrent(Some(self.config.max_concurrent_migrations), |(ns, id)| {
                let repairs = &repairs;
                let failures = &failures;
                let quarantined = &quarantined;
                async move {
                    if self.quarantine.read().contains(&(ns.clone(), id.clone())) {
                        return;
                    }
                    if let Err(e) = self
                        .reconcile_vector(&id, ns.as_deref(), repairs, failures, quarantined)
                        .await
                    {
                        failures.fetch_add(1, Ordering::Relaxed);
                        warn!(vector_id = %id, error = %e, "reconciliation errored for vector");
                    }
                }
            })
            .await;

        // Reverse direction: copies the ledger does not know about
        for tier in Tier::ALL {
            let Some(client) = self.client_for(tier) else {
                continue;
            };
            let held = match call_with_timeout(tier, timeout, client.list_ids()).await {
                Ok(held) => held,
                Err(e) => {
                    warn!(tier = tier.as_str(), error = %e, "tier listing failed, skipping orphan scan");
                    continue;
                }
            };
            for (ns, id) in held {
                if self.ledger.entry(&id, ns.as_deref(), tier)?.is_some() {
                    continue;
                }
                let expiry = self.ttl_for(tier).map(|ttl| Utc::now() + ttl);
                self.ledger
                    .upsert_presence(&id, ns.as_deref(), tier, expiry)?;
                RECONCILIATION_REPAIRS_TOTAL.inc();
                MIGRATIONS_TOTAL
                    .with_label_values(&["reconciliation", "success"])
                    .inc();
                self.log_attempt(MigrationAttempt::success(
                    id.clone(),
                    tier,
                    tier,
                    MigrationReason::ReconciliationRepair,
                ));
                info!(
                    vector_id = %id,
                    tier = tier.as_str(),
                    "adopted untracked tier copy into the ledger"
                );
                repairs.fetch_add(1, Ordering::Relaxed);
            }
        }

        report.repairs += repairs.load(Ordering::Relaxed);
        report.failures += failures.load(Ordering::Relaxed);
        report.quarantined += quarantined.load(Ordering::Relaxed);
        Ok(())
    }

    /// Check every tier the ledger claims holds `id` and restore missing
    /// copies from the authoritative tier.
    async fn reconcile_vector(
        &self,
        id: &VectorId,
        ns: Option<&str>,
        repairs: &AtomicU64,
        failures: &AtomicU64,
        quarantined: &AtomicU64,
    ) -> Result<()> {
        let timeout = self.config.operation_timeout();

        for tier in self.ledger.tier_set(id, ns)? {
            let Some(client) = self.client_for(tier) else {
                // Cache tier disabled since the row was written; the copy
                // is unreachable, so the stale claim is dropped.
                debug!(vector_id = %id, tier = tier.as_str(), "dropping claim on disabled tier");
                self.ledger.clear_presence(id, ns, tier)?;
                continue;
            };

            let present = match call_with_timeout(tier, timeout, client.exists(id, ns)).await {
                Ok(present) => present,
                Err(e) => {
                    // Down is not missing; never "repair" against an
                    // unavailable backend.
                    warn!(
                        vector_id = %id,
                        tier = tier.as_str(),
                        error = %e,
                        "presence probe failed, skipping"
                    );
                    continue;
                }
            };
            if present {
                continue;
            }

            if tier == Tier::Authoritative {
                // The source of truth is gone; nothing to restore from.
                error!(
                    vector_id = %id,
                    "authoritative copy missing, quarantining vector"
                );
                CONSISTENCY_VIOLATIONS_TOTAL.inc();
                MIGRATIONS_TOTAL
                    .with_label_values(&["reconciliation", "failure"])
                    .inc();
                self.log_attempt(MigrationAttempt::failure(
                    id.clone(),
                    Tier::Authoritative,
                    Tier::Authoritative,
                    MigrationReason::ReconciliationRepair,
                    "authoritative copy missing",
                ));
                self.quarantine
                    .write()
                    .insert((ns.map(str::to_string), id.clone()));
                quarantined.fetch_add(1, Ordering::Relaxed);
                failures.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }

            match self.repair_tier_copy(id, ns, tier).await {
                Ok(()) => {
                    repairs.fetch_add(1, Ordering::Relaxed);
                    RECONCILIATION_REPAIRS_TOTAL.inc();
                    MIGRATIONS_TOTAL
                        .with_label_values(&["reconciliation", "success"])
                        .inc();
                    self.log_attempt(MigrationAttempt::success(
                        id.clone(),
                        Tier::Authoritative,
                        tier,
                        MigrationReason::ReconciliationRepair,
                    ));
                    info!(vector_id = %id, tier = tier.as_str(), "restored missing tier copy");
                }
                Err(e) => {
                    failures.fetch_add(1, Ordering::Relaxed);
                    MIGRATIONS_TOTAL
                        .with_label_values(&["reconciliation", "failure"])
                        .inc();
                    self.log_attempt(MigrationAttempt::failure(
                        id.clone(),
                        Tier::Authoritative,
                        tier,
                        MigrationReason::ReconciliationRepair,
                        e.message(),
                    ));
                    warn!(vector_id = %id, tier = tier.as_str(), error = %e, "repair failed");
                }
            }
        }
        Ok(())
    }

    /// Re-copy a vector from the authoritative tier into `tier`
    async fn repair_tier_copy(&self, id: &VectorId, ns: Option<&str>, tier: Tier) -> Result<()> {
        let timeout = self.config.operation_timeout();
        let client = self
            .client_for(tier)
            .ok_or_else(|| StoreError::Ledger(format!("no client for {tier}")))?;

        let record = call_with_timeout(
            Tier::Authoritative,
            timeout,
            self.tiers.authoritative.get(id, ns),
        )
        .await?
        .ok_or_else(|| StoreError::ConsistencyViolation {
            vector_id: id.to_string(),
            detail: "authoritative copy missing during repair".to_string(),
        })?;

        call_with_timeout(tier, timeout, client.put(&record)).await?;
        let expiry = self.ttl_for(tier).map(|ttl| Utc::now() + ttl);
        self.ledger.upsert_presence(id, ns, tier, expiry)?;
        Ok(())
    }

    fn refresh_gauges(&self) -> Result<()> {
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
        Ok(())
    }
}
