//! Core data model: tiers, vector records, tracking entries, migration attempts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// One storage layer in the hierarchy, ordered slowest/most-durable to
/// fastest/most-ephemeral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    /// Metadata source of truth; never expires
    Authoritative,
    /// Durable vector index; never expires
    Cold,
    /// Mid-latency cache; entries carry a TTL
    Warm,
    /// Lowest-latency cache; entries carry the shortest TTL
    Hot,
}

impl Tier {
    /// Stable name used in ledger keys, metrics labels, and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Authoritative => "authoritative",
            Tier::Cold => "cold",
            Tier::Warm => "warm",
            Tier::Hot => "hot",
        }
    }

    /// True for tiers whose copies may expire and be evicted
    pub fn is_cache(&self) -> bool {
        matches!(self, Tier::Warm | Tier::Hot)
    }

    /// True for tiers that hold a permanent copy
    pub fn is_durable(&self) -> bool {
        !self.is_cache()
    }

    /// Read-path probe order: fastest available copy first
    pub const READ_ORDER: [Tier; 4] = [Tier::Hot, Tier::Warm, Tier::Cold, Tier::Authoritative];

    /// All tiers, slowest first
    pub const ALL: [Tier; 4] = [Tier::Authoritative, Tier::Cold, Tier::Warm, Tier::Hot];

    /// Demotion target: the next slower tier. Cold and authoritative
    /// copies are never demoted.
    pub fn demotes_to(&self) -> Option<Tier> {
        match self {
            Tier::Hot => Some(Tier::Warm),
            Tier::Warm => Some(Tier::Cold),
            Tier::Cold | Tier::Authoritative => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vector identifier, globally unique within a namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VectorId(pub String);

impl VectorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VectorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for VectorId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A vector embedding with its metadata.
///
/// Immutable once written except for metadata updates, which bump
/// `updated_at`. The embedding itself is never rewritten, only copied
/// between tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: VectorId,
    pub embedding: Vec<f32>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub namespace: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VectorRecord {
    pub fn new(
        id: impl Into<VectorId>,
        embedding: Vec<f32>,
        metadata: HashMap<String, serde_json::Value>,
        namespace: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            embedding,
            metadata,
            namespace,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

/// Per-(vector, tier) presence and access statistics in the ledger.
///
/// Invariant: at most one entry per (vector_id, tier) pair. A tracked
/// vector has exactly one authoritative entry and zero or more cache
/// entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEntry {
    pub vector_id: VectorId,
    /// Partition the vector was written under; needed to address tier
    /// backends during migration
    pub namespace: Option<String>,
    pub tier: Tier,
    /// None for authoritative/cold: durable copies never expire
    pub expires_at: Option<DateTime<Utc>>,
    /// Accesses since `window_started_at`; rolled by the sweep finalizer
    pub access_count: u64,
    pub last_accessed_at: Option<DateTime<Utc>>,
    /// Start of the current access-frequency window
    pub window_started_at: DateTime<Utc>,
}

impl TrackingEntry {
    pub fn new(
        vector_id: VectorId,
        namespace: Option<String>,
        tier: Tier,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            vector_id,
            namespace,
            tier,
            expires_at,
            access_count: 0,
            last_accessed_at: None,
            window_started_at: Utc::now(),
        }
    }

    /// True once the tier copy is past its TTL
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|t| t < now).unwrap_or(false)
    }

    /// Accesses attributable to the current trailing window.
    ///
    /// An entry whose window started before `now - window` contributes
    /// nothing: its counter is stale and will be reset by the next roll.
    pub fn windowed_accesses(&self, window: chrono::Duration, now: DateTime<Utc>) -> u64 {
        if now - self.window_started_at <= window {
            self.access_count
        } else {
            0
        }
    }
}

/// Why a migration was attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationReason {
    /// Cache entry passed its TTL and was demoted a tier
    TtlExpired,
    /// Access frequency crossed a promotion threshold
    PromotedFrequent,
    /// Reconciliation repaired a ledger/tier divergence
    ReconciliationRepair,
}

impl MigrationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationReason::TtlExpired => "ttl_expired",
            MigrationReason::PromotedFrequent => "promoted_frequent",
            MigrationReason::ReconciliationRepair => "reconciliation_repair",
        }
    }
}

/// Outcome of a migration attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationStatus {
    Success,
    Failure,
}

impl MigrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStatus::Success => "success",
            MigrationStatus::Failure => "failure",
        }
    }
}

/// Append-only audit record of one migration or reconciliation attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationAttempt {
    pub id: Uuid,
    pub vector_id: VectorId,
    pub source_tier: Tier,
    pub target_tier: Tier,
    pub reason: MigrationReason,
    pub status: MigrationStatus,
    pub error_detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl MigrationAttempt {
    pub fn success(
        vector_id: VectorId,
        source_tier: Tier,
        target_tier: Tier,
        reason: MigrationReason,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            vector_id,
            source_tier,
            target_tier,
            reason,
            status: MigrationStatus::Success,
            error_detail: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(
        vector_id: VectorId,
        source_tier: Tier,
        target_tier: Tier,
        reason: MigrationReason,
        error_detail: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            vector_id,
            source_tier,
            target_tier,
            reason,
            status: MigrationStatus::Failure,
            error_detail: Some(error_detail.into()),
            timestamp: Utc::now(),
        }
    }
}

/// Acknowledgement returned by the write path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreAck {
    pub vector_id: VectorId,
    /// Tiers whose write succeeded, slowest first
    pub tiers_written: Vec<Tier>,
    /// Enabled cache tiers whose write failed (soft failure)
    pub degraded_tiers: Vec<Tier>,
}

impl StoreAck {
    /// True when every enabled tier accepted the write
    pub fn fully_written(&self) -> bool {
        self.degraded_tiers.is_empty()
    }
}

/// Per-tier tracked-vector counts, read from the ledger
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub authoritative_count: u64,
    pub cold_count: u64,
    pub warm_count: u64,
    pub hot_count: u64,
    pub distinct_vectors: u64,
}
