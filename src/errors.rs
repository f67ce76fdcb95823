//! Structured error types for the tiered store
//!
//! Every error carries a machine-readable code so callers can branch on
//! failure class (retryable tier outage vs. permanent not-found vs.
//! partial multi-tier failure) without string matching.

use std::fmt;

use crate::types::Tier;

/// Error taxonomy for store, ledger, and migration operations
#[derive(Debug)]
pub enum StoreError {
    /// Backend unreachable or timed out. Hard failure for durable-tier
    /// writes and all deletes; the caller owns retry policy.
    TierUnavailable { tier: Tier, detail: String },

    /// Vector absent from every tier, including authoritative. Never
    /// retried.
    VectorNotFound(String),

    /// Multi-tier delete where some tiers succeeded and some failed.
    /// `surviving_tiers` still hold the vector and need a targeted retry.
    PartialDelete {
        vector_id: String,
        surviving_tiers: Vec<Tier>,
    },

    /// Reconciliation detected unrepairable divergence, e.g. the
    /// authoritative tier itself missing a ledger-referenced record.
    /// Fatal for that vector; excluded from automatic repair.
    ConsistencyViolation { vector_id: String, detail: String },

    /// Record rejected before any tier write
    InvalidRecord { field: String, reason: String },

    /// Ledger read/write failure (RocksDB or codec)
    Ledger(String),

    /// Generic wrapper for external errors
    Internal(anyhow::Error),
}

impl StoreError {
    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::TierUnavailable { .. } => "TIER_UNAVAILABLE",
            Self::VectorNotFound(_) => "VECTOR_NOT_FOUND",
            Self::PartialDelete { .. } => "PARTIAL_DELETE",
            Self::ConsistencyViolation { .. } => "CONSISTENCY_VIOLATION",
            Self::InvalidRecord { .. } => "INVALID_RECORD",
            Self::Ledger(_) => "LEDGER_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True when a retry of the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TierUnavailable { .. } | Self::PartialDelete { .. }
        )
    }

    /// Detailed error message
    pub fn message(&self) -> String {
        match self {
            Self::TierUnavailable { tier, detail } => {
                format!("Tier '{tier}' unavailable: {detail}")
            }
            Self::VectorNotFound(id) => format!("Vector not found in any tier: {id}"),
            Self::PartialDelete {
                vector_id,
                surviving_tiers,
            } => {
                let tiers: Vec<&str> = surviving_tiers.iter().map(Tier::as_str).collect();
                format!(
                    "Partial delete of {}: still present in [{}]",
                    vector_id,
                    tiers.join(", ")
                )
            }
            Self::ConsistencyViolation { vector_id, detail } => {
                format!("Consistency violation for {vector_id}: {detail}")
            }
            Self::InvalidRecord { field, reason } => {
                format!("Invalid record field '{field}': {reason}")
            }
            Self::Ledger(msg) => format!("Ledger error: {msg}"),
            Self::Internal(err) => format!("Internal error: {err}"),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for StoreError {}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<rocksdb::Error> for StoreError {
    fn from(err: rocksdb::Error) -> Self {
        Self::Ledger(err.to_string())
    }
}

/// Type alias for Results using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;
