//! Vectier Library
//!
//! Tiered vector-store coordinator. Fans vector writes out across an
//! authoritative metadata store, a durable cold index, and optional
//! warm/hot caches, tracks where every vector lives in a durable ledger,
//! and runs a background migration engine that demotes expired copies,
//! promotes frequently-read ones, and reconciles ledger drift.
//!
//! # Key Properties
//! - Durable writes first: a vector is never acknowledged until the
//!   authoritative and cold tiers both hold it
//! - Cache writes are best-effort and degrade, never fail, the write
//! - Reads serve from the fastest tier holding a copy and fall through
//!   on tier outages
//! - Every migration is recorded in an append-only audit log

pub mod config;
pub mod constants;
pub mod errors;
pub mod ledger;
pub mod metrics;
pub mod migration;
pub mod migration_log;
pub mod store;
pub mod tier;
pub mod tracing_setup;
pub mod types;
pub mod validation;

pub use config::VectorStoreConfig;
pub use errors::{Result, StoreError};
pub use ledger::TrackingLedger;
pub use migration::{MigrationEngine, SweepReport};
pub use migration_log::MigrationLog;
pub use store::TieredStore;
pub use tier::{MemoryTierClient, TierClient, TierHandle, TierSet};
pub use types::{
    MigrationAttempt, MigrationReason, MigrationStatus, StoreAck, StoreStats, Tier, TrackingEntry,
    VectorId, VectorRecord,
};

// Re-export dependencies to ensure tests/benchmarks use the same version
pub use chrono;
pub use parking_lot;
pub use uuid;
