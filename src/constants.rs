//! Documented constants for the tiered vector store
//!
//! All tunable parameters in one place. Centralizing constants prevents
//! magic numbers and makes tuning easier.

// =============================================================================
// CACHE TIER LIFETIMES
// =============================================================================

/// Default TTL for hot-cache entries (1 hour)
///
/// Hot entries are the most ephemeral copies. One hour keeps the hot tier
/// focused on vectors in active use without letting it grow unboundedly.
pub const DEFAULT_HOT_TTL_SECONDS: u64 = 3_600;

/// Default TTL for warm-cache entries (24 hours)
///
/// Warm entries outlive hot ones: a vector demoted out of hot stays
/// reachable at warm latency for a full day before falling back to
/// cold-only.
pub const DEFAULT_WARM_TTL_SECONDS: u64 = 86_400;

// =============================================================================
// PROMOTION THRESHOLDS
// =============================================================================

/// Accesses within the trailing window before a cold vector is copied to warm
pub const DEFAULT_COLD_PROMOTE_THRESHOLD: u64 = 20;

/// Accesses within the trailing window before a warm vector is copied to hot
///
/// Higher than the cold threshold: hot capacity is the scarcest, so only
/// the heaviest hitters earn a hot copy.
pub const DEFAULT_WARM_PROMOTE_THRESHOLD: u64 = 50;

/// Trailing window over which access frequency is measured (24 hours)
pub const DEFAULT_RECONCILIATION_WINDOW_HOURS: u64 = 24;

// =============================================================================
// MIGRATION SWEEP
// =============================================================================

/// Interval between background migration sweeps (5 minutes)
pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 300;

/// Maximum per-vector migrations in flight inside one sweep
///
/// Bounds fan-out against backend connection pools.
pub const DEFAULT_MAX_CONCURRENT_MIGRATIONS: usize = 8;

/// Per-backend timeout for a single tier-client call (10 seconds)
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// VALIDATION LIMITS
// =============================================================================

/// Maximum vector id length in bytes
pub const MAX_ID_LENGTH: usize = 512;

/// Maximum namespace length in bytes
pub const MAX_NAMESPACE_LENGTH: usize = 128;

/// Maximum embedding dimension accepted by the write path
pub const MAX_EMBEDDING_DIM: usize = 4_096;

/// Maximum number of metadata keys per record
pub const MAX_METADATA_KEYS: usize = 64;

/// Maximum metadata key length in bytes
pub const MAX_METADATA_KEY_LENGTH: usize = 128;

/// Maximum serialized size of a single metadata value in bytes
pub const MAX_METADATA_VALUE_BYTES: usize = 4_096;
