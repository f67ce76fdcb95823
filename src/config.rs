//! Configuration for the tiered vector store
//!
//! All configurable parameters in one place with environment variable
//! overrides. Sensible defaults, configurable in production.

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::constants::{
    DEFAULT_COLD_PROMOTE_THRESHOLD, DEFAULT_HOT_TTL_SECONDS, DEFAULT_MAX_CONCURRENT_MIGRATIONS,
    DEFAULT_OPERATION_TIMEOUT_SECS, DEFAULT_RECONCILIATION_WINDOW_HOURS,
    DEFAULT_SWEEP_INTERVAL_SECONDS, DEFAULT_WARM_PROMOTE_THRESHOLD, DEFAULT_WARM_TTL_SECONDS,
};

/// Tiering, migration, and timeout configuration.
///
/// Loaded from environment variables with `VECTIER_` prefixes; every
/// field has a documented default in `constants.rs`.
#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    /// Whether the hot cache tier is enabled
    pub hot_cache_enabled: bool,

    /// Whether the warm cache tier is enabled
    pub warm_cache_enabled: bool,

    /// TTL applied to hot-cache entries at write/promote time
    pub hot_ttl_seconds: u64,

    /// TTL applied to warm-cache entries at write/promote/demote time
    pub warm_ttl_seconds: u64,

    /// Windowed accesses before a cold vector is copied into warm
    pub cold_promote_threshold: u64,

    /// Windowed accesses before a warm vector is copied into hot
    pub warm_promote_threshold: u64,

    /// Trailing window (hours) for access-frequency measurement; also the
    /// counter-reset period
    pub reconciliation_window_hours: u64,

    /// Interval between background migration sweeps
    pub sweep_interval_seconds: u64,

    /// Per-vector migration concurrency inside one sweep
    pub max_concurrent_migrations: usize,

    /// Per-backend timeout for a single tier-client call
    pub operation_timeout_secs: u64,

    /// Directory for the tracking ledger and migration log (RocksDB)
    pub ledger_path: PathBuf,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            hot_cache_enabled: true,
            warm_cache_enabled: true,
            hot_ttl_seconds: DEFAULT_HOT_TTL_SECONDS,
            warm_ttl_seconds: DEFAULT_WARM_TTL_SECONDS,
            cold_promote_threshold: DEFAULT_COLD_PROMOTE_THRESHOLD,
            warm_promote_threshold: DEFAULT_WARM_PROMOTE_THRESHOLD,
            reconciliation_window_hours: DEFAULT_RECONCILIATION_WINDOW_HOURS,
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECONDS,
            max_concurrent_migrations: DEFAULT_MAX_CONCURRENT_MIGRATIONS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
            ledger_path: PathBuf::from("./vectier_ledger"),
        }
    }
}

impl VectorStoreConfig {
    /// Load configuration from environment variables with defaults
    #[allow(clippy::field_reassign_with_default)] // Environment overrides require mutable config
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = env::var("VECTIER_HOT_CACHE_ENABLED") {
            config.hot_cache_enabled = parse_bool(&val);
        }

        if let Ok(val) = env::var("VECTIER_WARM_CACHE_ENABLED") {
            config.warm_cache_enabled = parse_bool(&val);
        }

        if let Ok(val) = env::var("VECTIER_HOT_TTL_SECONDS") {
            if let Ok(n) = val.parse() {
                config.hot_ttl_seconds = n;
            }
        }

        if let Ok(val) = env::var("VECTIER_WARM_TTL_SECONDS") {
            if let Ok(n) = val.parse() {
                config.warm_ttl_seconds = n;
            }
        }

        if let Ok(val) = env::var("VECTIER_COLD_PROMOTE_THRESHOLD") {
            if let Ok(n) = val.parse() {
                config.cold_promote_threshold = n;
            }
        }

        if let Ok(val) = env::var("VECTIER_WARM_PROMOTE_THRESHOLD") {
            if let Ok(n) = val.parse() {
                config.warm_promote_threshold = n;
            }
        }

        if let Ok(val) = env::var("VECTIER_RECONCILIATION_WINDOW_HOURS") {
            if let Ok(n) = val.parse::<u64>() {
                config.reconciliation_window_hours = n.clamp(1, 168);
            }
        }

        if let Ok(val) = env::var("VECTIER_SWEEP_INTERVAL_SECONDS") {
            if let Ok(n) = val.parse::<u64>() {
                config.sweep_interval_seconds = n.max(1);
            }
        }

        if let Ok(val) = env::var("VECTIER_MAX_CONCURRENT_MIGRATIONS") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_concurrent_migrations = n.clamp(1, 128);
            }
        }

        if let Ok(val) = env::var("VECTIER_OPERATION_TIMEOUT_SECS") {
            if let Ok(n) = val.parse::<u64>() {
                config.operation_timeout_secs = n.max(1);
            }
        }

        if let Ok(val) = env::var("VECTIER_LEDGER_PATH") {
            config.ledger_path = PathBuf::from(val);
        }

        config
    }

    /// Per-backend call timeout as a std Duration
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Hot-cache TTL as a chrono Duration
    pub fn hot_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.hot_ttl_seconds as i64)
    }

    /// Warm-cache TTL as a chrono Duration
    pub fn warm_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.warm_ttl_seconds as i64)
    }

    /// Trailing access-frequency window as a chrono Duration
    pub fn reconciliation_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.reconciliation_window_hours as i64)
    }

    /// Interval between sweeps as a std Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    /// Log the current configuration
    pub fn log(&self) {
        info!("Tiered store configuration:");
        info!(
            "   Cache tiers: hot={}, warm={}",
            if self.hot_cache_enabled { "on" } else { "off" },
            if self.warm_cache_enabled { "on" } else { "off" },
        );
        info!(
            "   TTLs: hot={}s, warm={}s",
            self.hot_ttl_seconds, self.warm_ttl_seconds
        );
        info!(
            "   Promotion thresholds: cold={}, warm={} (window: {}h)",
            self.cold_promote_threshold,
            self.warm_promote_threshold,
            self.reconciliation_window_hours
        );
        info!(
            "   Sweep: every {}s, max {} concurrent migrations",
            self.sweep_interval_seconds, self.max_concurrent_migrations
        );
        info!("   Backend timeout: {}s", self.operation_timeout_secs);
        info!("   Ledger path: {:?}", self.ledger_path);
    }
}

fn parse_bool(val: &str) -> bool {
    let val = val.to_lowercase();
    val == "true" || val == "1" || val == "yes"
}
