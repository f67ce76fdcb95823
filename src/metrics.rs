//! Operational metrics with Prometheus
//!
//! Exposes the coordinator's key signals for monitoring and alerting:
//! - Store/get/delete rates and latencies
//! - Degraded cache writes (soft failures on the write path)
//! - Sweep durations, migrations by pass and result
//! - Reconciliation repairs and consistency violations
//!
//! NOTE: vector ids never appear in labels to prevent high-cardinality
//! explosion that can crash Prometheus.

use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
};

lazy_static! {
    /// Global metrics registry
    pub static ref METRICS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Client operation metrics
    // ============================================================================

    /// Store operations
    pub static ref STORE_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("vectier_store_total", "Total vector store operations"),
        &["result"]
    ).unwrap();

    /// Store operation duration
    pub static ref STORE_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "vectier_store_duration_seconds",
            "Vector store operation duration"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0])
    ).unwrap();

    /// Get operations, labelled by the tier that served the hit
    pub static ref GET_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("vectier_get_total", "Total vector get operations"),
        &["tier", "result"]
    ).unwrap();

    /// Get operation duration
    pub static ref GET_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "vectier_get_duration_seconds",
            "Vector get operation duration"
        )
        .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25])
    ).unwrap();

    /// Delete operations
    pub static ref DELETE_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("vectier_delete_total", "Total vector delete operations"),
        &["result"]
    ).unwrap();

    /// Cache-tier writes that soft-failed on the store path
    pub static ref CACHE_WRITE_DEGRADED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "vectier_cache_write_degraded_total",
            "Best-effort cache writes that failed while the durable write succeeded"
        ),
        &["tier"]
    ).unwrap();

    // ============================================================================
    // Migration sweep metrics
    // ============================================================================

    /// Sweep outcomes (completed vs skipped because one was in flight)
    pub static ref SWEEP_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("vectier_sweep_total", "Total migration sweep attempts"),
        &["result"]
    ).unwrap();

    /// Sweep duration
    pub static ref SWEEP_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "vectier_sweep_duration_seconds",
            "Migration sweep duration"
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0])
    ).unwrap();

    /// Per-vector migration attempts by pass and result
    pub static ref MIGRATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("vectier_migrations_total", "Per-vector migration attempts"),
        &["pass", "result"]  // pass: "demotion", "promotion", "reconciliation"
    ).unwrap();

    /// Reconciliation repairs applied
    pub static ref RECONCILIATION_REPAIRS_TOTAL: IntCounter = IntCounter::new(
        "vectier_reconciliation_repairs_total",
        "Ledger/tier divergences repaired"
    ).unwrap();

    /// Unrepairable divergences (authoritative copy missing)
    pub static ref CONSISTENCY_VIOLATIONS_TOTAL: IntCounter = IntCounter::new(
        "vectier_consistency_violations_total",
        "Divergences requiring manual intervention"
    ).unwrap();

    // ============================================================================
    // Ledger metrics (aggregate)
    // ============================================================================

    /// Tracked vectors per tier, refreshed after each sweep
    pub static ref TRACKED_VECTORS_BY_TIER: IntGaugeVec = IntGaugeVec::new(
        Opts::new("vectier_tracked_vectors_by_tier", "Tracked vectors by tier"),
        &["tier"]
    ).unwrap();

    /// Retrieve latency by serving tier
    pub static ref GET_TIER_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "vectier_get_tier_duration_seconds",
            "Per-tier fetch duration on the read path"
        )
        .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1]),
        &["tier"]
    ).unwrap();
}

/// Register all metrics with the global registry
pub fn register_metrics() -> Result<(), prometheus::Error> {
    METRICS_REGISTRY.register(Box::new(STORE_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(STORE_DURATION.clone()))?;
    METRICS_REGISTRY.register(Box::new(GET_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(GET_DURATION.clone()))?;
    METRICS_REGISTRY.register(Box::new(DELETE_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(CACHE_WRITE_DEGRADED_TOTAL.clone()))?;

    METRICS_REGISTRY.register(Box::new(SWEEP_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(SWEEP_DURATION.clone()))?;
    METRICS_REGISTRY.register(Box::new(MIGRATIONS_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(RECONCILIATION_REPAIRS_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(CONSISTENCY_VIOLATIONS_TOTAL.clone()))?;

    METRICS_REGISTRY.register(Box::new(TRACKED_VECTORS_BY_TIER.clone()))?;
    METRICS_REGISTRY.register(Box::new(GET_TIER_DURATION.clone()))?;

    Ok(())
}

/// Helper to time operations with histogram (RAII pattern)
/// Usage: let _timer = Timer::new(SOME_HISTOGRAM.clone());
pub struct Timer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl Timer {
    /// Create timer that records duration to histogram on drop
    pub fn new(histogram: Histogram) -> Self {
        Self {
            histogram,
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}
