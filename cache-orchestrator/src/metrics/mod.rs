//! Prometheus Metrics for the cache orchestrator
//!
//! - Warmup runs (manual, scheduled, prefetch)
//! - Invalidation and cleanup passes
//! - Tier gauges refreshed by the metrics-collection loop
//! - Health tier and active alerts

use lazy_static::lazy_static;
use prometheus::{
    Encoder, GaugeVec, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    TextEncoder, register_gauge_vec, register_histogram_vec, register_int_counter,
    register_int_counter_vec, register_int_gauge, register_int_gauge_vec,
};

use crate::orchestrator::alerts::AlertSeverity;
use crate::orchestrator::health::{CacheMetricsSnapshot, HealthTier};

lazy_static! {
    // ============================================================================
    // Warmup Metrics
    // ============================================================================

    /// Warmup batches by trigger (manual, scheduled, prefetch) and status
    pub static ref WARMUP_RUNS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cache_orchestrator_warmup_runs_total",
        "Total number of warmup batches by trigger and status",
        &["trigger", "status"]
    ).unwrap();

    /// Keys promoted into the local cache
    pub static ref KEYS_WARMED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cache_orchestrator_keys_warmed_total",
        "Total number of keys promoted into the local cache",
        &["trigger"]
    ).unwrap();

    /// Warmup batch latency in seconds
    pub static ref WARMUP_DURATION: HistogramVec = register_histogram_vec!(
        "cache_orchestrator_warmup_duration_seconds",
        "Warmup batch latency in seconds",
        &["trigger"],
        vec![0.001, 0.01, 0.1, 1.0, 10.0, 60.0]
    ).unwrap();

    // ============================================================================
    // Invalidation & Cleanup Metrics
    // ============================================================================

    pub static ref INVALIDATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cache_orchestrator_invalidations_total",
        "Total number of invalidation requests by status",
        &["status"]
    ).unwrap();

    pub static ref KEYS_INVALIDATED_TOTAL: IntCounter = register_int_counter!(
        "cache_orchestrator_keys_invalidated_total",
        "Total number of backing store keys invalidated"
    ).unwrap();

    pub static ref CLEANUP_RUNS_TOTAL: IntCounter = register_int_counter!(
        "cache_orchestrator_cleanup_runs_total",
        "Total number of cleanup passes"
    ).unwrap();

    pub static ref CLEANUP_ITEMS_REMOVED_TOTAL: IntCounter = register_int_counter!(
        "cache_orchestrator_cleanup_items_removed_total",
        "Total number of records removed by cleanup"
    ).unwrap();

    // ============================================================================
    // Tier Gauges
    // ============================================================================

    /// Health tier: 0 healthy, 1 warning, 2 critical
    pub static ref HEALTH_TIER: IntGauge = register_int_gauge!(
        "cache_orchestrator_health_tier",
        "Current health tier (0 healthy, 1 warning, 2 critical)"
    ).unwrap();

    /// Backing store figures (used_memory, hit_rate, avg_response_time_ms, errors)
    pub static ref BACKING_STORE: GaugeVec = register_gauge_vec!(
        "cache_orchestrator_backing_store",
        "Backing store figures by metric",
        &["metric"]
    ).unwrap();

    /// Local cache figures (hit_rate, memory_bytes, entries)
    pub static ref LOCAL_CACHE: GaugeVec = register_gauge_vec!(
        "cache_orchestrator_local_cache",
        "Local cache figures by metric",
        &["metric"]
    ).unwrap();

    pub static ref ACTIVE_SESSIONS: IntGauge = register_int_gauge!(
        "cache_orchestrator_active_sessions",
        "Number of active sessions"
    ).unwrap();

    pub static ref CACHED_CONTENT: IntGauge = register_int_gauge!(
        "cache_orchestrator_cached_content",
        "Number of cached content items"
    ).unwrap();

    pub static ref ACTIVE_ALERTS: IntGaugeVec = register_int_gauge_vec!(
        "cache_orchestrator_active_alerts",
        "Number of unresolved alerts by severity",
        &["severity"]
    ).unwrap();

    pub static ref OPERATION_LOG_SIZE: IntGauge = register_int_gauge!(
        "cache_orchestrator_operation_log_size",
        "Number of records in the operation log"
    ).unwrap();
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Initialize metrics with default values
pub fn init_metrics() {
    // Force registration by touching every metric
    let _ = &*WARMUP_RUNS_TOTAL;
    let _ = &*KEYS_WARMED_TOTAL;
    let _ = &*WARMUP_DURATION;
    let _ = &*INVALIDATIONS_TOTAL;
    let _ = &*KEYS_INVALIDATED_TOTAL;
    let _ = &*CLEANUP_RUNS_TOTAL;
    let _ = &*CLEANUP_ITEMS_REMOVED_TOTAL;
    let _ = &*HEALTH_TIER;
    let _ = &*BACKING_STORE;
    let _ = &*LOCAL_CACHE;
    let _ = &*ACTIVE_SESSIONS;
    let _ = &*CACHED_CONTENT;
    let _ = &*ACTIVE_ALERTS;
    let _ = &*OPERATION_LOG_SIZE;

    tracing::info!("Prometheus metrics initialized (14 metric families registered)");
}

fn status(success: bool) -> &'static str {
    if success { "success" } else { "failure" }
}

/// Record a warmup batch
pub fn record_warmup(trigger: &str, success: bool, keys_warmed: usize, duration_ms: f64) {
    WARMUP_RUNS_TOTAL
        .with_label_values(&[trigger, status(success)])
        .inc();
    KEYS_WARMED_TOTAL
        .with_label_values(&[trigger])
        .inc_by(keys_warmed as u64);
    WARMUP_DURATION
        .with_label_values(&[trigger])
        .observe(duration_ms / 1000.0);
}

/// Record an invalidation request
pub fn record_invalidation(success: bool, keys_invalidated: usize) {
    INVALIDATIONS_TOTAL
        .with_label_values(&[status(success)])
        .inc();
    KEYS_INVALIDATED_TOTAL.inc_by(keys_invalidated as u64);
}

/// Record a cleanup pass
pub fn record_cleanup(items_removed: usize) {
    CLEANUP_RUNS_TOTAL.inc();
    CLEANUP_ITEMS_REMOVED_TOTAL.inc_by(items_removed as u64);
}

pub fn set_health_tier(tier: HealthTier) {
    HEALTH_TIER.set(match tier {
        HealthTier::Healthy => 0,
        HealthTier::Warning => 1,
        HealthTier::Critical => 2,
    });
}

/// Refresh every gauge from a metrics snapshot
pub fn record_snapshot(snapshot: &CacheMetricsSnapshot, operation_log_size: usize) {
    set_health_tier(snapshot.health);

    let backing = &snapshot.backing_store;
    BACKING_STORE
        .with_label_values(&["used_memory"])
        .set(backing.used_memory as f64);
    BACKING_STORE
        .with_label_values(&["hit_rate"])
        .set(backing.hit_rate());
    BACKING_STORE
        .with_label_values(&["avg_response_time_ms"])
        .set(backing.avg_response_time_ms);
    BACKING_STORE
        .with_label_values(&["errors"])
        .set(backing.errors as f64);

    let local = &snapshot.local_cache;
    LOCAL_CACHE
        .with_label_values(&["hit_rate"])
        .set(local.hit_rate);
    LOCAL_CACHE
        .with_label_values(&["memory_bytes"])
        .set(local.memory_usage as f64);
    LOCAL_CACHE
        .with_label_values(&["entries"])
        .set(local.total_size as f64);

    ACTIVE_SESSIONS.set(snapshot.sessions.active_sessions as i64);
    CACHED_CONTENT.set(snapshot.content.cached_content as i64);

    let critical = snapshot
        .active_alerts
        .iter()
        .filter(|a| a.severity == AlertSeverity::Critical)
        .count();
    ACTIVE_ALERTS
        .with_label_values(&["critical"])
        .set(critical as i64);
    ACTIVE_ALERTS
        .with_label_values(&["warning"])
        .set((snapshot.active_alerts.len() - critical) as i64);

    OPERATION_LOG_SIZE.set(operation_log_size as i64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_registered_families() {
        init_metrics();
        record_invalidation(true, 3);
        record_warmup("manual", true, 2, 5.0);

        let text = encode_metrics().unwrap();
        assert!(text.contains("cache_orchestrator_invalidations_total"));
        assert!(text.contains("cache_orchestrator_keys_warmed_total"));
    }
}
