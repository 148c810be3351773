//! Health & Metrics Aggregation
//!
//! Read-side aggregation of the four stat sources into one classified
//! snapshot. Classification order:
//! 1. Critical: backing store unreachable or erroring beyond the bound, or
//!    local hit rate below 50%
//! 2. Healthy: errors within bound, local hit rate at or above threshold,
//!    average response time below threshold
//! 3. Warning: everything else

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::config::AlertThresholds;
use crate::core::{CacheOperation, Result};
use crate::orchestrator::alerts::{Alert, AlertSample};
use crate::orchestrator::warmup::WarmupJob;
use crate::stores::{
    BackingStore, BackingStoreMetrics, ContentStats, ContentStore, LocalCache, LocalCacheStats,
    SessionStats, SessionStore,
};

/// Backing store errors above this count mark the tier critical
pub const BACKING_ERROR_BOUND: u64 = 10;

/// Local hit rate (percent) below which the cache is critical
pub const CRITICAL_HIT_RATE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthTier {
    Healthy,
    Warning,
    Critical,
}

impl HealthTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// Inputs to the classification
#[derive(Debug, Clone, Copy)]
pub struct HealthInputs {
    pub backing_connected: bool,
    pub backing_errors: u64,
    pub local_hit_rate: f64,
    pub avg_response_time_ms: f64,
}

/// Classify inputs into exactly one tier
pub fn classify(inputs: &HealthInputs, thresholds: &AlertThresholds) -> HealthTier {
    let backing_failing =
        !inputs.backing_connected || inputs.backing_errors > BACKING_ERROR_BOUND;

    // NaN compares false everywhere, so treat it as critical explicitly
    if backing_failing
        || inputs.local_hit_rate.is_nan()
        || inputs.local_hit_rate < CRITICAL_HIT_RATE
    {
        return HealthTier::Critical;
    }

    if inputs.backing_errors < BACKING_ERROR_BOUND
        && inputs.local_hit_rate >= thresholds.hit_rate
        && inputs.avg_response_time_ms < thresholds.response_time_ms
    {
        return HealthTier::Healthy;
    }

    HealthTier::Warning
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BackingStoreHealth {
    pub connected: bool,
    pub used_memory: u64,
    pub hit_rate: f64,
    pub avg_response_time_ms: f64,
    pub errors: u64,
    pub error_rate: f64,
}

/// Point-in-time health snapshot; never persisted
#[derive(Debug, Clone, Serialize)]
pub struct CacheHealthStatus {
    pub overall: HealthTier,
    pub backing_store: BackingStoreHealth,
    pub local_cache: LocalCacheStats,
    pub sessions: SessionStats,
    pub content: ContentStats,
    pub checked_at: DateTime<Utc>,
    /// Set when an upstream source failed and the snapshot is zeroed
    pub error: Option<String>,
}

impl CacheHealthStatus {
    /// All-zero snapshot used when a stat source fails
    pub fn error_snapshot(reason: impl Into<String>) -> Self {
        Self {
            overall: HealthTier::Critical,
            backing_store: BackingStoreHealth::default(),
            local_cache: LocalCacheStats::default(),
            sessions: SessionStats::default(),
            content: ContentStats::default(),
            checked_at: Utc::now(),
            error: Some(reason.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Values fed to threshold checks
    pub fn alert_sample(&self, max_memory_bytes: u64) -> AlertSample {
        let memory_usage = if max_memory_bytes == 0 {
            0.0
        } else {
            self.backing_store.used_memory as f64 * 100.0 / max_memory_bytes as f64
        };

        AlertSample {
            hit_rate: self.local_cache.hit_rate,
            response_time_ms: self.backing_store.avg_response_time_ms,
            error_rate: self.backing_store.error_rate,
            memory_usage,
        }
    }
}

/// Observability snapshot; not authoritative state
#[derive(Debug, Clone, Serialize)]
pub struct CacheMetricsSnapshot {
    pub health: HealthTier,
    pub backing_store: BackingStoreMetrics,
    pub local_cache: LocalCacheStats,
    pub sessions: SessionStats,
    pub content: ContentStats,
    pub recent_operations: Vec<CacheOperation>,
    pub active_alerts: Vec<Alert>,
    pub warmup_jobs: Vec<WarmupJob>,
    pub collected_at: DateTime<Utc>,
}

/// Collects the four stat sources
#[derive(Clone)]
pub struct HealthAggregator {
    backing: Arc<dyn BackingStore>,
    local: Arc<dyn LocalCache>,
    sessions: Arc<dyn SessionStore>,
    content: Arc<dyn ContentStore>,
}

impl HealthAggregator {
    pub fn new(
        backing: Arc<dyn BackingStore>,
        local: Arc<dyn LocalCache>,
        sessions: Arc<dyn SessionStore>,
        content: Arc<dyn ContentStore>,
    ) -> Self {
        Self {
            backing,
            local,
            sessions,
            content,
        }
    }

    /// Health snapshot; upstream failures yield the zeroed critical snapshot
    pub async fn health(&self, thresholds: &AlertThresholds) -> CacheHealthStatus {
        match self.try_health(thresholds).await {
            Ok(status) => status,
            Err(e) => {
                warn!("Health aggregation failed: {}", e);
                CacheHealthStatus::error_snapshot(e.to_string())
            }
        }
    }

    async fn try_health(&self, thresholds: &AlertThresholds) -> Result<CacheHealthStatus> {
        let connections = self.backing.get_connection_status().await?;
        let connected = connections.values().any(|c| c.is_connected);

        let metrics = self.backing.get_metrics().await?;
        let local_cache = self.local.get_stats();
        let sessions = self.sessions.get_session_stats().await?;
        let content = self.content.get_content_stats().await?;

        let overall = classify(
            &HealthInputs {
                backing_connected: connected,
                backing_errors: metrics.errors,
                local_hit_rate: local_cache.hit_rate,
                avg_response_time_ms: metrics.avg_response_time_ms,
            },
            thresholds,
        );

        Ok(CacheHealthStatus {
            overall,
            backing_store: BackingStoreHealth {
                connected,
                used_memory: metrics.used_memory,
                hit_rate: metrics.hit_rate(),
                avg_response_time_ms: metrics.avg_response_time_ms,
                errors: metrics.errors,
                error_rate: metrics.error_rate(),
            },
            local_cache,
            sessions,
            content,
            checked_at: Utc::now(),
            error: None,
        })
    }

    /// Raw stat sources, each zeroed independently on failure
    pub async fn stat_sources(
        &self,
    ) -> (BackingStoreMetrics, LocalCacheStats, SessionStats, ContentStats) {
        let backing = self.backing.get_metrics().await.unwrap_or_else(|e| {
            warn!("Backing store metrics unavailable: {}", e);
            BackingStoreMetrics::default()
        });
        let sessions = self.sessions.get_session_stats().await.unwrap_or_default();
        let content = self.content.get_content_stats().await.unwrap_or_default();
        (backing, self.local.get_stats(), sessions, content)
    }
}
