//! Cleanup Engine
//!
//! Three independent passes, none transactional:
//! 1. operation log: drop records older than the retention window, then
//!    cap the log at `max_size`
//! 2. alerts: purge resolved alerts older than `max_age`
//! 3. strategy hooks: run the cleanup hook registered per strategy

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::core::{CacheOperation, OperationLog, OperationType, Result};
use crate::orchestrator::alerts::AlertManager;
use crate::orchestrator::strategy::CacheStrategy;

/// Advisory size of one operation record
pub const OPERATION_RECORD_BYTES: u64 = 256;
/// Advisory size of one alert
pub const ALERT_RECORD_BYTES: u64 = 512;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupResult {
    pub items_removed: usize,
    /// Estimated bytes released; advisory only
    pub space_freed: u64,
}

impl CleanupResult {
    fn absorb(&mut self, other: CleanupResult) {
        self.items_removed += other.items_removed;
        self.space_freed += other.space_freed;
    }
}

/// Per-strategy cleanup extension point
#[async_trait]
pub trait CleanupHook: Send + Sync {
    async fn cleanup(&self, strategy: &CacheStrategy, now: DateTime<Utc>) -> Result<CleanupResult>;
}

#[derive(Debug, Clone, Copy)]
pub struct CleanupPolicy {
    pub retention: Duration,
    pub alert_max_age: Duration,
    pub max_size: usize,
}

pub struct CleanupEngine {
    oplog: OperationLog,
    alerts: Arc<AlertManager>,
    policy: CleanupPolicy,
    hooks: RwLock<BTreeMap<String, Arc<dyn CleanupHook>>>,
}

impl CleanupEngine {
    pub fn new(oplog: OperationLog, alerts: Arc<AlertManager>, policy: CleanupPolicy) -> Self {
        Self {
            oplog,
            alerts,
            policy,
            hooks: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register the hook for a strategy, replacing any previous one
    pub fn register_hook(&self, strategy: impl Into<String>, hook: Arc<dyn CleanupHook>) {
        let strategy = strategy.into();
        debug!("Registered cleanup hook for strategy {}", strategy);
        self.hooks.write().insert(strategy, hook);
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.read().len()
    }

    /// Run every pass as of `now`. `strategies` resolves hook names to their
    /// current strategy; hooks whose strategy is gone are skipped.
    pub async fn run_at(
        &self,
        now: DateTime<Utc>,
        strategies: impl Fn(&str) -> Option<CacheStrategy>,
    ) -> CleanupResult {
        let started = Instant::now();
        let mut result = CleanupResult::default();

        // Operation log
        let retention =
            chrono::Duration::from_std(self.policy.retention).unwrap_or(chrono::Duration::MAX);
        let expired = now
            .checked_sub_signed(retention)
            .map_or(0, |cutoff| self.oplog.retain_newer_than(cutoff));
        let overflow = self.oplog.truncate_oldest(self.policy.max_size);
        let ops_removed = expired + overflow;
        result.absorb(CleanupResult {
            items_removed: ops_removed,
            space_freed: ops_removed as u64 * OPERATION_RECORD_BYTES,
        });

        // Alerts
        let alerts_removed = self.alerts.purge_resolved(now, self.policy.alert_max_age);
        result.absorb(CleanupResult {
            items_removed: alerts_removed,
            space_freed: alerts_removed as u64 * ALERT_RECORD_BYTES,
        });

        // Strategy hooks; clone out so no lock is held across the awaits
        let hooks: Vec<(String, Arc<dyn CleanupHook>)> = self
            .hooks
            .read()
            .iter()
            .map(|(name, hook)| (name.clone(), hook.clone()))
            .collect();

        for (name, hook) in hooks {
            let Some(strategy) = strategies(&name) else {
                debug!("Skipping cleanup hook for unknown strategy {}", name);
                continue;
            };
            match hook.cleanup(&strategy, now).await {
                Ok(hook_result) => result.absorb(hook_result),
                Err(e) => warn!("Cleanup hook for {} failed: {}", name, e),
            }
        }

        self.oplog.record(
            CacheOperation::new(OperationType::Cleanup)
                .with_duration(started.elapsed())
                .with_size(result.items_removed)
                .at(now),
        );

        info!(
            "Cleanup removed {} items (~{} bytes)",
            result.items_removed, result.space_freed
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::OrchestratorError;
    use crate::orchestrator::alerts::{AlertCheck, AlertSeverity};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const HOUR: Duration = Duration::from_secs(3600);

    fn engine(max_size: usize) -> (OperationLog, Arc<AlertManager>, CleanupEngine) {
        let oplog = OperationLog::new();
        let alerts = Arc::new(AlertManager::new());
        let engine = CleanupEngine::new(
            oplog.clone(),
            alerts.clone(),
            CleanupPolicy {
                retention: HOUR,
                alert_max_age: 24 * HOUR,
                max_size,
            },
        );
        (oplog, alerts, engine)
    }

    fn no_strategies(_: &str) -> Option<CacheStrategy> {
        None
    }

    struct CountingHook {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl CleanupHook for CountingHook {
        async fn cleanup(&self, _: &CacheStrategy, _: DateTime<Utc>) -> Result<CleanupResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(OrchestratorError::Internal("hook failed".to_string()));
            }
            Ok(CleanupResult {
                items_removed: 2,
                space_freed: 100,
            })
        }
    }

    #[tokio::test]
    async fn test_retention_trim() {
        let (oplog, _alerts, engine) = engine(1000);
        let now = Utc::now();
        for age_mins in [120, 90, 30, 5] {
            oplog.record(
                CacheOperation::new(OperationType::Get)
                    .with_key("users:1")
                    .at(now - chrono::Duration::minutes(age_mins)),
            );
        }

        let result = engine.run_at(now, no_strategies).await;
        assert_eq!(result.items_removed, 2);
        assert_eq!(result.space_freed, 2 * OPERATION_RECORD_BYTES);

        let cutoff = now - chrono::Duration::hours(1);
        assert!(oplog.snapshot().iter().all(|op| op.timestamp > cutoff));
        // Two survivors plus the cleanup record
        assert_eq!(oplog.len(), 3);
    }

    #[tokio::test]
    async fn test_max_size_cap() {
        let (oplog, _alerts, engine) = engine(10);
        for i in 0..25 {
            oplog.record(CacheOperation::new(OperationType::Set).with_key(format!("users:{}", i)));
        }

        let result = engine.run_at(Utc::now(), no_strategies).await;
        assert_eq!(result.items_removed, 15);
        assert_eq!(oplog.len(), 11);
    }

    #[tokio::test]
    async fn test_resolved_alert_purge_respects_age() {
        let (_oplog, alerts, engine) = engine(1000);
        let now = Utc::now();
        let alert = alerts.raise(
            AlertCheck::HitRate,
            AlertSeverity::Warning,
            70.0,
            80.0,
            now - chrono::Duration::hours(2),
        );
        alerts.resolve(&alert.id).unwrap();

        engine.run_at(now, no_strategies).await;
        assert!(alerts.get(&alert.id).is_some());

        let result = engine
            .run_at(now + chrono::Duration::hours(23), no_strategies)
            .await;
        assert!(alerts.get(&alert.id).is_none());
        assert!(result.space_freed >= ALERT_RECORD_BYTES);
    }

    #[tokio::test]
    async fn test_hooks_run_and_failures_are_contained() {
        let (_oplog, _alerts, engine) = engine(1000);
        let ok = Arc::new(CountingHook {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let failing = Arc::new(CountingHook {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let orphan = Arc::new(CountingHook {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        engine.register_hook("user_data", ok.clone());
        engine.register_hook("analytics_data", failing.clone());
        engine.register_hook("gone", orphan.clone());

        let lookup = |name: &str| match name {
            "user_data" => Some(CacheStrategy::new("user_data", "users", 600)),
            "analytics_data" => Some(CacheStrategy::new("analytics_data", "analytics", 300)),
            _ => None,
        };
        let result = engine.run_at(Utc::now(), lookup).await;

        assert_eq!(ok.calls.load(Ordering::SeqCst), 1);
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(orphan.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.items_removed, 2);
        assert_eq!(result.space_freed, 100);
    }
}
