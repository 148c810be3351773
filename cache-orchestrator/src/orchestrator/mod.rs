//! Cache Orchestrator
//!
//! Context object wiring the strategy registry, health aggregation, warmup
//! scheduling, invalidation, cleanup, prefetch and alerting over the cache
//! tiers. Cheap to clone; every clone shares the same state.
//!
//! `initialize()` connects the backing store and starts four background
//! loops (health check, metrics collection, cleanup, warmup). `shutdown()`
//! signals them, waits for each to exit and disconnects.

pub mod alerts;
pub mod cleanup;
pub mod health;
pub mod invalidation;
pub mod prefetch;
pub mod strategy;
pub mod warmup;

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::compression::ValueCodec;
use crate::config::OrchestratorConfig;
use crate::core::{CacheOperation, OperationLog, Result};
use crate::metrics;
use crate::stores::{
    BackingStore, ContentCache, ContentStore, LocalCache, LruLocalCache, MemoryBackingStore,
    SessionCache, SessionStore, WarmupSource,
};

use alerts::{Alert, AlertManager};
use cleanup::{CleanupEngine, CleanupHook, CleanupPolicy, CleanupResult};
use health::{CacheHealthStatus, CacheMetricsSnapshot, HealthAggregator};
use invalidation::{InvalidationEngine, InvalidationRequest, InvalidationResult};
use prefetch::{LearningProfile, PrefetchEngine, PrefetchResult, SessionSummary};
use strategy::{CacheStrategy, StrategyRegistry, StrategyReport};
use warmup::{JobOutcome, PatternWarmer, WarmupJob, WarmupResult, WarmupScheduler};

/// Operations included in a metrics snapshot
pub const RECENT_OPERATIONS: usize = 100;

/// The collaborators the orchestrator drives
#[derive(Clone)]
pub struct CacheTiers {
    pub backing: Arc<dyn BackingStore>,
    pub local: Arc<dyn LocalCache>,
    pub sessions: Arc<dyn SessionStore>,
    pub content: Arc<dyn ContentStore>,
    pub source: Option<Arc<dyn WarmupSource>>,
    /// Log the domain caches record into; the orchestrator reports from it
    pub oplog: OperationLog,
}

impl CacheTiers {
    /// In-process tiers: memory backing store, LRU local cache and the
    /// session/content caches layered over both
    pub fn in_memory(config: &OrchestratorConfig) -> Self {
        Self::with_backing(config, Arc::new(MemoryBackingStore::new()))
    }

    /// LRU local cache and session/content caches over `backing`
    pub fn with_backing(config: &OrchestratorConfig, backing: Arc<dyn BackingStore>) -> Self {
        let local: Arc<dyn LocalCache> =
            Arc::new(LruLocalCache::new(config.local_cache.max_entries));
        let codec = ValueCodec::new(config.compression.clone());
        let oplog = OperationLog::new();
        Self {
            sessions: Arc::new(SessionCache::new(
                backing.clone(),
                local.clone(),
                codec.clone(),
                oplog.clone(),
            )),
            content: Arc::new(ContentCache::new(
                backing.clone(),
                local.clone(),
                codec,
                oplog.clone(),
            )),
            backing,
            local,
            source: None,
            oplog,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn WarmupSource>) -> Self {
        self.source = Some(source);
        self
    }
}

#[derive(Default)]
struct Lifecycle {
    shutdown_tx: Option<watch::Sender<bool>>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

struct Inner {
    config: OrchestratorConfig,
    tiers: CacheTiers,
    registry: Arc<StrategyRegistry>,
    oplog: OperationLog,
    alerts: Arc<AlertManager>,
    health: HealthAggregator,
    scheduler: WarmupScheduler,
    warmer: Arc<PatternWarmer>,
    invalidation: InvalidationEngine,
    cleanup: CleanupEngine,
    prefetch: PrefetchEngine,
    lifecycle: Mutex<Lifecycle>,
    /// Mirrors `lifecycle.shutdown_tx.is_some()` for loops that must not
    /// wait on the lifecycle lock
    running: AtomicBool,
}

#[derive(Clone)]
pub struct CacheOrchestrator {
    inner: Arc<Inner>,
}

impl CacheOrchestrator {
    /// Build a context with the built-in strategies registered. Nothing is
    /// connected or spawned until `initialize()`.
    pub fn new(config: OrchestratorConfig, tiers: CacheTiers) -> Self {
        let registry = Arc::new(StrategyRegistry::with_builtin());
        let oplog = tiers.oplog.clone();
        let alerts = Arc::new(AlertManager::new());

        let warmer = Arc::new(PatternWarmer::new(
            tiers.backing.clone(),
            tiers.local.clone(),
            tiers.source.clone(),
            registry.clone(),
            ValueCodec::new(config.compression.clone()),
            oplog.clone(),
        ));

        let inner = Inner {
            health: HealthAggregator::new(
                tiers.backing.clone(),
                tiers.local.clone(),
                tiers.sessions.clone(),
                tiers.content.clone(),
            ),
            invalidation: InvalidationEngine::new(
                tiers.backing.clone(),
                tiers.local.clone(),
                registry.clone(),
                oplog.clone(),
            ),
            cleanup: CleanupEngine::new(
                oplog.clone(),
                alerts.clone(),
                CleanupPolicy {
                    retention: config.metrics_retention(),
                    alert_max_age: config.alert_max_age(),
                    max_size: config.cleanup.max_size,
                },
            ),
            prefetch: PrefetchEngine::new(config.prefetch.enabled, warmer.clone()),
            scheduler: WarmupScheduler::new(),
            warmer,
            registry,
            oplog,
            alerts,
            tiers,
            config,
            lifecycle: Mutex::new(Lifecycle::default()),
            running: AtomicBool::new(false),
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// In-process tiers with the given configuration
    pub fn in_memory(config: OrchestratorConfig) -> Self {
        let tiers = CacheTiers::in_memory(&config);
        Self::new(config, tiers)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    pub fn tiers(&self) -> &CacheTiers {
        &self.inner.tiers
    }

    pub fn operation_log(&self) -> &OperationLog {
        &self.inner.oplog
    }

    pub async fn is_running(&self) -> bool {
        self.inner.lifecycle.lock().await.shutdown_tx.is_some()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Connect the backing store and start the background loops. A second
    /// call while running is a no-op. Connection errors propagate.
    pub async fn initialize(&self) -> Result<()> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        if lifecycle.shutdown_tx.is_some() {
            debug!("Cache orchestrator already initialized");
            return Ok(());
        }

        self.inner.tiers.backing.connect().await?;

        let config = &self.inner.config;
        if config.warmup.enabled {
            for job in warmup::default_jobs()? {
                if !self.inner.scheduler.contains(&job.id) {
                    self.inner.scheduler.register(job);
                }
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        if config.monitoring.enabled {
            let this = self.clone();
            lifecycle.tasks.push((
                "health-check",
                spawn_loop(
                    "health-check",
                    config.health_check_interval(),
                    shutdown_rx.clone(),
                    move || {
                        let this = this.clone();
                        async move {
                            this.run_health_check().await;
                        }
                    },
                ),
            ));

            let this = self.clone();
            lifecycle.tasks.push((
                "metrics",
                spawn_loop(
                    "metrics",
                    config.metrics_interval(),
                    shutdown_rx.clone(),
                    move || {
                        let this = this.clone();
                        async move {
                            this.collect_metrics().await;
                        }
                    },
                ),
            ));
        }

        let this = self.clone();
        lifecycle.tasks.push((
            "cleanup",
            spawn_loop(
                "cleanup",
                config.cleanup_interval(),
                shutdown_rx.clone(),
                move || {
                    let this = this.clone();
                    async move {
                        this.cleanup_cache().await;
                    }
                },
            ),
        ));

        if config.warmup.enabled {
            let this = self.clone();
            lifecycle.tasks.push((
                "warmup",
                spawn_loop(
                    "warmup",
                    config.warmup_tick(),
                    shutdown_rx,
                    move || {
                        let this = this.clone();
                        async move {
                            this.run_warmup_tick(Utc::now()).await;
                        }
                    },
                ),
            ));
        }

        lifecycle.shutdown_tx = Some(shutdown_tx);
        self.inner.running.store(true, Ordering::SeqCst);
        info!(
            "Cache orchestrator initialized ({} strategies, {} background loops)",
            self.inner.registry.list().len(),
            lifecycle.tasks.len()
        );
        Ok(())
    }

    /// Stop every loop and disconnect. Safe to call repeatedly, and before
    /// `initialize()`.
    pub async fn shutdown(&self) {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        let Some(shutdown_tx) = lifecycle.shutdown_tx.take() else {
            debug!("Cache orchestrator not running, nothing to shut down");
            return;
        };

        self.inner.running.store(false, Ordering::SeqCst);
        let _ = shutdown_tx.send(true);
        for (name, handle) in lifecycle.tasks.drain(..) {
            if let Err(e) = handle.await {
                error!("Background loop {} ended abnormally: {}", name, e);
            }
        }

        if let Err(e) = self.inner.tiers.backing.disconnect().await {
            warn!("Backing store disconnect failed: {}", e);
        }
        info!("Cache orchestrator shut down");
    }

    // ========================================================================
    // Observability
    // ========================================================================

    /// Classified health snapshot; never fails
    pub async fn get_health_status(&self) -> CacheHealthStatus {
        self.inner
            .health
            .health(&self.inner.config.monitoring.alert_thresholds)
            .await
    }

    pub async fn get_metrics(&self) -> CacheMetricsSnapshot {
        let status = self.get_health_status().await;
        let (backing_store, local_cache, sessions, content) =
            self.inner.health.stat_sources().await;

        CacheMetricsSnapshot {
            health: status.overall,
            backing_store,
            local_cache,
            sessions,
            content,
            recent_operations: self.inner.oplog.recent(RECENT_OPERATIONS),
            active_alerts: self.inner.alerts.active(),
            warmup_jobs: self.inner.scheduler.jobs(),
            collected_at: Utc::now(),
        }
    }

    /// One health-check tick: reconnect a dropped backing store while
    /// running, classify, then evaluate alert thresholds. Zeroed error
    /// snapshots are not fed to the alert checks.
    pub async fn run_health_check(&self) -> CacheHealthStatus {
        if self.inner.running.load(Ordering::SeqCst) {
            self.reconnect_if_dropped().await;
        }

        let status = self.get_health_status().await;
        metrics::set_health_tier(status.overall);

        if status.is_error() {
            warn!("Health check degraded: {:?}", status.error);
            return status;
        }

        let monitoring = &self.inner.config.monitoring;
        let sample = status.alert_sample(monitoring.max_memory_bytes);
        let raised = self
            .inner
            .alerts
            .evaluate(&sample, &monitoring.alert_thresholds, Utc::now());
        debug!(
            "Health check: {} ({} thresholds breached)",
            status.overall.as_str(),
            raised.len()
        );
        status
    }

    async fn reconnect_if_dropped(&self) {
        let backing = &self.inner.tiers.backing;
        let connected = match backing.get_connection_status().await {
            Ok(status) => !status.is_empty() && status.values().all(|c| c.is_connected),
            Err(_) => false,
        };
        if connected {
            return;
        }

        match backing.connect().await {
            Ok(()) => info!("Backing store reconnected"),
            Err(e) => debug!("Backing store still unavailable: {}", e),
        }
    }

    /// Snapshot live stats into the Prometheus gauges
    pub async fn collect_metrics(&self) {
        let snapshot = self.get_metrics().await;
        metrics::record_snapshot(&snapshot, self.inner.oplog.len());
        debug!(
            "Metrics collected: {} operations, {} active alerts",
            snapshot.recent_operations.len(),
            snapshot.active_alerts.len()
        );
    }

    /// Append an externally observed operation to the log
    pub fn record_operation(&self, op: CacheOperation) {
        self.inner.oplog.record(op);
    }

    // ========================================================================
    // Strategies
    // ========================================================================

    pub fn register_strategy(&self, strategy: CacheStrategy) {
        self.inner.registry.register(strategy);
    }

    pub fn strategy(&self, name: &str) -> Option<CacheStrategy> {
        self.inner.registry.get(name)
    }

    pub fn strategies(&self) -> Vec<CacheStrategy> {
        self.inner.registry.list()
    }

    /// Per-strategy activity from the operation log; read-only
    pub fn get_strategy_report(&self) -> BTreeMap<String, StrategyReport> {
        self.inner.registry.report(&self.inner.oplog)
    }

    // ========================================================================
    // Warmup
    // ========================================================================

    /// Warm the given patterns (or the configured defaults), followed by the
    /// prefetch-rule patterns of every warmup-eligible strategy
    pub async fn warmup_cache(&self, patterns: Option<Vec<String>>) -> WarmupResult {
        let config = &self.inner.config.warmup;
        if !config.enabled {
            debug!("Warmup disabled, skipping");
            return WarmupResult::disabled();
        }

        let mut all = patterns.unwrap_or_else(|| config.patterns.clone());
        for strategy in self.inner.registry.warmup_candidates() {
            for rule in &strategy.prefetch_rules {
                all.extend(rule.patterns.iter().cloned());
            }
        }

        let result = self.inner.warmer.warm_patterns(&all).await;
        metrics::record_warmup(
            "manual",
            result.failed_patterns.is_empty(),
            result.keys_warmed,
            result.duration_ms,
        );
        info!(
            "Warmup warmed {} keys in {:.2}ms ({} patterns failed)",
            result.keys_warmed,
            result.duration_ms,
            result.failed_patterns.len()
        );
        result
    }

    /// Add or replace a scheduled warmup job
    pub fn register_warmup_job(&self, job: WarmupJob) {
        self.inner.scheduler.register(job);
    }

    pub fn warmup_jobs(&self) -> Vec<WarmupJob> {
        self.inner.scheduler.jobs()
    }

    /// Run every job due at `now`, sequentially in registration order
    pub async fn run_warmup_tick(&self, now: DateTime<Utc>) -> Vec<JobOutcome> {
        let mut outcomes = Vec::new();

        for id in self.inner.scheduler.due_jobs(now) {
            let Some(patterns) = self.inner.scheduler.try_begin(&id) else {
                debug!("Warmup job {} already running, skipping", id);
                continue;
            };

            let result = self.inner.warmer.warm_patterns(&patterns).await;
            let outcome = JobOutcome {
                job_id: id,
                success: result.failed_patterns.is_empty(),
                keys_warmed: result.keys_warmed,
                duration_ms: result.duration_ms,
            };
            self.inner.scheduler.finish(&outcome, Utc::now());
            metrics::record_warmup(
                "scheduled",
                outcome.success,
                outcome.keys_warmed,
                outcome.duration_ms,
            );

            if outcome.success {
                info!(
                    "Warmup job {} warmed {} keys",
                    outcome.job_id, outcome.keys_warmed
                );
            } else {
                warn!(
                    "Warmup job {} failed for {:?}",
                    outcome.job_id, result.failed_patterns
                );
            }
            outcomes.push(outcome);
        }

        outcomes
    }

    // ========================================================================
    // Invalidation & cleanup
    // ========================================================================

    pub async fn invalidate_cache(&self, request: &InvalidationRequest) -> InvalidationResult {
        let result = self.inner.invalidation.invalidate(request).await;
        metrics::record_invalidation(result.success, result.keys_invalidated);
        result
    }

    /// Fire the invalidation rules bound to `event` for each id
    pub async fn trigger_invalidation_rules(
        &self,
        event: &str,
        ids: &[String],
    ) -> InvalidationResult {
        let result = self.inner.invalidation.trigger(event, ids).await;
        metrics::record_invalidation(result.success, result.keys_invalidated);
        result
    }

    pub async fn cleanup_cache(&self) -> CleanupResult {
        self.cleanup_cache_at(Utc::now()).await
    }

    /// Cleanup as of `now`
    pub async fn cleanup_cache_at(&self, now: DateTime<Utc>) -> CleanupResult {
        let registry = self.inner.registry.clone();
        let result = self
            .inner
            .cleanup
            .run_at(now, |name| registry.get(name))
            .await;
        metrics::record_cleanup(result.items_removed);
        result
    }

    /// Register the cleanup hook for a strategy
    pub fn register_cleanup_hook(&self, strategy: impl Into<String>, hook: Arc<dyn CleanupHook>) {
        self.inner.cleanup.register_hook(strategy, hook);
    }

    // ========================================================================
    // Prefetch & alerts
    // ========================================================================

    pub async fn prefetch_for_user(
        &self,
        user_id: &str,
        profile: &LearningProfile,
        recent_sessions: &[SessionSummary],
    ) -> PrefetchResult {
        let result = self
            .inner
            .prefetch
            .prefetch_for_user(user_id, profile, recent_sessions)
            .await;
        if self.inner.prefetch.is_enabled() {
            metrics::record_warmup("prefetch", result.success, result.items_prefetched, 0.0);
        }
        result
    }

    pub fn resolve_alert(&self, id: &str) -> Result<Alert> {
        self.inner.alerts.resolve(id)
    }

    pub fn active_alerts(&self) -> Vec<Alert> {
        self.inner.alerts.active()
    }

    pub fn alerts(&self) -> &AlertManager {
        &self.inner.alerts
    }
}

/// Spawn a loop running `tick` on every interval until the shutdown signal
/// flips. The first tick fires immediately.
fn spawn_loop<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "{} loop started - interval: {} seconds",
            name,
            period.as_secs()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => tick().await,
            }
        }

        debug!("{} loop stopped", name);
    })
}
