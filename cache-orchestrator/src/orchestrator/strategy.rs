//! Strategy Registry
//!
//! Named configurations binding a key namespace to TTL, warmup priority,
//! invalidation rules, compression threshold and prefetch rules.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::info;

use crate::core::OperationLog;
use crate::core::pattern::namespace_of;

/// TTL used for keys no strategy claims
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// What causes a prefetch rule to fire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefetchTrigger {
    UserAction,
    TimeBased,
    Popularity,
    Dependency,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefetchRule {
    pub trigger: PrefetchTrigger,
    pub condition: String,
    pub patterns: Vec<String>,
    pub priority: u8,
    pub max_age_secs: u64,
}

/// Patterns to delete when a named event fires. `{id}` placeholders are
/// substituted from the event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationRule {
    pub event: String,
    pub patterns: Vec<String>,
}

impl InvalidationRule {
    pub fn new(event: impl Into<String>, patterns: &[&str]) -> Self {
        Self {
            event: event.into(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Patterns with `{id}` replaced by `id`
    pub fn patterns_for(&self, id: &str) -> Vec<String> {
        self.patterns.iter().map(|p| p.replace("{id}", id)).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStrategy {
    pub name: String,
    pub namespace: String,
    pub ttl_secs: u64,
    pub warmup_priority: u8,
    #[serde(default)]
    pub invalidation_rules: Vec<InvalidationRule>,
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: usize,
    #[serde(default)]
    pub prefetch_rules: Vec<PrefetchRule>,
}

fn default_compression_threshold() -> usize {
    1024
}

impl CacheStrategy {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, ttl_secs: u64) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ttl_secs,
            warmup_priority: 0,
            invalidation_rules: Vec::new(),
            compression_threshold: default_compression_threshold(),
            prefetch_rules: Vec::new(),
        }
    }

    pub fn with_warmup_priority(mut self, priority: u8) -> Self {
        self.warmup_priority = priority;
        self
    }

    pub fn with_compression_threshold(mut self, threshold: usize) -> Self {
        self.compression_threshold = threshold;
        self
    }

    pub fn with_invalidation_rule(mut self, rule: InvalidationRule) -> Self {
        self.invalidation_rules.push(rule);
        self
    }

    pub fn with_prefetch_rule(mut self, rule: PrefetchRule) -> Self {
        self.prefetch_rules.push(rule);
        self
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Pattern covering every key of this strategy
    pub fn namespace_pattern(&self) -> String {
        format!("{}:*", self.namespace)
    }
}

/// Per-strategy activity derived from the operation log
#[derive(Debug, Clone, Serialize)]
pub struct StrategyReport {
    pub namespace: String,
    pub operations: usize,
    /// Percentage of successful operations (0 when idle)
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Registry of named strategies
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: RwLock<HashMap<String, CacheStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in strategies
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        for strategy in builtin_strategies() {
            registry.register(strategy);
        }
        registry
    }

    /// Store a strategy; an existing one with the same name is replaced
    pub fn register(&self, strategy: CacheStrategy) {
        info!(
            "Registered cache strategy '{}' (namespace={}, ttl={}s, priority={})",
            strategy.name, strategy.namespace, strategy.ttl_secs, strategy.warmup_priority
        );
        self.strategies
            .write()
            .insert(strategy.name.clone(), strategy);
    }

    pub fn get(&self, name: &str) -> Option<CacheStrategy> {
        self.strategies.read().get(name).cloned()
    }

    /// All strategies sorted by name
    pub fn list(&self) -> Vec<CacheStrategy> {
        let mut strategies: Vec<CacheStrategy> =
            self.strategies.read().values().cloned().collect();
        strategies.sort_by(|a, b| a.name.cmp(&b.name));
        strategies
    }

    pub fn for_namespace(&self, namespace: &str) -> Option<CacheStrategy> {
        self.strategies
            .read()
            .values()
            .filter(|s| s.namespace == namespace)
            .min_by(|a, b| a.name.cmp(&b.name))
            .cloned()
    }

    /// Strategy owning the namespace of `key`, if any
    pub fn for_key(&self, key: &str) -> Option<CacheStrategy> {
        namespace_of(key).and_then(|ns| self.for_namespace(ns))
    }

    /// Warmup-eligible strategies, highest priority first
    pub fn warmup_candidates(&self) -> Vec<CacheStrategy> {
        let mut candidates: Vec<CacheStrategy> = self
            .list()
            .into_iter()
            .filter(|s| s.warmup_priority > 0)
            .collect();
        candidates.sort_by(|a, b| b.warmup_priority.cmp(&a.warmup_priority));
        candidates
    }

    /// Compute per-strategy activity; read-only
    pub fn report(&self, log: &OperationLog) -> BTreeMap<String, StrategyReport> {
        let strategies = self.list();

        log.inspect(|entries| {
            strategies
                .into_iter()
                .map(|strategy| {
                    let mut operations = 0;
                    let mut successes = 0;
                    let mut total_ms = 0.0;
                    let mut last_activity: Option<DateTime<Utc>> = None;

                    for op in entries
                        .iter()
                        .filter(|op| op.namespace.as_deref() == Some(strategy.namespace.as_str()))
                    {
                        operations += 1;
                        if op.success {
                            successes += 1;
                        }
                        total_ms += op.duration_ms;
                        last_activity = last_activity.max(Some(op.timestamp));
                    }

                    let (success_rate, avg_duration_ms) = if operations == 0 {
                        (0.0, 0.0)
                    } else {
                        (
                            successes as f64 * 100.0 / operations as f64,
                            total_ms / operations as f64,
                        )
                    };

                    let report = StrategyReport {
                        namespace: strategy.namespace.clone(),
                        operations,
                        success_rate,
                        avg_duration_ms,
                        last_activity,
                    };
                    (strategy.name, report)
                })
                .collect()
        })
    }
}

/// Strategies registered on every orchestrator
pub fn builtin_strategies() -> Vec<CacheStrategy> {
    vec![
        CacheStrategy::new("user_sessions", "session", 1800).with_warmup_priority(1),
        CacheStrategy::new("content_cache", "content", 3600)
            .with_warmup_priority(2)
            .with_invalidation_rule(InvalidationRule::new(
                "content_updated",
                &["content:related:{id}:*", "content:next:{id}:*"],
            ))
            .with_prefetch_rule(PrefetchRule {
                trigger: PrefetchTrigger::Popularity,
                condition: "views_last_hour > 100".to_string(),
                patterns: vec!["content:popular:*".to_string()],
                priority: 2,
                max_age_secs: 3600,
            })
            .with_prefetch_rule(PrefetchRule {
                trigger: PrefetchTrigger::UserAction,
                condition: "content_completed".to_string(),
                patterns: vec!["content:trending:*".to_string()],
                priority: 1,
                max_age_secs: 1800,
            }),
        CacheStrategy::new("user_profiles", "user", 7200),
        CacheStrategy::new("analytics_data", "analytics", 300).with_compression_threshold(512),
    ]
}
