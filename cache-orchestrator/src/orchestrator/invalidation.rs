//! Invalidation Engine
//!
//! Selectors in a request are applied additively against the backing store
//! and the deleted counts summed. Pattern and namespace deletes are mirrored
//! to the local cache, which keeps no tag index. A failing selector stops
//! the request and reports the partial count; nothing already deleted is
//! restored.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::core::{CacheOperation, OperationLog, OperationType, OrchestratorError, Result};
use crate::orchestrator::strategy::{CacheStrategy, StrategyRegistry};
use crate::stores::{BackingStore, LocalCache};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InvalidationRequest {
    pub namespace: Option<String>,
    pub pattern: Option<String>,
    pub tags: Option<Vec<String>>,
    pub cascade: bool,
    pub strategy: Option<String>,
}

impl InvalidationRequest {
    pub fn pattern(pattern: impl Into<String>) -> Self {
        Self {
            pattern: Some(pattern.into()),
            ..Default::default()
        }
    }

    pub fn namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Default::default()
        }
    }

    pub fn strategy(name: impl Into<String>) -> Self {
        Self {
            strategy: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn tags(tags: Vec<String>) -> Self {
        Self {
            tags: Some(tags),
            ..Default::default()
        }
    }

    pub fn with_cascade(mut self) -> Self {
        self.cascade = true;
        self
    }

    fn describe(&self) -> Option<String> {
        self.pattern
            .clone()
            .or_else(|| self.namespace.as_ref().map(|ns| format!("{}:*", ns)))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InvalidationResult {
    pub success: bool,
    pub keys_invalidated: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct InvalidationEngine {
    backing: Arc<dyn BackingStore>,
    local: Arc<dyn LocalCache>,
    registry: Arc<StrategyRegistry>,
    oplog: OperationLog,
}

impl InvalidationEngine {
    pub fn new(
        backing: Arc<dyn BackingStore>,
        local: Arc<dyn LocalCache>,
        registry: Arc<StrategyRegistry>,
        oplog: OperationLog,
    ) -> Self {
        Self {
            backing,
            local,
            registry,
            oplog,
        }
    }

    pub async fn invalidate(&self, request: &InvalidationRequest) -> InvalidationResult {
        let started = Instant::now();
        let mut count = 0;
        let outcome = self.apply(request, &mut count).await;

        let mut op = CacheOperation::new(OperationType::Invalidate)
            .with_duration(started.elapsed())
            .with_size(count)
            .with_success(outcome.is_ok());
        if let Some(pattern) = request.describe() {
            op = op.with_pattern(pattern);
        }
        self.oplog.record(op);

        match outcome {
            Ok(()) => {
                info!("Invalidated {} keys", count);
                InvalidationResult {
                    success: true,
                    keys_invalidated: count,
                    error: None,
                }
            }
            Err(e) => {
                warn!("Invalidation failed after {} keys: {}", count, e);
                InvalidationResult {
                    success: false,
                    keys_invalidated: count,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn apply(&self, request: &InvalidationRequest, count: &mut usize) -> Result<()> {
        if let Some(pattern) = &request.pattern {
            *count += self.delete_pattern(pattern).await?;
        }

        if let Some(tags) = request.tags.as_deref().filter(|t| !t.is_empty()) {
            *count += self.backing.delete_by_tags(tags).await?;
        }

        if let Some(namespace) = &request.namespace {
            *count += self.backing.clear(namespace).await?;
            self.local.remove_matching(&format!("{}:*", namespace));
        }

        let mut cascade_from: Option<CacheStrategy> = None;
        if let Some(name) = &request.strategy {
            let strategy = self
                .registry
                .get(name)
                .ok_or_else(|| OrchestratorError::StrategyNotFound(name.clone()))?;
            *count += self.delete_pattern(&strategy.namespace_pattern()).await?;
            cascade_from = Some(strategy);
        }

        if request.cascade {
            let strategy = cascade_from.or_else(|| {
                request
                    .namespace
                    .as_deref()
                    .and_then(|ns| self.registry.for_namespace(ns))
            });
            if let Some(strategy) = strategy {
                for rule in &strategy.invalidation_rules {
                    for pattern in rule.patterns_for("*") {
                        *count += self.delete_pattern(&pattern).await?;
                    }
                }
            }
        }

        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize> {
        let deleted = self.backing.delete_by_pattern(pattern).await?;
        let local = self.local.remove_matching(pattern);
        debug!(
            "Pattern {} removed {} backing / {} local entries",
            pattern, deleted, local
        );
        Ok(deleted)
    }

    /// Fire the invalidation rules bound to `event` for each id. One
    /// operation is recorded per strategy carrying a matching rule, under
    /// that strategy's namespace.
    pub async fn trigger(&self, event: &str, ids: &[String]) -> InvalidationResult {
        let bound: Vec<(String, Vec<String>)> = self
            .registry
            .list()
            .into_iter()
            .filter_map(|strategy| {
                let patterns: Vec<String> = strategy
                    .invalidation_rules
                    .iter()
                    .filter(|rule| rule.event == event)
                    .flat_map(|rule| ids.iter().flat_map(move |id| rule.patterns_for(id)))
                    .collect();
                (!patterns.is_empty()).then_some((strategy.namespace, patterns))
            })
            .collect();

        if bound.is_empty() {
            debug!("No invalidation rules bound to event {}", event);
        }

        let mut count = 0;
        let mut error = None;
        for (namespace, patterns) in &bound {
            let started = Instant::now();
            let mut deleted = 0;
            for pattern in patterns {
                match self.delete_pattern(pattern).await {
                    Ok(n) => deleted += n,
                    Err(e) => {
                        error = Some(e.to_string());
                        break;
                    }
                }
            }
            count += deleted;

            self.oplog.record(
                CacheOperation::new(OperationType::Invalidate)
                    .with_namespace(namespace.clone())
                    .with_duration(started.elapsed())
                    .with_size(deleted)
                    .with_success(error.is_none()),
            );
            if error.is_some() {
                break;
            }
        }

        info!("Event {} invalidated {} keys", event, count);
        InvalidationResult {
            success: error.is_none(),
            keys_invalidated: count,
            error,
        }
    }
}
