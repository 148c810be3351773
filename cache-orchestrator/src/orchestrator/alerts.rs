//! Alert Manager
//!
//! Threshold breaches become alerts keyed by a stable check id. While an
//! alert for a check is unresolved, further breaches update it in place.
//! Alerts leave the active set only through explicit resolution; resolved
//! alerts are never reopened, a later breach opens a new alert.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AlertThresholds;
use crate::core::{OrchestratorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertCategory {
    Performance,
    Availability,
    Resource,
}

/// Threshold checks evaluated against live metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertCheck {
    HitRate,
    ResponseTime,
    ErrorRate,
    MemoryUsage,
}

impl AlertCheck {
    pub const ALL: [AlertCheck; 4] = [
        AlertCheck::HitRate,
        AlertCheck::ResponseTime,
        AlertCheck::ErrorRate,
        AlertCheck::MemoryUsage,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Self::HitRate => "hit_rate",
            Self::ResponseTime => "response_time",
            Self::ErrorRate => "error_rate",
            Self::MemoryUsage => "memory_usage",
        }
    }

    pub fn category(&self) -> AlertCategory {
        match self {
            Self::HitRate | Self::ResponseTime => AlertCategory::Performance,
            Self::ErrorRate => AlertCategory::Availability,
            Self::MemoryUsage => AlertCategory::Resource,
        }
    }

    fn threshold(&self, thresholds: &AlertThresholds) -> f64 {
        match self {
            Self::HitRate => thresholds.hit_rate,
            Self::ResponseTime => thresholds.response_time_ms,
            Self::ErrorRate => thresholds.error_rate,
            Self::MemoryUsage => thresholds.memory_usage,
        }
    }

    fn value(&self, sample: &AlertSample) -> f64 {
        match self {
            Self::HitRate => sample.hit_rate,
            Self::ResponseTime => sample.response_time_ms,
            Self::ErrorRate => sample.error_rate,
            Self::MemoryUsage => sample.memory_usage,
        }
    }

    /// Severity of a breach, or `None` when within threshold.
    /// Hit rate breaches downward, everything else upward.
    pub fn evaluate(&self, value: f64, threshold: f64) -> Option<AlertSeverity> {
        match self {
            Self::HitRate if value < threshold / 2.0 => Some(AlertSeverity::Critical),
            Self::HitRate if value < threshold => Some(AlertSeverity::Warning),
            Self::HitRate => None,
            _ if value > threshold * 2.0 => Some(AlertSeverity::Critical),
            _ if value > threshold => Some(AlertSeverity::Warning),
            _ => None,
        }
    }

    fn message(&self, value: f64, threshold: f64) -> String {
        match self {
            Self::HitRate => format!("Cache hit rate {:.1}% below {:.1}%", value, threshold),
            Self::ResponseTime => {
                format!("Response time {:.1}ms above {:.1}ms", value, threshold)
            }
            Self::ErrorRate => format!("Error rate {:.1}% above {:.1}%", value, threshold),
            Self::MemoryUsage => format!("Memory usage {:.1}% above {:.1}%", value, threshold),
        }
    }
}

/// Live values compared against thresholds; percentages are 0-100
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertSample {
    pub hit_rate: f64,
    pub response_time_ms: f64,
    pub error_rate: f64,
    pub memory_usage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: String,
    pub check_id: String,
    #[serde(rename = "type")]
    pub severity: AlertSeverity,
    pub category: AlertCategory,
    pub message: String,
    pub threshold: f64,
    pub current_value: f64,
    pub timestamp: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct AlertState {
    alerts: HashMap<String, Alert>,
    /// check id -> id of its unresolved alert
    open_by_check: HashMap<&'static str, String>,
}

#[derive(Default)]
pub struct AlertManager {
    state: RwLock<AlertState>,
}

impl AlertManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or update the open alert for `check`
    pub fn raise(
        &self,
        check: AlertCheck,
        severity: AlertSeverity,
        value: f64,
        threshold: f64,
        now: DateTime<Utc>,
    ) -> Alert {
        let message = check.message(value, threshold);
        let mut state = self.state.write();

        if let Some(id) = state.open_by_check.get(check.id()).cloned() {
            if let Some(alert) = state.alerts.get_mut(&id) {
                alert.severity = severity;
                alert.current_value = value;
                alert.threshold = threshold;
                alert.message = message;
                alert.updated_at = now;
                return alert.clone();
            }
        }

        let alert = Alert {
            id: Uuid::new_v4().to_string(),
            check_id: check.id().to_string(),
            severity,
            category: check.category(),
            message,
            threshold,
            current_value: value,
            timestamp: now,
            updated_at: now,
            resolved: false,
            resolved_at: None,
        };
        warn!("Alert raised [{}] {}", check.id(), alert.message);

        state.open_by_check.insert(check.id(), alert.id.clone());
        state.alerts.insert(alert.id.clone(), alert.clone());
        alert
    }

    /// Evaluate every check against `sample`; returns alerts raised or updated
    pub fn evaluate(
        &self,
        sample: &AlertSample,
        thresholds: &AlertThresholds,
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        AlertCheck::ALL
            .iter()
            .filter_map(|check| {
                let value = check.value(sample);
                let threshold = check.threshold(thresholds);
                check
                    .evaluate(value, threshold)
                    .map(|severity| self.raise(*check, severity, value, threshold, now))
            })
            .collect()
    }

    /// Mark an alert resolved
    pub fn resolve(&self, id: &str) -> Result<Alert> {
        let mut state = self.state.write();
        let alert = state
            .alerts
            .get_mut(id)
            .ok_or_else(|| OrchestratorError::AlertNotFound(id.to_string()))?;

        if !alert.resolved {
            alert.resolved = true;
            alert.resolved_at = Some(Utc::now());
            info!("Alert resolved [{}] {}", alert.check_id, alert.id);
        }
        let alert = alert.clone();

        if state
            .open_by_check
            .get(alert.check_id.as_str())
            .is_some_and(|open| open == &alert.id)
        {
            state.open_by_check.retain(|_, open| open != &alert.id);
        }
        Ok(alert)
    }

    /// Unresolved alerts, oldest first
    pub fn active(&self) -> Vec<Alert> {
        let mut active: Vec<Alert> = self
            .state
            .read()
            .alerts
            .values()
            .filter(|a| !a.resolved)
            .cloned()
            .collect();
        active.sort_by_key(|a| a.timestamp);
        active
    }

    pub fn get(&self, id: &str) -> Option<Alert> {
        self.state.read().alerts.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.read().alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove resolved alerts older than `max_age`; returns removed count
    pub fn purge_resolved(&self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let mut state = self.state.write();
        let before = state.alerts.len();
        state
            .alerts
            .retain(|_, alert| !(alert.resolved && now - alert.timestamp > max_age));
        before - state.alerts.len()
    }
}
