use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::pattern::namespace_of;

/// Kind of cache operation recorded in the operation log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Get,
    Set,
    Delete,
    Invalidate,
    Warm,
    Cleanup,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Delete => "delete",
            Self::Invalidate => "invalidate",
            Self::Warm => "warm",
            Self::Cleanup => "cleanup",
        }
    }
}

/// A single recorded cache operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheOperation {
    #[serde(rename = "type")]
    pub op_type: OperationType,
    pub key: Option<String>,
    pub pattern: Option<String>,
    pub namespace: Option<String>,
    pub duration_ms: f64,
    pub success: bool,
    pub size: Option<usize>,
    pub timestamp: DateTime<Utc>,
}

impl CacheOperation {
    /// Create a successful operation stamped with the current time
    pub fn new(op_type: OperationType) -> Self {
        Self {
            op_type,
            key: None,
            pattern: None,
            namespace: None,
            duration_ms: 0.0,
            success: true,
            size: None,
            timestamp: Utc::now(),
        }
    }

    /// Set the key; the namespace is derived from it unless already set
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if self.namespace.is_none() {
            self.namespace = namespace_of(&key).map(str::to_string);
        }
        self.key = Some(key);
        self
    }

    /// Set the pattern; the namespace is derived from it unless already set
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        if self.namespace.is_none() {
            self.namespace = namespace_of(&pattern).map(str::to_string);
        }
        self.pattern = Some(pattern);
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = duration.as_micros() as f64 / 1000.0;
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
