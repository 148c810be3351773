//! Cache Tier Adapters
//!
//! Interfaces the orchestrator consumes from its collaborators:
//! - Backing store: distributed shared cache tier
//! - Local cache: bounded in-process tier
//! - Session / content stores: domain caches layered over both
//! - Warmup source: optional source of truth used when warming
//!
//! In-process implementations of each live in the submodules.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::core::Result;

mod domain;
mod local;
mod memory;

pub use domain::{ContentCache, SessionCache};
pub use local::LruLocalCache;
pub use memory::MemoryBackingStore;

/// Low-level metrics reported by the backing store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackingStoreMetrics {
    pub used_memory: u64,
    pub keyspace_hits: u64,
    pub keyspace_misses: u64,
    pub avg_response_time_ms: f64,
    /// Failed calls since the last successful connect
    pub errors: u64,
}

impl BackingStoreMetrics {
    /// Keyspace hit rate as a percentage (100 when idle)
    pub fn hit_rate(&self) -> f64 {
        let total = self.keyspace_hits + self.keyspace_misses;
        if total == 0 {
            return 100.0;
        }
        self.keyspace_hits as f64 * 100.0 / total as f64
    }

    /// Errors as a percentage of all keyspace lookups
    pub fn error_rate(&self) -> f64 {
        let total = self.keyspace_hits + self.keyspace_misses + self.errors;
        if total == 0 {
            return 0.0;
        }
        self.errors as f64 * 100.0 / total as f64
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub is_connected: bool,
}

/// Local cache statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalCacheStats {
    /// Hit rate percentage (0-100)
    pub hit_rate: f64,
    /// Bytes held by cached values
    pub memory_usage: u64,
    /// Number of cached entries
    pub total_size: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStats {
    pub active_sessions: usize,
    pub total_sessions: u64,
    pub average_duration_secs: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentStats {
    pub cached_content: usize,
    pub adaptations: u64,
    pub hit_rate: f64,
}

/// Client for the distributed cache tier
#[async_trait]
pub trait BackingStore: Send + Sync {
    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    async fn set_with_tags(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
        tags: &[String],
    ) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<bool>;

    /// Live keys matching a glob pattern
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    async fn delete_by_pattern(&self, pattern: &str) -> Result<usize>;

    async fn delete_by_tags(&self, tags: &[String]) -> Result<usize>;

    /// Remove every key in a namespace
    async fn clear(&self, namespace: &str) -> Result<usize>;

    async fn get_metrics(&self) -> Result<BackingStoreMetrics>;

    async fn get_connection_status(&self) -> Result<HashMap<String, ConnectionStatus>>;
}

/// Bounded in-process cache tier
pub trait LocalCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    fn put(&self, key: String, value: Vec<u8>, ttl: Option<Duration>);

    fn remove(&self, key: &str) -> bool;

    /// Remove every entry whose key matches the glob pattern
    fn remove_matching(&self, pattern: &str) -> usize;

    fn get_stats(&self) -> LocalCacheStats;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_session_stats(&self) -> Result<SessionStats>;
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get_content_stats(&self) -> Result<ContentStats>;
}

/// Source of truth consulted when warming a pattern
#[async_trait]
pub trait WarmupSource: Send + Sync {
    async fn load(&self, pattern: &str) -> Result<Vec<(String, Vec<u8>)>>;
}
