//! Domain caches layered over the backing store and the local cache
//!
//! Values are framed by the codec in the backing store and held decoded in
//! the local cache. Reads, writes and deletes are recorded in the operation
//! log.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use super::{BackingStore, ContentStats, ContentStore, LocalCache, SessionStats, SessionStore};
use crate::compression::ValueCodec;
use crate::core::{CacheOperation, OperationLog, OperationType, Result};

const SESSION_TTL: Duration = Duration::from_secs(1800);
const CONTENT_TTL: Duration = Duration::from_secs(3600);

/// Codec-aware access to both tiers shared by the domain caches
#[derive(Clone)]
struct TierAccess {
    backing: Arc<dyn BackingStore>,
    local: Arc<dyn LocalCache>,
    codec: ValueCodec,
    oplog: OperationLog,
}

impl TierAccess {
    fn record(&self, op_type: OperationType, key: &str, started: Instant, success: bool) {
        self.oplog.record(
            CacheOperation::new(op_type)
                .with_key(key)
                .with_duration(started.elapsed())
                .with_success(success),
        );
    }

    /// Local tier first, then the backing store; backing hits are decoded and
    /// promoted into the local tier
    async fn read(&self, key: &str, ttl: Duration) -> Result<Option<Vec<u8>>> {
        let started = Instant::now();
        if let Some(data) = self.local.get(key) {
            self.record(OperationType::Get, key, started, true);
            return Ok(Some(data));
        }

        let result = match self.backing.get(key).await {
            Ok(Some(framed)) => self.codec.decode(&framed).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };
        self.record(OperationType::Get, key, started, result.is_ok());

        let data = result?;
        if let Some(data) = &data {
            self.local.put(key.to_string(), data.clone(), Some(ttl));
        }
        Ok(data)
    }

    async fn write(&self, key: &str, data: Vec<u8>, ttl: Duration, local: bool) -> Result<()> {
        let started = Instant::now();
        let size = data.len();
        let result = match self.codec.encode(&data, 0) {
            Ok(framed) => self.backing.set(key, framed, Some(ttl)).await,
            Err(e) => Err(e),
        };
        self.oplog.record(
            CacheOperation::new(OperationType::Set)
                .with_key(key)
                .with_duration(started.elapsed())
                .with_size(size)
                .with_success(result.is_ok()),
        );
        result?;

        if local {
            self.local.put(key.to_string(), data, Some(ttl));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let started = Instant::now();
        self.local.remove(key);
        let result = self.backing.delete(key).await;
        self.record(OperationType::Delete, key, started, result.is_ok());
        result
    }
}

#[derive(Default)]
struct SessionCounters {
    active: HashMap<String, Instant>,
    total_sessions: u64,
    completed: u64,
    total_duration_secs: f64,
}

/// Session data cache, keyed `session:{id}`
#[derive(Clone)]
pub struct SessionCache {
    tiers: TierAccess,
    counters: Arc<RwLock<SessionCounters>>,
}

impl SessionCache {
    pub fn new(
        backing: Arc<dyn BackingStore>,
        local: Arc<dyn LocalCache>,
        codec: ValueCodec,
        oplog: OperationLog,
    ) -> Self {
        Self {
            tiers: TierAccess {
                backing,
                local,
                codec,
                oplog,
            },
            counters: Arc::new(RwLock::new(SessionCounters::default())),
        }
    }

    fn key(session_id: &str) -> String {
        format!("session:{}", session_id)
    }

    /// Store session data and mark the session active
    pub async fn start_session(&self, session_id: &str, data: Vec<u8>) -> Result<()> {
        let key = Self::key(session_id);
        self.tiers.write(&key, data, SESSION_TTL, true).await?;

        let mut counters = self.counters.write();
        if counters
            .active
            .insert(session_id.to_string(), Instant::now())
            .is_none()
        {
            counters.total_sessions += 1;
        }
        Ok(())
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<Vec<u8>>> {
        self.tiers.read(&Self::key(session_id), SESSION_TTL).await
    }

    /// Remove session data and fold its duration into the average
    pub async fn end_session(&self, session_id: &str) -> Result<bool> {
        let removed = self.tiers.delete(&Self::key(session_id)).await?;

        let mut counters = self.counters.write();
        if let Some(started) = counters.active.remove(session_id) {
            counters.completed += 1;
            counters.total_duration_secs += started.elapsed().as_secs_f64();
            debug!("Session {} ended", session_id);
        }
        Ok(removed)
    }
}

#[async_trait]
impl SessionStore for SessionCache {
    async fn get_session_stats(&self) -> Result<SessionStats> {
        let counters = self.counters.read();
        let average_duration_secs = if counters.completed == 0 {
            0.0
        } else {
            counters.total_duration_secs / counters.completed as f64
        };

        Ok(SessionStats {
            active_sessions: counters.active.len(),
            total_sessions: counters.total_sessions,
            average_duration_secs,
        })
    }
}

#[derive(Default)]
struct ContentCounters {
    cached: usize,
    adaptations: u64,
    hits: u64,
    misses: u64,
}

/// Content data cache, keyed `content:{id}` with adapted variants under
/// `content:adapted:{id}:{variant}`
#[derive(Clone)]
pub struct ContentCache {
    tiers: TierAccess,
    counters: Arc<RwLock<ContentCounters>>,
}

impl ContentCache {
    pub fn new(
        backing: Arc<dyn BackingStore>,
        local: Arc<dyn LocalCache>,
        codec: ValueCodec,
        oplog: OperationLog,
    ) -> Self {
        Self {
            tiers: TierAccess {
                backing,
                local,
                codec,
                oplog,
            },
            counters: Arc::new(RwLock::new(ContentCounters::default())),
        }
    }

    pub async fn cache_content(&self, content_id: &str, data: Vec<u8>) -> Result<()> {
        let key = format!("content:{}", content_id);
        let is_new = self.tiers.backing.get(&key).await?.is_none();
        self.tiers.write(&key, data, CONTENT_TTL, true).await?;

        if is_new {
            self.counters.write().cached += 1;
        }
        Ok(())
    }

    pub async fn get_content(&self, content_id: &str) -> Result<Option<Vec<u8>>> {
        let data = self
            .tiers
            .read(&format!("content:{}", content_id), CONTENT_TTL)
            .await?;

        let mut counters = self.counters.write();
        if data.is_some() {
            counters.hits += 1;
        } else {
            counters.misses += 1;
        }
        Ok(data)
    }

    /// Store a personalized variant of a content item
    pub async fn record_adaptation(
        &self,
        content_id: &str,
        variant: &str,
        data: Vec<u8>,
    ) -> Result<()> {
        let key = format!("content:adapted:{}:{}", content_id, variant);
        self.tiers.write(&key, data, CONTENT_TTL, false).await?;
        self.counters.write().adaptations += 1;
        Ok(())
    }
}

#[async_trait]
impl ContentStore for ContentCache {
    async fn get_content_stats(&self) -> Result<ContentStats> {
        let counters = self.counters.read();
        let total = counters.hits + counters.misses;
        let hit_rate = if total == 0 {
            100.0
        } else {
            counters.hits as f64 * 100.0 / total as f64
        };

        Ok(ContentStats {
            cached_content: counters.cached,
            adaptations: counters.adaptations,
            hit_rate,
        })
    }
}
