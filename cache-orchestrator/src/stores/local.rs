use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use super::{LocalCache, LocalCacheStats};
use crate::core::pattern::glob_match;

/// Bounded in-process LRU cache
#[derive(Clone)]
pub struct LruLocalCache {
    inner: Arc<RwLock<LruState>>,
}

struct LruState {
    data: HashMap<String, CacheEntry>,
    /// LRU ordering (most recent at back)
    lru_order: VecDeque<String>,
    max_entries: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
    total_bytes: usize,
}

struct CacheEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expires| Instant::now() >= expires)
    }
}

impl LruState {
    fn detach(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.data.remove(key)?;
        self.lru_order.retain(|k| k != key);
        self.total_bytes = self.total_bytes.saturating_sub(entry.value.len());
        Some(entry)
    }
}

impl LruLocalCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(LruState {
                data: HashMap::new(),
                lru_order: VecDeque::new(),
                max_entries: max_entries.max(1),
                hits: 0,
                misses: 0,
                evictions: 0,
                total_bytes: 0,
            })),
        }
    }

    pub fn evictions(&self) -> u64 {
        self.inner.read().evictions
    }

    /// Invalidate (clear) entire cache
    pub fn invalidate_all(&self) {
        let mut state = self.inner.write();
        let count = state.data.len();
        state.data.clear();
        state.lru_order.clear();
        state.total_bytes = 0;
        debug!("Local cache INVALIDATE ALL ({} entries)", count);
    }
}

impl LocalCache for LruLocalCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut state = self.inner.write();

        let expired = match state.data.get(key) {
            Some(entry) => entry.is_expired(),
            None => {
                state.misses += 1;
                return None;
            }
        };

        if expired {
            state.detach(key);
            state.misses += 1;
            return None;
        }

        state.lru_order.retain(|k| k != key);
        state.lru_order.push_back(key.to_string());
        state.hits += 1;

        state.data.get(key).map(|entry| entry.value.clone())
    }

    fn put(&self, key: String, value: Vec<u8>, ttl: Option<Duration>) {
        let mut state = self.inner.write();
        state.detach(&key);

        while state.data.len() >= state.max_entries {
            let Some(evict_key) = state.lru_order.pop_front() else {
                break;
            };
            if let Some(evicted) = state.data.remove(&evict_key) {
                state.evictions += 1;
                state.total_bytes = state.total_bytes.saturating_sub(evicted.value.len());
                debug!("Local cache EVICT: {}", evict_key);
            }
        }

        state.total_bytes += value.len();
        state.data.insert(
            key.clone(),
            CacheEntry {
                value,
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        state.lru_order.push_back(key);
    }

    fn remove(&self, key: &str) -> bool {
        self.inner.write().detach(key).is_some()
    }

    fn remove_matching(&self, pattern: &str) -> usize {
        let mut state = self.inner.write();
        let keys: Vec<String> = state
            .data
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();

        for key in &keys {
            state.detach(key);
        }
        keys.len()
    }

    fn get_stats(&self) -> LocalCacheStats {
        let state = self.inner.read();
        let total = state.hits + state.misses;
        let hit_rate = if total == 0 {
            100.0
        } else {
            state.hits as f64 * 100.0 / total as f64
        };

        LocalCacheStats {
            hit_rate,
            memory_usage: state.total_bytes as u64,
            total_size: state.data.len(),
        }
    }
}
