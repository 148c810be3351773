use async_trait::async_trait;
use parking_lot::RwLock;
use radix_trie::{Trie, TrieCommon};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{BackingStore, BackingStoreMetrics, ConnectionStatus};
use crate::core::pattern::{glob_match, literal_prefix};
use crate::core::{OrchestratorError, Result};

/// Stored entry with optional expiry and tag membership
struct StoredEntry {
    data: Vec<u8>,
    expires_at: Option<Instant>,
    tags: Vec<String>,
}

impl StoredEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expires| Instant::now() >= expires)
    }

    fn size(&self, key: &str) -> usize {
        key.len() + self.data.len()
    }
}

#[derive(Default)]
struct StoreCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    calls: AtomicU64,
    total_micros: AtomicU64,
}

/// In-process backing store using a radix trie for prefix scans
///
/// Reachability can be toggled to simulate an unavailable remote tier.
#[derive(Clone)]
pub struct MemoryBackingStore {
    data: Arc<RwLock<Trie<String, StoredEntry>>>,
    tags: Arc<RwLock<HashMap<String, HashSet<String>>>>,
    counters: Arc<StoreCounters>,
    connected: Arc<AtomicBool>,
    reachable: Arc<AtomicBool>,
    connection_id: String,
}

impl Default for MemoryBackingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackingStore {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(Trie::new())),
            tags: Arc::new(RwLock::new(HashMap::new())),
            counters: Arc::new(StoreCounters::default()),
            connected: Arc::new(AtomicBool::new(false)),
            reachable: Arc::new(AtomicBool::new(true)),
            connection_id: "memory-0".to_string(),
        }
    }

    /// Mark the store reachable or not; unreachable stores fail every call
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
        if !reachable {
            self.connected.store(false, Ordering::SeqCst);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.data.read().iter().filter(|(_, v)| !v.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_available(&self) -> Result<()> {
        if !self.reachable.load(Ordering::SeqCst) {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
            return Err(OrchestratorError::BackingStore(
                "backing store unreachable".to_string(),
            ));
        }
        if !self.connected.load(Ordering::SeqCst) {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
            return Err(OrchestratorError::BackingStore(
                "backing store not connected".to_string(),
            ));
        }
        Ok(())
    }

    fn observe(&self, started: Instant) {
        self.counters.calls.fetch_add(1, Ordering::Relaxed);
        self.counters
            .total_micros
            .fetch_add(started.elapsed().as_micros() as u64, Ordering::Relaxed);
    }

    /// Collect live keys matching `pattern`, using the trie for the literal prefix
    fn matching_keys(data: &Trie<String, StoredEntry>, pattern: &str) -> Vec<String> {
        let prefix = literal_prefix(pattern);
        let candidates: Vec<(&String, &StoredEntry)> = if prefix.is_empty() {
            data.iter().collect()
        } else {
            data.get_raw_descendant(prefix)
                .map(|subtrie| subtrie.iter().collect())
                .unwrap_or_default()
        };

        candidates
            .into_iter()
            .filter(|(k, v)| !v.is_expired() && glob_match(pattern, k))
            .map(|(k, _)| k.clone())
            .collect()
    }

    fn remove_keys(&self, keys: &[String]) -> usize {
        let mut data = self.data.write();
        let mut tags = self.tags.write();
        let mut removed = 0;

        for key in keys {
            if let Some(entry) = data.remove(key) {
                for tag in &entry.tags {
                    if let Some(members) = tags.get_mut(tag) {
                        members.remove(key);
                        if members.is_empty() {
                            tags.remove(tag);
                        }
                    }
                }
                removed += 1;
            }
        }

        removed
    }
}

#[async_trait]
impl BackingStore for MemoryBackingStore {
    async fn connect(&self) -> Result<()> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(OrchestratorError::ConnectionFailed(format!(
                "{} is unreachable",
                self.connection_id
            )));
        }
        self.connected.store(true, Ordering::SeqCst);
        // Errors are counted per connection
        self.counters.errors.store(0, Ordering::Relaxed);
        info!("Backing store connected ({})", self.connection_id);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        info!("Backing store disconnected ({})", self.connection_id);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_available()?;
        let started = Instant::now();

        let result = {
            let data = self.data.read();
            data.get(key)
                .filter(|entry| !entry.is_expired())
                .map(|entry| entry.data.clone())
        };

        if result.is_some() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
        }
        self.observe(started);

        Ok(result)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.set_with_tags(key, value, ttl, &[]).await
    }

    async fn set_with_tags(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
        tags: &[String],
    ) -> Result<()> {
        self.ensure_available()?;
        let started = Instant::now();
        debug!("SET key={}, size={}, ttl={:?}", key, value.len(), ttl);

        // Drop stale tag memberships of a previous value
        self.remove_keys(&[key.to_string()]);

        let entry = StoredEntry {
            data: value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
            tags: tags.to_vec(),
        };
        self.data.write().insert(key.to_string(), entry);

        if !tags.is_empty() {
            let mut index = self.tags.write();
            for tag in tags {
                index.entry(tag.clone()).or_default().insert(key.to_string());
            }
        }

        self.observe(started);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.ensure_available()?;
        Ok(self.remove_keys(&[key.to_string()]) > 0)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.ensure_available()?;
        let data = self.data.read();
        Ok(Self::matching_keys(&data, pattern))
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<usize> {
        self.ensure_available()?;
        let keys = {
            let data = self.data.read();
            Self::matching_keys(&data, pattern)
        };
        let removed = self.remove_keys(&keys);
        debug!("Deleted {} keys matching {}", removed, pattern);
        Ok(removed)
    }

    async fn delete_by_tags(&self, tags: &[String]) -> Result<usize> {
        self.ensure_available()?;
        let keys: Vec<String> = {
            let index = self.tags.read();
            let unique: HashSet<&String> = tags
                .iter()
                .filter_map(|tag| index.get(tag))
                .flatten()
                .collect();
            unique.into_iter().cloned().collect()
        };
        let removed = self.remove_keys(&keys);
        debug!("Deleted {} keys tagged {:?}", removed, tags);
        Ok(removed)
    }

    async fn clear(&self, namespace: &str) -> Result<usize> {
        if namespace.is_empty() || namespace.contains(['*', '?']) {
            warn!("Refusing to clear invalid namespace '{}'", namespace);
            return Err(OrchestratorError::InvalidPattern(format!(
                "invalid namespace '{}'",
                namespace
            )));
        }
        self.delete_by_pattern(&format!("{}:*", namespace)).await
    }

    async fn get_metrics(&self) -> Result<BackingStoreMetrics> {
        self.ensure_available()?;

        let used_memory: usize = self
            .data
            .read()
            .iter()
            .filter(|(_, v)| !v.is_expired())
            .map(|(k, v)| v.size(k))
            .sum();

        let calls = self.counters.calls.load(Ordering::Relaxed);
        let avg_response_time_ms = if calls == 0 {
            0.0
        } else {
            self.counters.total_micros.load(Ordering::Relaxed) as f64 / calls as f64 / 1000.0
        };

        Ok(BackingStoreMetrics {
            used_memory: used_memory as u64,
            keyspace_hits: self.counters.hits.load(Ordering::Relaxed),
            keyspace_misses: self.counters.misses.load(Ordering::Relaxed),
            avg_response_time_ms,
            errors: self.counters.errors.load(Ordering::Relaxed),
        })
    }

    async fn get_connection_status(&self) -> Result<HashMap<String, ConnectionStatus>> {
        let mut status = HashMap::new();
        status.insert(
            self.connection_id.clone(),
            ConnectionStatus {
                is_connected: self.is_connected(),
            },
        );
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connected_store() -> MemoryBackingStore {
        let store = MemoryBackingStore::new();
        store.connect().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_set_get() {
        let store = connected_store().await;
        store.set("users:1", b"alice".to_vec(), None).await.unwrap();

        assert_eq!(store.get("users:1").await.unwrap(), Some(b"alice".to_vec()));
        assert_eq!(store.get("users:2").await.unwrap(), None);

        let metrics = store.get_metrics().await.unwrap();
        assert_eq!(metrics.keyspace_hits, 1);
        assert_eq!(metrics.keyspace_misses, 1);
    }

    #[tokio::test]
    async fn test_requires_connection() {
        let store = MemoryBackingStore::new();
        assert!(store.get("users:1").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_by_pattern() {
        let store = connected_store().await;
        for i in 0..5 {
            store.set(&format!("users:{}", i), vec![i], None).await.unwrap();
        }
        store.set("content:1", vec![1], None).await.unwrap();

        let removed = store.delete_by_pattern("users:*").await.unwrap();
        assert_eq!(removed, 5);
        assert_eq!(store.get("users:3").await.unwrap(), None);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_wildcard_inside_pattern() {
        let store = connected_store().await;
        store.set("content:related:1:a", vec![1], None).await.unwrap();
        store.set("content:related:2:a", vec![1], None).await.unwrap();
        store.set("content:next:1:a", vec![1], None).await.unwrap();

        let keys = store.keys("content:*:1:*").await.unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(store.keys("*").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_delete_by_tags() {
        let store = connected_store().await;
        let tag = vec!["course:9".to_string()];
        store
            .set_with_tags("content:1", vec![1], None, &tag)
            .await
            .unwrap();
        store
            .set_with_tags("content:2", vec![2], None, &tag)
            .await
            .unwrap();
        store.set("content:3", vec![3], None).await.unwrap();

        assert_eq!(store.delete_by_tags(&tag).await.unwrap(), 2);
        assert_eq!(store.delete_by_tags(&tag).await.unwrap(), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_namespace() {
        let store = connected_store().await;
        store.set("session:a", vec![1], None).await.unwrap();
        store.set("sessions:a", vec![1], None).await.unwrap();

        assert_eq!(store.clear("session").await.unwrap(), 1);
        assert!(store.clear("*").await.is_err());
    }

    #[tokio::test]
    async fn test_ttl_expiration() {
        let store = connected_store().await;
        store
            .set("temp:1", vec![1], Some(Duration::from_millis(20)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(store.get("temp:1").await.unwrap(), None);
        assert!(store.keys("temp:*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable() {
        let store = connected_store().await;
        store.set_reachable(false);

        assert!(store.get_metrics().await.is_err());
        assert!(store.connect().await.is_err());
        let status = store.get_connection_status().await.unwrap();
        assert!(!status["memory-0"].is_connected);
    }

    #[tokio::test]
    async fn test_reconnect_resets_error_count() {
        let store = connected_store().await;
        store.set_reachable(false);
        for _ in 0..11 {
            assert!(store.get("users:1").await.is_err());
        }

        store.set_reachable(true);
        store.connect().await.unwrap();
        let metrics = store.get_metrics().await.unwrap();
        assert_eq!(metrics.errors, 0);
    }
}
