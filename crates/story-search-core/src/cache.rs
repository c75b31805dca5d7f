//! ============================================================================
//! Query Cache - TTL memoization of embeddings keyed by exact text
//! ============================================================================
//! Expiry is lazy: a stale entry is removed when it is next looked up.
//! Size is bounded by `max_entries`; at capacity the oldest entry is
//! evicted before inserting a new key.
//! ============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::CacheConfig;

#[derive(Debug, Clone)]
struct CacheEntry {
    embedding: Vec<f32>,
    timestamp: Instant,
}

/// Embedding cache with time-to-live
pub struct QueryCache {
    enabled: bool,
    ttl: Duration,
    max_entries: usize,
    entries: RwLock<HashMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            enabled: config.enabled,
            ttl: config.ttl(),
            max_entries: config.max_entries.max(1),
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// A cache whose `get` always misses and whose `set` does nothing
    pub fn disabled() -> Self {
        Self::new(&CacheConfig {
            enabled: false,
            ..Default::default()
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub async fn get(&self, text: &str) -> Option<Vec<f32>> {
        if !self.enabled {
            return None;
        }

        {
            let entries = self.entries.read().await;
            match entries.get(text) {
                Some(entry) if entry.timestamp.elapsed() <= self.ttl => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.embedding.clone());
                }
                Some(_) => {}
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }

        // Expired: drop it unless a concurrent `set` refreshed it meanwhile
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(text) {
            if entry.timestamp.elapsed() <= self.ttl {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.embedding.clone());
            }
            entries.remove(text);
            debug!("Evicted expired cache entry ({} chars)", text.len());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub async fn set(&self, text: &str, embedding: Vec<f32>) {
        if !self.enabled {
            return;
        }

        let mut entries = self.entries.write().await;
        if entries.len() >= self.max_entries && !entries.contains_key(text) {
            if let Some(oldest_key) = entries
                .iter()
                .min_by_key(|(_, v)| v.timestamp)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest_key);
                warn!("Query cache at capacity ({}), evicted oldest entry", self.max_entries);
            }
        }
        entries.insert(
            text.to_string(),
            CacheEntry {
                embedding,
                timestamp: Instant::now(),
            },
        );
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        let count = entries.len();
        entries.clear();
        debug!("Cleared {} cached query embeddings", count);
    }

    /// Number of stored entries, expired ones included until looked up
    pub async fn size(&self) -> usize {
        self.entries.read().await.len()
    }

    /// (hits, misses) since creation
    pub fn hit_stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with(ttl_secs: u64, max_entries: usize) -> QueryCache {
        QueryCache::new(&CacheConfig {
            enabled: true,
            ttl_secs,
            max_entries,
        })
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = cache_with(60, 10);
        cache.set("romantic partner", vec![0.1, 0.2]).await;
        assert_eq!(cache.get("romantic partner").await, Some(vec![0.1, 0.2]));
        assert_eq!(cache.size().await, 1);
    }

    #[tokio::test]
    async fn test_keys_are_not_normalized() {
        let cache = cache_with(60, 10);
        cache.set("Art", vec![1.0]).await;
        assert!(cache.get("art").await.is_none());
        assert!(cache.get("Art ").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = cache_with(30, 10);
        cache.set("query", vec![1.0]).await;

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cache.get("query").await.is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("query").await.is_none());
        assert_eq!(cache.size().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_oldest() {
        let cache = cache_with(3600, 2);
        cache.set("first", vec![1.0]).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.set("second", vec![2.0]).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.set("third", vec![3.0]).await;

        assert_eq!(cache.size().await, 2);
        assert!(cache.get("first").await.is_none());
        assert_eq!(cache.get("third").await, Some(vec![3.0]));
    }

    #[tokio::test]
    async fn test_disabled_cache_is_noop() {
        let cache = QueryCache::disabled();
        cache.set("query", vec![1.0]).await;
        assert!(cache.get("query").await.is_none());
        assert_eq!(cache.size().await, 0);
        assert!(!cache.is_enabled());
    }

    #[tokio::test]
    async fn test_clear_and_stats() {
        let cache = cache_with(60, 10);
        cache.set("a", vec![1.0]).await;
        cache.get("a").await;
        cache.get("b").await;
        assert_eq!(cache.hit_stats(), (1, 1));
        cache.clear().await;
        assert_eq!(cache.size().await, 0);
    }
}
