//! Keyed in-memory TTL cache.
//!
//! Each cache owns its entries, its lock and its TTL. Entries are superseded
//! wholesale on `put`; nothing merges into an existing value.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

#[derive(Debug)]
struct CacheInner<V> {
    map: HashMap<String, CacheEntry<V>>,
    default_ttl: Duration,
}

impl<V: Clone> CacheInner<V> {
    fn get(&self, key: &str, now: Instant) -> Option<V> {
        self.map
            .get(key)
            .filter(|entry| now < entry.expires_at)
            .map(|entry| entry.value.clone())
    }
}

/// Thread-safe TTL cache shared by clones of the same handle.
#[derive(Debug)]
pub struct CacheStore<V> {
    inner: Arc<tokio::sync::RwLock<CacheInner<V>>>,
}

impl<V> Clone for CacheStore<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Clone + Send + Sync> CacheStore<V> {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(tokio::sync::RwLock::new(CacheInner {
                map: HashMap::new(),
                default_ttl,
            })),
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Live value for `key`; expired entries are invisible.
    pub async fn get(&self, key: &str) -> Option<V> {
        self.inner.read().await.get(key, Instant::now())
    }

    /// Stores `value`, replacing any previous entry for `key`. Expired
    /// entries are reclaimed on the way.
    pub async fn put(&self, key: impl Into<String>, value: V, ttl_override: Option<Duration>) {
        let mut store = self.inner.write().await;
        let ttl = ttl_override.unwrap_or(store.default_ttl);
        if ttl.is_zero() {
            return;
        }

        let now = Instant::now();
        store.map.retain(|_, entry| entry.expires_at > now);
        store.map.insert(
            key.into(),
            CacheEntry {
                value,
                expires_at: now + ttl,
            },
        );
    }

    pub async fn invalidate(&self, key: &str) {
        self.inner.write().await.map.remove(key);
    }

    pub async fn clear(&self) {
        self.inner.write().await.map.clear();
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn ttl(&self) -> Duration {
        self.inner.read().await.default_ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn newer_value_supersedes_older() {
        let cache = CacheStore::new(Duration::from_secs(60));

        assert!(cache.get("AAPL").await.is_none());
        cache.put("AAPL", 189.5_f64, None).await;
        cache.put("AAPL", 190.25_f64, None).await;

        assert_eq!(cache.get("AAPL").await, Some(190.25));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn expired_entries_are_invisible_and_reclaimed() {
        let cache = CacheStore::new(Duration::from_millis(50));
        cache.put("005930.KS", 71_000_u64, None).await;
        assert!(cache.get("005930.KS").await.is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.get("005930.KS").await.is_none());

        cache.put("035720.KS", 45_000_u64, None).await;
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn ttl_override_wins_over_default() {
        let cache = CacheStore::new(Duration::from_secs(60));
        cache
            .put("MSFT", 1_u8, Some(Duration::from_millis(30)))
            .await;

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cache.get("MSFT").await.is_none());
    }

    #[tokio::test]
    async fn disabled_cache_stores_nothing() {
        let cache = CacheStore::disabled();
        cache.put("AAPL", 1_u8, None).await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn clones_share_entries() {
        let cache = CacheStore::new(Duration::from_secs(60));
        let handle = cache.clone();
        handle.put("NVDA", 3_u8, None).await;
        assert_eq!(cache.get("NVDA").await, Some(3));

        cache.invalidate("NVDA").await;
        assert!(handle.get("NVDA").await.is_none());
    }
}
