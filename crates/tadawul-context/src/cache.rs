//! TTL caches in front of upstream market data fetches
//!
//! Entries expire lazily: a read past the TTL misses and triggers a fetch.
//! Failed fetches are never stored.

use cached::{Cached, TimedCache};
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Thread-safe cache whose entries expire `ttl` after insertion
pub struct TtlCache<K, V> {
    name: &'static str,
    cache: Arc<RwLock<TimedCache<K, V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Clone + Debug,
    V: Clone,
{
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            cache: Arc::new(RwLock::new(TimedCache::with_lifespan(ttl))),
        }
    }

    /// Fresh value for `key`, if any
    async fn get(&self, key: &K) -> Option<V> {
        // cache_get evicts expired entries, so it needs the write lock
        let mut cache = self.cache.write().await;
        cache.cache_get(key).cloned()
    }

    async fn insert(&self, key: K, value: V) {
        let mut cache = self.cache.write().await;
        let _ = cache.cache_set(key, value);
    }

    /// Return the cached value or run `fetcher` and store its success.
    ///
    /// Concurrent misses on one key may both fetch; the later insert wins.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: K, fetcher: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key).await {
            tracing::debug!(cache = self.name, key = ?key, "cache hit");
            return Ok(value);
        }

        tracing::debug!(cache = self.name, key = ?key, "cache miss");
        let value = fetcher().await?;
        self.insert(key, value.clone()).await;
        Ok(value)
    }
}

impl<K, V> Clone for TtlCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            cache: Arc::clone(&self.cache),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_insert_and_get() {
        let cache: TtlCache<String, f64> = TtlCache::new("quotes", Duration::from_secs(60));
        cache.insert("2222.SR".to_string(), 27.5).await;

        assert_eq!(cache.get(&"2222.SR".to_string()).await, Some(27.5));
        assert_eq!(cache.get(&"1120.SR".to_string()).await, None);
    }

    #[tokio::test]
    async fn test_get_or_fetch_within_ttl() {
        let cache: TtlCache<String, f64> = TtlCache::new("quotes", Duration::from_secs(60));
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        for _ in 0..3 {
            let value = cache
                .get_or_fetch("2222.SR".to_string(), || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(27.5)
                })
                .await;
            assert_eq!(assert_ok!(value), 27.5);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expiry_triggers_one_more_fetch() {
        let cache: TtlCache<String, u32> = TtlCache::new("statistics", Duration::from_millis(50));
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let fetch = || async move { Ok::<_, String>(counter.fetch_add(1, Ordering::SeqCst) as u32) };

        assert_eq!(assert_ok!(cache.get_or_fetch("k".to_string(), fetch).await), 0);
        assert_eq!(assert_ok!(cache.get_or_fetch("k".to_string(), fetch).await), 0);

        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(assert_ok!(cache.get_or_fetch("k".to_string(), fetch).await), 1);
        assert_eq!(assert_ok!(cache.get_or_fetch("k".to_string(), fetch).await), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failures_not_cached() {
        let cache: TtlCache<String, u32> = TtlCache::new("quotes", Duration::from_secs(60));

        let failed = cache
            .get_or_fetch("k".to_string(), || async { Err::<u32, _>("boom") })
            .await;
        assert_err!(failed);
        assert!(cache.get(&"k".to_string()).await.is_none());

        let recovered = cache
            .get_or_fetch("k".to_string(), || async { Ok::<_, &str>(7) })
            .await;
        assert_eq!(assert_ok!(recovered), 7);
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let cache: TtlCache<String, u32> = TtlCache::new("history", Duration::from_secs(60));
        let shared = cache.clone();

        let stored = shared
            .get_or_fetch("2222.SR".to_string(), || async { Ok::<_, String>(3) })
            .await;
        assert_eq!(assert_ok!(stored), 3);

        let cached = cache
            .get_or_fetch("2222.SR".to_string(), || async { Err::<u32, _>("not called".to_string()) })
            .await;
        assert_eq!(assert_ok!(cached), 3);
    }
}
