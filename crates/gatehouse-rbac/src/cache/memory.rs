//! In-memory cache implementation.

use super::r#trait::{Cache, CacheResult, CacheStats};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::debug;

/// In-memory cache entry.
struct CacheEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

type Entries = DashMap<String, CacheEntry>;

/// In-memory cache implementation.
///
/// Expired entries are dropped lazily on read; [`MemoryCache::with_sweeper`]
/// adds a periodic background sweep.
pub struct MemoryCache {
    entries: Arc<Entries>,
    max_size: usize,
    stats: CacheStatsInner,
}

#[derive(Default)]
struct CacheStatsInner {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Match `key` against a glob where `*` is the only wildcard.
pub(crate) fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }

    let (first, last) = (parts[0], parts[parts.len() - 1]);
    if !key.starts_with(first) || key.len() < first.len() + last.len() || !key.ends_with(last) {
        return false;
    }

    let mut rest = &key[first.len()..key.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    true
}

impl MemoryCache {
    /// Create a new in-memory cache with the specified maximum size.
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            max_size: max_size.max(1),
            stats: CacheStatsInner::default(),
        }
    }

    /// Create a cache that sweeps expired entries every `every`.
    ///
    /// The sweeper only starts inside a tokio runtime and stops once the
    /// cache is dropped.
    pub fn with_sweeper(max_size: usize, every: Duration) -> Self {
        let cache = Self::new(max_size);
        if tokio::runtime::Handle::try_current().is_ok() {
            Self::start_cleanup(Arc::downgrade(&cache.entries), every);
        }
        cache
    }

    fn start_cleanup(entries: Weak<Entries>, every: Duration) {
        tokio::spawn(async move {
            let mut cleanup_interval = interval(every);
            loop {
                cleanup_interval.tick().await;
                let Some(entries) = entries.upgrade() else {
                    break;
                };
                let now = Instant::now();
                let before = entries.len();
                entries.retain(|_, entry| entry.expires_at > now);
                let removed = before.saturating_sub(entries.len());
                if removed > 0 {
                    debug!(removed = removed, "Swept expired cache entries");
                }
            }
        });
    }

    /// Evict entries if the cache is at capacity.
    fn evict_if_needed(&self, incoming: &str) {
        if self.entries.len() < self.max_size || self.entries.contains_key(incoming) {
            return;
        }

        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);

        while self.entries.len() >= self.max_size {
            let soonest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().expires_at)
                .map(|entry| entry.key().clone());
            match soonest {
                Some(key) => {
                    self.entries.remove(&key);
                    self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get_raw(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = key, "Cache hit");
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove(key);
            debug!(key = key, "Cache miss (expired)");
        } else {
            debug!(key = key, "Cache miss");
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    async fn set_raw(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        self.evict_if_needed(key);

        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };

        self.entries.insert(key.to_string(), entry);
        debug!(key = key, ttl_secs = ttl.as_secs(), "Cache set");
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.remove(key);
        debug!(key = key, "Cache delete");
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64> {
        let mut deleted = 0;

        self.entries.retain(|k, _| {
            if glob_match(pattern, k) {
                deleted += 1;
                false
            } else {
                true
            }
        });

        debug!(pattern = pattern, deleted = deleted, "Cache delete pattern");
        Ok(deleted)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        match self.entries.get(key) {
            Some(entry) => Ok(entry.expires_at > Instant::now()),
            None => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        match self.entries.get(key) {
            Some(entry) => {
                let now = Instant::now();
                if entry.expires_at > now {
                    Ok(Some(entry.expires_at - now))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }

    async fn clear(&self) -> CacheResult<()> {
        self.entries.clear();
        debug!("Cache cleared");
        Ok(())
    }

    async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            size: self.entries.len() as u64,
            evictions: self.stats.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        let cases = vec![
            ("role:*", "role:role_name_admin", true),
            ("role:*", "query:abc", false),
            ("role:u1-*-role", "role:u1-acct-role", true),
            ("role:u1-*-role", "role:u2-acct-role", false),
            ("*", "anything", true),
            ("exact", "exact", true),
            ("exact", "exactly", false),
            ("a*b*c", "axxbyyc", true),
            ("a*b*c", "axxc", false),
            ("ab*ba", "aba", false),
        ];

        for (pattern, key, expected) in cases {
            assert_eq!(glob_match(pattern, key), expected, "{} vs {}", pattern, key);
        }
    }

    #[tokio::test]
    async fn test_set_get_and_stats() {
        let cache = MemoryCache::new(10);
        cache.set_raw("k", b"v".to_vec(), Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.get_raw("k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(cache.get_raw("missing").await.unwrap(), None);
        assert!(cache.exists("k").await.unwrap());
        assert!(cache.ttl("k").await.unwrap().is_some());

        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses, stats.size), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_expired_entries_miss() {
        let cache = MemoryCache::new(10);
        cache.set_raw("k", b"v".to_vec(), Duration::from_millis(5)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(cache.get_raw("k").await.unwrap(), None);
        assert!(!cache.exists("k").await.unwrap());
        assert_eq!(cache.stats().await.size, 0);
    }

    #[tokio::test]
    async fn test_capacity_evicts_soonest_expiring() {
        let cache = MemoryCache::new(2);
        cache.set_raw("short", vec![1], Duration::from_secs(1)).await.unwrap();
        cache.set_raw("long", vec![2], Duration::from_secs(600)).await.unwrap();
        cache.set_raw("new", vec![3], Duration::from_secs(600)).await.unwrap();

        assert!(!cache.exists("short").await.unwrap());
        assert!(cache.exists("long").await.unwrap());
        assert!(cache.exists("new").await.unwrap());
        assert_eq!(cache.stats().await.evictions, 1);
    }

    #[tokio::test]
    async fn test_overwrite_at_capacity_does_not_evict() {
        let cache = MemoryCache::new(1);
        cache.set_raw("k", vec![1], Duration::from_secs(60)).await.unwrap();
        cache.set_raw("k", vec![2], Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get_raw("k").await.unwrap(), Some(vec![2]));
        assert_eq!(cache.stats().await.evictions, 0);
    }

    #[tokio::test]
    async fn test_delete_pattern() {
        let cache = MemoryCache::new(10);
        for key in ["role:a", "role:b", "query:c"] {
            cache.set_raw(key, vec![0], Duration::from_secs(60)).await.unwrap();
        }
        assert_eq!(cache.delete_pattern("role:*").await.unwrap(), 2);
        assert!(cache.exists("query:c").await.unwrap());

        cache.clear().await.unwrap();
        assert_eq!(cache.stats().await.size, 0);
    }

    #[tokio::test]
    async fn test_sweeper_removes_expired() {
        let cache = MemoryCache::with_sweeper(10, Duration::from_millis(10));
        cache.set_raw("k", vec![0], Duration::from_millis(5)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.stats().await.size, 0);
    }
}
