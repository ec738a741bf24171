//! Redis cache implementation.

use super::r#trait::{Cache, CacheError, CacheResult, CacheStats};
use async_trait::async_trait;
use redis::AsyncCommands;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Redis cache implementation.
pub struct RedisCache {
    client: redis::Client,
    prefix: String,
    stats: CacheStatsInner,
}

#[derive(Default)]
struct CacheStatsInner {
    hits: AtomicU64,
    misses: AtomicU64,
}

fn backend(err: redis::RedisError) -> CacheError {
    CacheError::Backend(err.to_string())
}

impl RedisCache {
    /// Create a new Redis cache with the given URL and key prefix.
    pub fn new(url: &str, prefix: &str) -> CacheResult<Self> {
        let client = redis::Client::open(url).map_err(|e| CacheError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            prefix: prefix.to_string(),
            stats: CacheStatsInner::default(),
        })
    }

    /// Build a full key with prefix.
    fn key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.prefix, key)
        }
    }

    async fn get_connection(&self) -> CacheResult<redis::aio::Connection> {
        self.client
            .get_async_connection()
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get_raw(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.get_connection().await?;
        let result: Option<Vec<u8>> = conn.get(self.key(key)).await.map_err(backend)?;

        if result.is_some() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = key, "Redis cache hit");
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key = key, "Redis cache miss");
        }
        Ok(result)
    }

    async fn set_raw(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.get_connection().await?;

        let _: () = redis::cmd("SET")
            .arg(self.key(key))
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(backend)?;

        debug!(key = key, ttl_secs = ttl.as_secs(), "Redis cache set");
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.get_connection().await?;
        let _: () = conn.del(self.key(key)).await.map_err(backend)?;
        debug!(key = key, "Redis cache delete");
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64> {
        let mut conn = self.get_connection().await?;

        let keys: Vec<String> = conn.keys(self.key(pattern)).await.map_err(backend)?;
        if keys.is_empty() {
            return Ok(0);
        }

        let deleted: u64 = conn.del(&keys).await.map_err(backend)?;
        debug!(pattern = pattern, deleted = deleted, "Redis cache delete pattern");
        Ok(deleted)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.get_connection().await?;
        conn.exists(self.key(key)).await.map_err(backend)
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        let mut conn = self.get_connection().await?;
        let ttl: i64 = conn.ttl(self.key(key)).await.map_err(backend)?;

        if ttl > 0 {
            Ok(Some(Duration::from_secs(ttl as u64)))
        } else {
            Ok(None)
        }
    }

    async fn clear(&self) -> CacheResult<()> {
        self.delete_pattern("*").await?;
        Ok(())
    }

    async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            size: 0,
            evictions: 0,
        }
    }
}
