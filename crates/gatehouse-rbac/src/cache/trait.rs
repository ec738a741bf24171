//! Cache trait definition.

use async_trait::async_trait;
use std::time::Duration;

/// Cache operation result.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Connection error: {0}")]
    Connection(String),
}

/// Cache backend trait.
///
/// Values are opaque bytes; typed access goes through the helpers in
/// [`super::helpers`] so the trait stays usable as `dyn Cache`.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Get a value, `None` when absent or expired.
    async fn get_raw(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Set a value with TTL.
    async fn set_raw(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()>;

    /// Delete a value from cache.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Delete all keys matching a `*` glob pattern.
    async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64>;

    /// Check if key exists.
    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Get time to live for key.
    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>>;

    /// Clear all cache entries.
    async fn clear(&self) -> CacheResult<()>;

    /// Get cache statistics.
    async fn stats(&self) -> CacheStats;
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
