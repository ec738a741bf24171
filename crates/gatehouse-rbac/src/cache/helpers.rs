//! Cache helper functions and patterns.

use super::r#trait::{Cache, CacheError, CacheResult};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Where a cache-aside value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Served from the cache.
    Hit,
    /// Fetched from the source.
    Miss,
}

impl CacheOutcome {
    pub fn is_hit(self) -> bool {
        self == Self::Hit
    }
}

/// Read and decode a JSON value.
pub async fn cache_get<T>(cache: &dyn Cache, key: &str) -> CacheResult<Option<T>>
where
    T: DeserializeOwned,
{
    match cache.get_raw(key).await? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| CacheError::Serialization(e.to_string())),
        None => Ok(None),
    }
}

/// Encode and write a JSON value.
pub async fn cache_set<T>(cache: &dyn Cache, key: &str, value: &T, ttl: Duration) -> CacheResult<()>
where
    T: Serialize + ?Sized,
{
    let bytes = serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
    cache.set_raw(key, bytes, ttl).await
}

/// Read a value, treating any cache failure as a miss.
pub async fn cache_get_or_miss<T>(cache: &dyn Cache, key: &str) -> Option<T>
where
    T: DeserializeOwned,
{
    match cache_get(cache, key).await {
        Ok(value) => value,
        Err(err) => {
            warn!(key = key, error = %err, "Cache read failed, falling back to source");
            None
        }
    }
}

/// Write a value, logging and ignoring failures.
pub async fn cache_set_or_log<T>(cache: &dyn Cache, key: &str, value: &T, ttl: Duration)
where
    T: Serialize + ?Sized,
{
    if let Err(err) = cache_set(cache, key, value, ttl).await {
        warn!(key = key, error = %err, "Cache write failed");
    }
}

/// Cache-aside pattern helper.
///
/// Tries to get a value from cache first. If not found, fetches from source,
/// stores in cache, and returns the value. The cache never fails the call: a
/// broken backend degrades to fetching every time.
pub async fn cache_aside<T, E, F, Fut>(
    cache: &dyn Cache,
    key: &str,
    ttl: Duration,
    fetch: F,
) -> Result<(T, CacheOutcome), E>
where
    T: Serialize + DeserializeOwned + Send + Sync,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if let Some(value) = cache_get_or_miss::<T>(cache, key).await {
        return Ok((value, CacheOutcome::Hit));
    }

    let value = fetch().await?;
    cache_set_or_log(cache, key, &value, ttl).await;

    Ok((value, CacheOutcome::Miss))
}

/// Cache key builder for consistent key generation.
pub struct CacheKeyBuilder {
    parts: Vec<String>,
}

impl CacheKeyBuilder {
    /// Create a new key builder with the given namespace.
    pub fn new(namespace: &str) -> Self {
        Self {
            parts: vec![namespace.to_string()],
        }
    }

    /// Add a part to the key.
    pub fn add(mut self, part: impl ToString) -> Self {
        self.parts.push(part.to_string());
        self
    }

    /// Build the final key by joining parts with colons.
    pub fn build(self) -> String {
        self.parts.join(":")
    }
}

/// Keys used by the engine.
pub mod keys {
    use super::CacheKeyBuilder;

    /// Namespace for role lookups.
    pub const ROLE_NAMESPACE: &str = "role";
    /// Namespace for cached store queries.
    pub const QUERY_NAMESPACE: &str = "query";

    /// Role looked up by name.
    pub fn role_name(name: &str) -> String {
        CacheKeyBuilder::new(ROLE_NAMESPACE)
            .add(format!("role_name_{}", name))
            .build()
    }

    /// Effective role set of a user within an account.
    ///
    /// The format is not injective when IDs contain `-`: `("a-b", "")` and
    /// `("a", "b-")` share `role:a-b--role`. Callers must use IDs without
    /// `-` at the user/account boundary, or accept that such pairs share a
    /// cached role set.
    pub fn user_roles(user_id: &str, account_id: &str) -> String {
        CacheKeyBuilder::new(ROLE_NAMESPACE)
            .add(format!("{}-{}-role", user_id, account_id))
            .build()
    }

    /// Result of a store query, by digest.
    pub fn query(digest: &str) -> String {
        CacheKeyBuilder::new(QUERY_NAMESPACE).add(digest).build()
    }
}
