//! Query-result caching decorator.

use super::{Query, Record, Store, StoreError, StoreResult, Table};
use crate::cache::{cache_get_or_miss, cache_set_or_log, keys, Cache};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Serves queries flagged `use_cache` from a [`Cache`].
///
/// Results are keyed by a digest of the serialized query. Empty results are
/// never cached, and writes go straight to the inner store without touching
/// cached entries.
pub struct CachedStore {
    inner: Arc<dyn Store>,
    cache: Arc<dyn Cache>,
    ttl: Duration,
}

impl CachedStore {
    pub fn new(inner: Arc<dyn Store>, cache: Arc<dyn Cache>, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }

    fn key(query: &Query) -> StoreResult<String> {
        let encoded = serde_json::to_vec(query).map_err(StoreError::from)?;
        let digest = format!("{:x}", Sha256::digest(&encoded));
        Ok(keys::query(&digest))
    }
}

#[async_trait]
impl Store for CachedStore {
    async fn insert(&self, table: Table, record: Record) -> StoreResult<String> {
        self.inner.insert(table, record).await
    }

    async fn delete(&self, table: Table, matcher: Record) -> StoreResult<u64> {
        self.inner.delete(table, matcher).await
    }

    async fn query(&self, query: &Query) -> StoreResult<Vec<Record>> {
        if !query.use_cache {
            return self.inner.query(query).await;
        }

        let key = Self::key(query)?;
        if let Some(rows) = cache_get_or_miss::<Vec<Record>>(self.cache.as_ref(), &key).await {
            debug!(table = %query.table, rows = rows.len(), "query served from cache");
            return Ok(rows);
        }

        let rows = self.inner.query(query).await?;
        if !rows.is_empty() {
            cache_set_or_log(self.cache.as_ref(), &key, &rows, self.ttl).await;
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::store::{matcher, MemoryStore};

    fn setup() -> (Arc<MemoryStore>, CachedStore) {
        let inner = Arc::new(MemoryStore::new());
        let cached = CachedStore::new(
            inner.clone(),
            Arc::new(MemoryCache::new(100)),
            Duration::from_secs(60),
        );
        (inner, cached)
    }

    #[tokio::test]
    async fn test_flagged_queries_are_cached() {
        let (inner, store) = setup();
        store
            .insert(Table::Resource, matcher([("id", ".api.v1.widgets")]))
            .await
            .unwrap();

        let q = Query::new(Table::Resource).eq(Table::Resource.col("id"), ".api.v1.widgets").use_cache();
        assert_eq!(store.query(&q).await.unwrap().len(), 1);
        assert_eq!(store.query(&q).await.unwrap().len(), 1);
        assert_eq!(inner.query_count(), 1);

        // TTL-only invalidation: the deleted row is still served.
        store
            .delete(Table::Resource, matcher([("id", ".api.v1.widgets")]))
            .await
            .unwrap();
        assert_eq!(store.query(&q).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unflagged_and_empty_results_bypass_cache() {
        let (inner, store) = setup();
        let q = Query::new(Table::Role);
        store.query(&q).await.unwrap();
        store.query(&q).await.unwrap();
        assert_eq!(inner.query_count(), 2);

        let q = Query::new(Table::Role).use_cache();
        store.query(&q).await.unwrap();
        store.query(&q).await.unwrap();
        assert_eq!(inner.query_count(), 4);
    }

    #[test]
    fn test_key_depends_on_query() {
        let a = Query::new(Table::Role).eq(Table::Role.col("name"), "a");
        let b = Query::new(Table::Role).eq(Table::Role.col("name"), "b");
        let ka = CachedStore::key(&a).unwrap();
        assert!(ka.starts_with("query:"));
        assert_eq!(ka.len(), "query:".len() + 64);
        assert_ne!(ka, CachedStore::key(&b).unwrap());
    }
}
