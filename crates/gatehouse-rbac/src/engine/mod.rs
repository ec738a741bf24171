//! The authorization engine.
//!
//! [`Rbac`] owns a store and a cache and exposes the whole operation
//! surface: entity creation and bindings, lookups, role resolution and
//! permission checks. It holds no mutable state of its own, so clones are
//! cheap and share the same backends.

mod account;
mod entities;
mod permission;
mod resolve;

pub use permission::Decision;
pub use resolve::RoleResolution;

use crate::cache::{Cache, NoopCache};
use crate::cancel::{self, CancellationWatcher};
use crate::error::{RbacError, RbacResult};
use crate::store::{CachedStore, Entity, Query, Record, Store, StoreResult, Table};
use gatehouse_common_config::RbacSettings;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Engine tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RbacOptions {
    /// TTL of role-by-name lookups.
    pub role_name_ttl: Duration,
    /// TTL of cached effective-role sets.
    pub user_roles_ttl: Duration,
    /// Bound on every individual store call.
    pub store_timeout: Option<Duration>,
    /// Enables the query-result cache for queries flagged `use_cache`.
    pub query_cache_ttl: Option<Duration>,
}

impl Default for RbacOptions {
    fn default() -> Self {
        Self {
            role_name_ttl: Duration::from_secs(600),
            user_roles_ttl: Duration::from_secs(1800),
            store_timeout: None,
            query_cache_ttl: None,
        }
    }
}

impl From<&RbacSettings> for RbacOptions {
    fn from(settings: &RbacSettings) -> Self {
        let nonzero_ms = |ms: u64| (ms > 0).then(|| Duration::from_millis(ms));
        let nonzero_secs = |secs: u64| (secs > 0).then(|| Duration::from_secs(secs));
        Self {
            role_name_ttl: Duration::from_secs(settings.role_name_ttl_secs),
            user_roles_ttl: Duration::from_secs(settings.user_roles_ttl_secs),
            store_timeout: nonzero_ms(settings.store_timeout_ms),
            query_cache_ttl: nonzero_secs(settings.query_cache_ttl_secs),
        }
    }
}

/// RBAC engine over a shared store and cache.
#[derive(Clone)]
pub struct Rbac {
    store: Arc<dyn Store>,
    cache: Arc<dyn Cache>,
    options: RbacOptions,
}

impl Rbac {
    /// Engine with default options.
    pub fn new(store: Arc<dyn Store>, cache: Arc<dyn Cache>) -> Self {
        Self::with_options(store, cache, RbacOptions::default())
    }

    /// Engine without any caching.
    pub fn uncached(store: Arc<dyn Store>) -> Self {
        Self::new(store, Arc::new(NoopCache::new()))
    }

    pub fn with_options(store: Arc<dyn Store>, cache: Arc<dyn Cache>, options: RbacOptions) -> Self {
        let store: Arc<dyn Store> = match options.query_cache_ttl {
            Some(ttl) => Arc::new(CachedStore::new(store, cache.clone(), ttl)),
            None => store,
        };
        Self {
            store,
            cache,
            options,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    pub fn options(&self) -> &RbacOptions {
        &self.options
    }

    /// Race any engine future against a cancellation watcher.
    pub async fn run_cancellable<T, F>(&self, watcher: &CancellationWatcher, fut: F) -> RbacResult<T>
    where
        F: Future<Output = RbacResult<T>>,
    {
        cancel::run_cancellable(watcher, fut).await
    }

    /// Bound any engine future by a deadline.
    pub async fn run_with_deadline<T, F>(&self, deadline: Duration, fut: F) -> RbacResult<T>
    where
        F: Future<Output = RbacResult<T>>,
    {
        cancel::run_with_deadline(deadline, fut).await
    }

    async fn bounded<T, F>(&self, operation: &str, fut: F) -> RbacResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        let result = match self.options.store_timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => {
                    debug!(operation = operation, "store call timed out");
                    return Err(RbacError::DeadlineExceeded);
                }
            },
            None => fut.await,
        };
        result.map_err(|e| RbacError::store(operation, e))
    }

    /// Run a query and decode its rows.
    async fn select<E: Entity>(&self, operation: &str, query: Query) -> RbacResult<Vec<E>> {
        debug_assert_eq!(query.table, E::TABLE);
        let rows = self.bounded(operation, self.store.query(&query)).await?;
        rows.into_iter()
            .map(|row| E::from_record(row).map_err(|e| RbacError::store(operation, e)))
            .collect()
    }

    async fn exists(&self, operation: &str, query: Query) -> RbacResult<bool> {
        let rows = self.bounded(operation, self.store.query(&query)).await?;
        Ok(!rows.is_empty())
    }

    async fn insert<E: Entity>(&self, operation: &str, entity: &E) -> RbacResult<String> {
        let record = entity.to_record().map_err(|e| RbacError::store(operation, e))?;
        self.bounded(operation, self.store.insert(E::TABLE, record)).await
    }

    async fn remove(&self, operation: &str, table: Table, matcher: Record) -> RbacResult<u64> {
        self.bounded(operation, self.store.delete(table, matcher)).await
    }
}

fn require_id(kind: &str, id: &str) -> RbacResult<()> {
    if id.is_empty() {
        Err(RbacError::validation(format!("invalid {}: empty id", kind)))
    } else {
        Ok(())
    }
}

fn ids<'a, I>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    items.into_iter().map(str::to_string).collect()
}
