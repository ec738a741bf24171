//! Wiring of the engine from configuration.

use anyhow::{bail, Context};
use gatehouse_common_config::{
    vars, CacheBackend, CacheConfig, ConfigLoader, Environment, GatehouseConfig,
};
use gatehouse_common_log::LogConfig;
use gatehouse_rbac::cache::{Cache, MemoryCache, NoopCache};
use gatehouse_rbac::{Rbac, RbacOptions};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Load `.env` files and `<project_dir>/.gatehouse/config.yaml`, then apply
/// the `GATEHOUSE_DATABASE_URL` and `GATEHOUSE_REDIS_URL` overrides.
pub fn load_config(project_dir: impl AsRef<Path>) -> anyhow::Result<GatehouseConfig> {
    Environment::init()?;
    let loader = ConfigLoader::new(project_dir);
    let mut config = loader
        .load()
        .with_context(|| format!("loading {}", loader.path().display()))?;

    if let Some(url) = Environment::get(vars::GATEHOUSE_DATABASE_URL) {
        config.database.url = url;
    }
    if let Some(url) = Environment::get(vars::GATEHOUSE_REDIS_URL) {
        config.cache.redis_url = Some(url);
    }
    loader.validate(&config)?;
    Ok(config)
}

pub fn build_cache(config: &CacheConfig) -> anyhow::Result<Arc<dyn Cache>> {
    let cache: Arc<dyn Cache> = match config.backend {
        CacheBackend::None => Arc::new(NoopCache::new()),
        CacheBackend::Memory if config.sweep_interval_secs > 0 => Arc::new(MemoryCache::with_sweeper(
            config.max_entries,
            Duration::from_secs(config.sweep_interval_secs),
        )),
        CacheBackend::Memory => Arc::new(MemoryCache::new(config.max_entries)),
        CacheBackend::Redis => redis_cache(config)?,
    };
    Ok(cache)
}

#[cfg(feature = "redis")]
fn redis_cache(config: &CacheConfig) -> anyhow::Result<Arc<dyn Cache>> {
    let Some(url) = config.redis_url.as_deref() else {
        bail!("cache.redis_url is required for the redis backend");
    };
    let cache = gatehouse_rbac::cache::RedisCache::new(url, &config.key_prefix)?;
    Ok(Arc::new(cache))
}

#[cfg(not(feature = "redis"))]
fn redis_cache(_config: &CacheConfig) -> anyhow::Result<Arc<dyn Cache>> {
    bail!("the redis cache backend needs the `redis` feature")
}

/// Open the store and cache and build the engine.
pub async fn build_rbac(config: &GatehouseConfig) -> anyhow::Result<Arc<Rbac>> {
    let store = gatehouse_database::connect(&config.database)
        .await
        .with_context(|| format!("opening {}", config.database.url))?;
    let cache = build_cache(&config.cache)?;
    info!(cache = ?config.cache.backend, "Authorization engine ready");
    Ok(Arc::new(Rbac::with_options(
        Arc::new(store),
        cache,
        RbacOptions::from(&config.rbac),
    )))
}

/// Install the global subscriber from `GATEHOUSE_LOG_*`.
pub fn init_logging() -> anyhow::Result<()> {
    gatehouse_common_log::init(LogConfig::from_env())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_backends() {
        let none = build_cache(&CacheConfig {
            backend: CacheBackend::None,
            ..Default::default()
        })
        .unwrap();
        none.set_raw("k", b"v".to_vec(), Duration::from_secs(60)).await.unwrap();
        assert!(none.get_raw("k").await.unwrap().is_none());

        let memory = build_cache(&CacheConfig::default()).unwrap();
        memory.set_raw("k", b"v".to_vec(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(memory.get_raw("k").await.unwrap().as_deref(), Some(&b"v"[..]));
    }

    #[cfg(not(feature = "redis"))]
    #[test]
    fn test_redis_needs_feature() {
        let config = CacheConfig {
            backend: CacheBackend::Redis,
            redis_url: Some("redis://localhost".into()),
            ..Default::default()
        };
        assert!(build_cache(&config).is_err());
    }
}
