//! Configuration types.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatehouseConfig {
    /// Persistence settings.
    pub database: DatabaseConfig,
    /// Cache backend settings.
    pub cache: CacheConfig,
    /// Engine tuning.
    pub rbac: RbacSettings,
}

/// SQLite store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection URL.
    pub url: String,
    /// Maximum pool connections.
    pub max_connections: u32,
    /// Minimum idle connections.
    pub min_connections: u32,
    /// Connection acquire timeout (seconds).
    pub acquire_timeout_secs: u64,
    /// Apply pending schema migrations on startup.
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://gatehouse.db".to_string(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_secs: 30,
            run_migrations: true,
        }
    }
}

/// Which cache backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    /// Caching disabled.
    None,
    /// In-process cache.
    #[default]
    Memory,
    /// Shared Redis cache.
    Redis,
}

/// Cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// Capacity of the in-process cache.
    pub max_entries: usize,
    /// Expired-entry sweep interval of the in-process cache (seconds, 0 disables).
    pub sweep_interval_secs: u64,
    /// Redis connection URL, required for the redis backend.
    pub redis_url: Option<String>,
    /// Prefix of every Redis key.
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            max_entries: 10_000,
            sweep_interval_secs: 60,
            redis_url: None,
            key_prefix: "gatehouse".to_string(),
        }
    }
}

/// Engine TTLs and bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RbacSettings {
    /// TTL of role-by-name lookups (seconds).
    pub role_name_ttl_secs: u64,
    /// TTL of cached effective-role sets (seconds).
    pub user_roles_ttl_secs: u64,
    /// Bound on each store call (milliseconds, 0 is unbounded).
    pub store_timeout_ms: u64,
    /// TTL of cached query results (seconds, 0 disables the query cache).
    pub query_cache_ttl_secs: u64,
}

impl Default for RbacSettings {
    fn default() -> Self {
        Self {
            role_name_ttl_secs: 600,
            user_roles_ttl_secs: 1800,
            store_timeout_ms: 0,
            query_cache_ttl_secs: 0,
        }
    }
}
