//! Configuration types for Gatehouse.
//!
//! This crate provides the configuration used by Gatehouse services,
//! read from `.gatehouse/config.yaml` files.

pub mod env;
pub mod loader;
pub mod types;

pub use env::*;
pub use loader::*;
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_sensible_values() {
        let config = GatehouseConfig::default();

        assert_eq!(config.database.url, "sqlite://gatehouse.db");
        assert_eq!(config.database.max_connections, 10);
        assert!(config.database.run_migrations);

        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.cache.max_entries, 10_000);
        assert!(config.cache.redis_url.is_none());

        assert_eq!(config.rbac.role_name_ttl_secs, 600);
        assert_eq!(config.rbac.user_roles_ttl_secs, 1800);
        assert_eq!(config.rbac.store_timeout_ms, 0);
        assert_eq!(config.rbac.query_cache_ttl_secs, 0);
    }

    #[test]
    fn test_config_serializes_to_yaml() {
        let yaml = serde_yaml::to_string(&GatehouseConfig::default()).unwrap();

        assert!(yaml.contains("database:"));
        assert!(yaml.contains("cache:"));
        assert!(yaml.contains("rbac:"));
        assert!(yaml.contains("backend: memory"));
        assert!(yaml.contains("role_name_ttl_secs: 600"));
    }

    #[test]
    fn test_partial_configs_merge_with_defaults() {
        let partial_yaml = r#"
cache:
  backend: redis
  redis_url: redis://localhost:6379
rbac:
  user_roles_ttl_secs: 60
"#;

        let config: GatehouseConfig = serde_yaml::from_str(partial_yaml).unwrap();

        assert_eq!(config.cache.backend, CacheBackend::Redis);
        assert_eq!(config.cache.redis_url.as_deref(), Some("redis://localhost:6379"));
        assert_eq!(config.rbac.user_roles_ttl_secs, 60);

        assert_eq!(config.rbac.role_name_ttl_secs, 600);
        assert_eq!(config.cache.key_prefix, "gatehouse");
        assert_eq!(config.database.max_connections, 10);
    }
}
