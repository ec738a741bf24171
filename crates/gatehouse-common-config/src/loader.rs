//! Configuration file loading and parsing.

use crate::env::vars;
use crate::types::{CacheBackend, GatehouseConfig};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use thiserror::Error;

static ENV_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").expect("static regex"));

/// Config loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {source}")]
    ReadError {
        #[from]
        source: std::io::Error,
    },

    #[error("invalid YAML at line {}: {message}", line.map(|l| l.to_string()).unwrap_or_else(|| "unknown".to_string()))]
    ParseError { line: Option<usize>, message: String },

    #[error("validation error: {message}")]
    ValidationError { message: String },

    #[error("environment variable not found: {var}")]
    EnvVarNotFound { var: String },
}

/// Configuration loader.
pub struct ConfigLoader {
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Create a loader for `.gatehouse/config.yaml` under the project directory.
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        Self {
            config_path: project_dir.as_ref().join(".gatehouse/config.yaml"),
        }
    }

    /// Create a loader for an explicit file.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
        }
    }

    /// Loader honouring `GATEHOUSE_CONFIG_PATH`, else the current directory.
    pub fn from_env() -> Self {
        match std::env::var(vars::GATEHOUSE_CONFIG_PATH) {
            Ok(path) if !path.is_empty() => Self::from_file(path),
            _ => Self::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Load the configuration, or defaults when the file does not exist.
    pub fn load(&self) -> Result<GatehouseConfig, ConfigError> {
        if !self.config_path.exists() {
            return Ok(GatehouseConfig::default());
        }

        let contents = std::fs::read_to_string(&self.config_path)?;
        let expanded = self.expand_env_vars(&contents)?;

        let config: GatehouseConfig = serde_yaml::from_str(&expanded).map_err(|e| ConfigError::ParseError {
            line: e.location().map(|l| l.line()),
            message: e.to_string(),
        })?;

        self.validate(&config)?;
        Ok(config)
    }

    /// Expand environment variables in the form `${VAR}` or `${VAR:-default}`.
    fn expand_env_vars(&self, content: &str) -> Result<String, ConfigError> {
        let mut result = content.to_string();

        for cap in ENV_REFERENCE.captures_iter(content) {
            let Some(full_match) = cap.get(0) else {
                continue;
            };
            let var_name = &cap[1];
            let default = cap.get(2).map(|m| m.as_str());

            let value = match std::env::var(var_name) {
                Ok(v) => v,
                Err(_) => match default {
                    Some(d) => d.to_string(),
                    None => {
                        return Err(ConfigError::EnvVarNotFound {
                            var: var_name.to_string(),
                        })
                    }
                },
            };

            result = result.replace(full_match.as_str(), &value);
        }

        Ok(result)
    }

    /// Validate configuration values.
    pub fn validate(&self, config: &GatehouseConfig) -> Result<(), ConfigError> {
        let fail = |message: &str| {
            Err(ConfigError::ValidationError {
                message: message.to_string(),
            })
        };

        if config.database.url.is_empty() {
            return fail("database.url must not be empty");
        }
        if config.database.max_connections == 0 {
            return fail("database.max_connections must be greater than 0");
        }
        if config.database.min_connections > config.database.max_connections {
            return fail("database.min_connections must not exceed max_connections");
        }

        if config.cache.backend == CacheBackend::Memory && config.cache.max_entries == 0 {
            return fail("cache.max_entries must be greater than 0");
        }
        if config.cache.backend == CacheBackend::Redis
            && config.cache.redis_url.as_deref().map_or(true, str::is_empty)
        {
            return fail("cache.redis_url is required for the redis backend");
        }

        if config.rbac.role_name_ttl_secs == 0 {
            return fail("rbac.role_name_ttl_secs must be greater than 0");
        }
        if config.rbac.user_roles_ttl_secs == 0 {
            return fail("rbac.user_roles_ttl_secs must be greater than 0");
        }

        Ok(())
    }

    /// Save configuration to file.
    pub fn save(&self, config: &GatehouseConfig) -> Result<(), ConfigError> {
        if let Some(dir) = self.config_path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let yaml = serde_yaml::to_string(config).map_err(|e| ConfigError::ParseError {
            line: None,
            message: e.to_string(),
        })?;

        std::fs::write(&self.config_path, yaml)?;
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new(std::env::current_dir().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_config(dir: &Path, contents: &str) {
        let config_dir = dir.join(".gatehouse");
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join("config.yaml"), contents).unwrap();
    }

    #[test]
    fn test_load_defaults_when_no_file() {
        let dir = tempdir().unwrap();
        let config = ConfigLoader::new(dir.path()).load().unwrap();
        assert_eq!(config, GatehouseConfig::default());
    }

    #[test]
    fn test_load_config_from_yaml_file() {
        let dir = tempdir().unwrap();
        write_config(
            dir.path(),
            r#"
database:
  url: "sqlite::memory:"
  max_connections: 2
cache:
  backend: none
rbac:
  role_name_ttl_secs: 30
  store_timeout_ms: 250
"#,
        );

        let config = ConfigLoader::new(dir.path()).load().unwrap();

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.database.max_connections, 2);
        assert_eq!(config.cache.backend, CacheBackend::None);
        assert_eq!(config.rbac.role_name_ttl_secs, 30);
        assert_eq!(config.rbac.store_timeout_ms, 250);
        assert_eq!(config.rbac.user_roles_ttl_secs, 1800);
    }

    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("GATEHOUSE_TEST_EXPAND", "test_value");
        let loader = ConfigLoader::new(".");
        let result = loader.expand_env_vars("key: ${GATEHOUSE_TEST_EXPAND}").unwrap();
        assert_eq!(result, "key: test_value");
        std::env::remove_var("GATEHOUSE_TEST_EXPAND");
    }

    #[test]
    fn test_env_var_default() {
        let loader = ConfigLoader::new(".");
        let result = loader.expand_env_vars("key: ${GATEHOUSE_NONEXISTENT:-default}").unwrap();
        assert_eq!(result, "key: default");
    }

    #[test]
    fn test_env_var_missing_error() {
        let loader = ConfigLoader::new(".");
        match loader.expand_env_vars("key: ${GATEHOUSE_MISSING_VAR}").unwrap_err() {
            ConfigError::EnvVarNotFound { var } => assert_eq!(var, "GATEHOUSE_MISSING_VAR"),
            other => panic!("Expected EnvVarNotFound error, got {other:?}"),
        }
    }

    #[test]
    fn test_env_var_expansion_in_config() {
        std::env::set_var("GATEHOUSE_TEST_REDIS", "redis://cache:6379");

        let dir = tempdir().unwrap();
        write_config(
            dir.path(),
            r#"
cache:
  backend: redis
  redis_url: ${GATEHOUSE_TEST_REDIS}
rbac:
  user_roles_ttl_secs: ${GATEHOUSE_TEST_TTL:-90}
"#,
        );

        let config = ConfigLoader::new(dir.path()).load().unwrap();
        assert_eq!(config.cache.redis_url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.rbac.user_roles_ttl_secs, 90);

        std::env::remove_var("GATEHOUSE_TEST_REDIS");
    }

    #[test]
    fn test_validation_errors() {
        let loader = ConfigLoader::new(".");
        let cases: Vec<(fn(&mut GatehouseConfig), &str)> = vec![
            (|c| c.database.max_connections = 0, "max_connections"),
            (|c| c.database.min_connections = 50, "min_connections"),
            (|c| c.cache.max_entries = 0, "max_entries"),
            (|c| c.cache.backend = CacheBackend::Redis, "redis_url"),
            (|c| c.rbac.role_name_ttl_secs = 0, "role_name_ttl_secs"),
            (|c| c.rbac.user_roles_ttl_secs = 0, "user_roles_ttl_secs"),
        ];

        for (mutate, field) in cases {
            let mut config = GatehouseConfig::default();
            mutate(&mut config);
            match loader.validate(&config).unwrap_err() {
                ConfigError::ValidationError { message } => assert!(message.contains(field), "{message}"),
                other => panic!("Expected ValidationError, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_parse_error_with_line_number() {
        let dir = tempdir().unwrap();
        write_config(
            dir.path(),
            r#"
rbac:
  role_name_ttl_secs: 10
  broken: [unclosed
"#,
        );

        match ConfigLoader::new(dir.path()).load().unwrap_err() {
            ConfigError::ParseError { line, .. } => assert!(line.is_some()),
            other => panic!("Expected ParseError with line number, got {other:?}"),
        }
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let loader = ConfigLoader::new(dir.path());

        let mut config = GatehouseConfig::default();
        config.rbac.query_cache_ttl_secs = 15;
        config.database.url = "sqlite://custom.db".to_string();
        loader.save(&config).unwrap();

        assert!(dir.path().join(".gatehouse/config.yaml").exists());
        assert_eq!(loader.load().unwrap(), config);
    }

    #[test]
    fn test_from_file_reads_explicit_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.yaml");
        fs::write(&path, "rbac:\n  store_timeout_ms: 5\n").unwrap();

        let config = ConfigLoader::from_file(&path).load().unwrap();
        assert_eq!(config.rbac.store_timeout_ms, 5);
    }
}
