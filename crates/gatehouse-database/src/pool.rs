//! SQLite connection pool.

use gatehouse_common_config::DatabaseConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to open connection pool: {0}")]
    Creation(#[from] sqlx::Error),

    #[error("pool health check failed: {0}")]
    HealthCheck(String),

    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),
}

/// In-memory database path.
pub const MEMORY_PATH: &str = ":memory:";

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Database file path, or `:memory:`.
    pub database_path: String,
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// Idle connections are closed after this long. Ignored in memory.
    pub idle_timeout: Option<Duration>,
    /// Write-ahead logging. Ignored in memory.
    pub wal_mode: bool,
    pub synchronous: SynchronousMode,
    /// How long a writer waits on a locked database.
    pub busy_timeout: Duration,
    pub create_if_missing: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SynchronousMode {
    Off,
    #[default]
    Normal,
    Full,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            database_path: "gatehouse.db".to_string(),
            min_connections: 1,
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            wal_mode: true,
            synchronous: SynchronousMode::Normal,
            busy_timeout: Duration::from_secs(5),
            create_if_missing: true,
        }
    }
}

impl PoolConfig {
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }

    /// A private in-memory database. Pinned to one connection that never
    /// idles out, since every SQLite memory connection is its own database.
    pub fn in_memory() -> Self {
        Self {
            database_path: MEMORY_PATH.to_string(),
            min_connections: 1,
            max_connections: 1,
            idle_timeout: None,
            wal_mode: false,
            ..Default::default()
        }
    }

    pub fn file(path: impl Into<String>) -> Self {
        Self {
            database_path: path.into(),
            ..Default::default()
        }
    }

    pub fn is_memory(&self) -> bool {
        self.database_path == MEMORY_PATH
    }

    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_connections == 0 {
            return Err(PoolError::InvalidConfig(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(PoolError::InvalidConfig(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }
        if self.is_memory() && self.max_connections > 1 {
            return Err(PoolError::InvalidConfig(
                "an in-memory database supports a single connection".to_string(),
            ));
        }
        if self.database_path.is_empty() {
            return Err(PoolError::InvalidConfig("database path is empty".to_string()));
        }
        Ok(())
    }
}

/// Strip the `sqlite:` scheme from a connection URL.
fn url_path(url: &str) -> &str {
    url.strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url)
}

impl From<&DatabaseConfig> for PoolConfig {
    fn from(config: &DatabaseConfig) -> Self {
        let path = url_path(&config.url);
        let base = if path == MEMORY_PATH {
            Self::in_memory()
        } else {
            Self {
                database_path: path.to_string(),
                min_connections: config.min_connections,
                max_connections: config.max_connections,
                ..Default::default()
            }
        };
        Self {
            acquire_timeout: Duration::from_secs(config.acquire_timeout_secs),
            ..base
        }
    }
}

#[derive(Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    pub fn database_path(mut self, path: impl Into<String>) -> Self {
        self.config.database_path = path.into();
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.config.min_connections = min;
        self
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.config.max_connections = max;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.config.acquire_timeout = timeout;
        self
    }

    pub fn wal_mode(mut self, enabled: bool) -> Self {
        self.config.wal_mode = enabled;
        self
    }

    pub fn synchronous(mut self, mode: SynchronousMode) -> Self {
        self.config.synchronous = mode;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.config.busy_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<PoolConfig, PoolError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Shared SQLite pool with `REGEXP` support on every connection.
#[derive(Debug, Clone)]
pub struct DatabasePool {
    pool: SqlitePool,
    config: PoolConfig,
}

impl DatabasePool {
    #[instrument(skip(config), fields(path = %config.database_path))]
    pub async fn new(config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;

        let pool = SqlitePoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(if config.is_memory() { None } else { config.idle_timeout })
            .max_lifetime(None)
            .connect_with(Self::connect_options(&config)?)
            .await?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        let db_pool = Self { pool, config };
        db_pool.health_check().await?;
        Ok(db_pool)
    }

    /// Open a private in-memory database.
    pub async fn in_memory() -> Result<Self, PoolError> {
        Self::new(PoolConfig::in_memory()).await
    }

    fn connect_options(config: &PoolConfig) -> Result<SqliteConnectOptions, PoolError> {
        let mut options = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.database_path))
            .map_err(|e| PoolError::InvalidConfig(e.to_string()))?
            .create_if_missing(config.create_if_missing)
            .busy_timeout(config.busy_timeout)
            .with_regexp();

        if config.wal_mode && !config.is_memory() {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        options = options.synchronous(match config.synchronous {
            SynchronousMode::Off => SqliteSynchronous::Off,
            SynchronousMode::Normal => SqliteSynchronous::Normal,
            SynchronousMode::Full => SqliteSynchronous::Full,
        });

        Ok(options)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), PoolError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PoolError::HealthCheck(e.to_string()))?;
        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            max_connections: self.config.max_connections,
        }
    }

    #[instrument(skip(self))]
    pub async fn close(&self) {
        info!("Closing database pool");
        self.pool.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    pub size: u32,
    pub idle: usize,
    pub max_connections: u32,
}

impl PoolStats {
    pub fn utilization(&self) -> f64 {
        if self.max_connections == 0 {
            return 0.0;
        }
        (self.size as f64 - self.idle as f64) / self.max_connections as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_pool() {
        let pool = DatabasePool::in_memory().await.unwrap();
        assert!(!pool.is_closed());
        pool.health_check().await.unwrap();
        assert!(pool.stats().utilization() <= 1.0);
        pool.close().await;
        assert!(pool.is_closed());
    }

    #[tokio::test]
    async fn test_regexp_is_available() {
        let pool = DatabasePool::in_memory().await.unwrap();
        let (hit,): (i64,) = sqlx::query_as("SELECT 'role-admin' REGEXP '^role-'")
            .fetch_one(pool.pool())
            .await
            .unwrap();
        assert_eq!(hit, 1);
    }

    #[test]
    fn test_builder_validation() {
        assert!(PoolConfig::builder()
            .min_connections(10)
            .max_connections(5)
            .build()
            .is_err());
        assert!(PoolConfig::builder()
            .database_path(MEMORY_PATH)
            .max_connections(4)
            .build()
            .is_err());

        let config = PoolConfig::builder()
            .database_path("/tmp/authz.db")
            .max_connections(4)
            .wal_mode(false)
            .build()
            .unwrap();
        assert_eq!(config.max_connections, 4);
        assert!(!config.wal_mode);
    }

    #[test]
    fn test_from_database_config() {
        let config = PoolConfig::from(&DatabaseConfig::default());
        assert_eq!(config.database_path, "gatehouse.db");
        assert_eq!(config.max_connections, 10);

        let memory = PoolConfig::from(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            ..Default::default()
        });
        assert!(memory.is_memory());
        assert_eq!(memory.max_connections, 1);
        assert!(memory.validate().is_ok());
    }
}
