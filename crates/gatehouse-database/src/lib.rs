//! SQLite persistence for the Gatehouse RBAC engine.
//!
//! [`SqliteStore`] implements the engine's store contract on a `sqlx` pool.
//! The schema is versioned through [`migration::MigrationRunner`].

pub mod migration;
pub mod pool;
pub mod schema;
pub mod store;

pub use pool::{DatabasePool, PoolConfig, PoolError, PoolStats, SynchronousMode};
pub use store::SqliteStore;

use gatehouse_common_config::DatabaseConfig;
use migration::MigrationError;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
}

/// Open the configured database, migrating it when enabled.
pub async fn connect(config: &DatabaseConfig) -> Result<SqliteStore, DatabaseError> {
    let db = DatabasePool::new(PoolConfig::from(config)).await?;
    if config.run_migrations {
        let store = SqliteStore::migrated(db).await?;
        info!("Database schema is current");
        Ok(store)
    } else {
        Ok(SqliteStore::new(db))
    }
}
