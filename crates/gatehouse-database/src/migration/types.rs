use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("migration {version} failed: {message}")]
    ExecutionFailed { version: i64, message: String },

    #[error("migration {0} has no rollback script")]
    Irreversible(i64),

    #[error("migration checksum mismatch: {0}")]
    ChecksumMismatch(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// One schema step. Scripts may hold several statements separated by `;`.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub up_sql: String,
    pub down_sql: Option<String>,
    /// SHA-256 of `up_sql`, hex encoded.
    pub checksum: String,
}

impl Migration {
    pub fn new(version: i64, name: impl Into<String>, up_sql: impl Into<String>) -> Self {
        let up_sql = up_sql.into();
        Self {
            version,
            name: name.into(),
            checksum: Self::compute_checksum(&up_sql),
            up_sql,
            down_sql: None,
        }
    }

    pub fn with_down(mut self, down_sql: impl Into<String>) -> Self {
        self.down_sql = Some(down_sql.into());
        self
    }

    pub fn compute_checksum(sql: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(sql.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Non-empty statements of a script.
    pub fn statements(sql: &str) -> impl Iterator<Item = &str> {
        sql.split(';').map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppliedMigration {
    pub version: i64,
    pub name: String,
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
    pub execution_time_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationDirection {
    Up,
    Down,
}
