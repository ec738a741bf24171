use super::types::{AppliedMigration, Migration, MigrationDirection, MigrationError};
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info};

/// Bookkeeping table of applied migrations.
pub const MIGRATIONS_TABLE: &str = "_gatehouse_migrations";

/// Applies registered migrations in version order. Each migration runs in
/// its own transaction together with its bookkeeping row.
pub struct MigrationRunner {
    pool: SqlitePool,
    migrations: BTreeMap<i64, Migration>,
}

#[derive(Debug, Clone)]
pub struct MigrationResult {
    pub version: i64,
    pub name: String,
    pub direction: MigrationDirection,
    pub execution_time_ms: i64,
}

impl MigrationRunner {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            migrations: BTreeMap::new(),
        }
    }

    pub fn add_migration(&mut self, migration: Migration) {
        self.migrations.insert(migration.version, migration);
    }

    pub fn add_migrations(&mut self, migrations: impl IntoIterator<Item = Migration>) {
        for migration in migrations {
            self.add_migration(migration);
        }
    }

    pub async fn init(&self) -> Result<(), MigrationError> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                checksum TEXT NOT NULL,
                applied_at DATETIME NOT NULL,
                execution_time_ms INTEGER NOT NULL
            )"
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Highest applied version.
    pub async fn current_version(&self) -> Result<Option<i64>, MigrationError> {
        self.init().await?;
        let (version,): (Option<i64>,) =
            sqlx::query_as(&format!("SELECT MAX(version) FROM {MIGRATIONS_TABLE}"))
                .fetch_one(&self.pool)
                .await?;
        Ok(version)
    }

    pub async fn applied(&self) -> Result<Vec<AppliedMigration>, MigrationError> {
        self.init().await?;
        let applied = sqlx::query_as::<_, AppliedMigration>(&format!(
            "SELECT version, name, checksum, applied_at, execution_time_ms
             FROM {MIGRATIONS_TABLE}
             ORDER BY version"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(applied)
    }

    pub async fn pending(&self) -> Result<Vec<Migration>, MigrationError> {
        let current = self.current_version().await?.unwrap_or(0);
        Ok(self
            .migrations
            .range(current + 1..)
            .map(|(_, m)| m.clone())
            .collect())
    }

    /// Apply every pending migration.
    pub async fn run(&self) -> Result<Vec<MigrationResult>, MigrationError> {
        let mismatches = self.verify().await?;
        if !mismatches.is_empty() {
            return Err(MigrationError::ChecksumMismatch(mismatches.join("; ")));
        }

        let mut results = Vec::new();
        for migration in self.pending().await? {
            results.push(self.apply(&migration, MigrationDirection::Up).await?);
        }
        if results.is_empty() {
            debug!("Schema is up to date");
        }
        Ok(results)
    }

    /// Roll back every applied migration above `target`, newest first.
    pub async fn rollback_to(&self, target: i64) -> Result<Vec<MigrationResult>, MigrationError> {
        let current = self.current_version().await?.unwrap_or(0);
        let mut results = Vec::new();
        if target >= current {
            return Ok(results);
        }
        for (_, migration) in self.migrations.range(target + 1..=current).rev() {
            results.push(self.apply(migration, MigrationDirection::Down).await?);
        }
        Ok(results)
    }

    /// Describe applied migrations whose script changed or disappeared.
    pub async fn verify(&self) -> Result<Vec<String>, MigrationError> {
        let mut mismatches = Vec::new();
        for applied in self.applied().await? {
            match self.migrations.get(&applied.version) {
                Some(known) if known.checksum != applied.checksum => mismatches.push(format!(
                    "migration {} expected {}, found {}",
                    applied.version, known.checksum, applied.checksum
                )),
                Some(_) => {}
                None => mismatches.push(format!(
                    "migration {} is applied but not registered",
                    applied.version
                )),
            }
        }
        Ok(mismatches)
    }

    async fn apply(
        &self,
        migration: &Migration,
        direction: MigrationDirection,
    ) -> Result<MigrationResult, MigrationError> {
        self.init().await?;
        let start = Instant::now();
        let script = match direction {
            MigrationDirection::Up => migration.up_sql.as_str(),
            MigrationDirection::Down => migration
                .down_sql
                .as_deref()
                .ok_or(MigrationError::Irreversible(migration.version))?,
        };
        info!(
            version = migration.version,
            name = %migration.name,
            ?direction,
            "Applying migration"
        );

        let failed = |e: sqlx::Error| MigrationError::ExecutionFailed {
            version: migration.version,
            message: e.to_string(),
        };

        let mut tx = self.pool.begin().await?;
        for statement in Migration::statements(script) {
            sqlx::query(statement).execute(&mut *tx).await.map_err(failed)?;
        }

        let elapsed = start.elapsed().as_millis() as i64;
        match direction {
            MigrationDirection::Up => {
                sqlx::query(&format!(
                    "INSERT INTO {MIGRATIONS_TABLE}
                     (version, name, checksum, applied_at, execution_time_ms)
                     VALUES (?, ?, ?, ?, ?)"
                ))
                .bind(migration.version)
                .bind(&migration.name)
                .bind(&migration.checksum)
                .bind(Utc::now())
                .bind(elapsed)
                .execute(&mut *tx)
                .await?;
            }
            MigrationDirection::Down => {
                sqlx::query(&format!("DELETE FROM {MIGRATIONS_TABLE} WHERE version = ?"))
                    .bind(migration.version)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;

        Ok(MigrationResult {
            version: migration.version,
            name: migration.name.clone(),
            direction,
            execution_time_ms: elapsed,
        })
    }
}
