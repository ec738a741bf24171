//! Versioned schema migrations.

mod runner;
mod types;

pub use runner::{MigrationResult, MigrationRunner, MIGRATIONS_TABLE};
pub use types::{AppliedMigration, Migration, MigrationDirection, MigrationError};
