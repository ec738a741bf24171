//! SQLite schema of the authorization tables.
//!
//! The DDL is derived from the shared table definitions so the SQL store and
//! the in-memory store cannot drift apart.

use crate::migration::Migration;
use gatehouse_rbac::store::{ColumnType, Table};

/// Columns with a lookup index besides the primary key.
const INDEXES: &[(Table, &str)] = &[
    (Table::Role, "name"),
    (Table::UserRole, "user_id"),
    (Table::UserGroup, "user_id"),
    (Table::AccountUserRole, "user_id"),
    (Table::AccountUserGroup, "user_id"),
    (Table::RoleResourcePermissions, "resource_id"),
];

pub(crate) fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn column_sql(kind: ColumnType) -> &'static str {
    match kind {
        ColumnType::Text => "TEXT NOT NULL DEFAULT ''",
        ColumnType::Integer | ColumnType::Boolean => "INTEGER NOT NULL DEFAULT 0",
    }
}

pub fn create_table_sql(table: Table) -> String {
    let mut lines: Vec<String> = table
        .columns()
        .iter()
        .map(|c| format!("    {} {}", quote(c.name), column_sql(c.kind)))
        .collect();
    let key: Vec<String> = table.primary_key().iter().map(|c| quote(c)).collect();
    lines.push(format!("    PRIMARY KEY ({})", key.join(", ")));
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
        quote(table.name()),
        lines.join(",\n")
    )
}

fn index_name(table: Table, column: &str) -> String {
    format!("idx_{}_{}", table.name(), column)
}

/// Migrations creating the authorization schema.
pub fn migrations() -> Vec<Migration> {
    let mut up: Vec<String> = Table::ALL.iter().map(|t| create_table_sql(*t)).collect();
    up.extend(INDEXES.iter().map(|(table, column)| {
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            quote(&index_name(*table, column)),
            quote(table.name()),
            quote(column)
        )
    }));

    let down: Vec<String> = Table::ALL
        .iter()
        .rev()
        .map(|t| format!("DROP TABLE IF EXISTS {}", quote(t.name())))
        .collect();

    vec![Migration::new(1, "authorization_schema", up.join(";\n")).with_down(down.join(";\n"))]
}
