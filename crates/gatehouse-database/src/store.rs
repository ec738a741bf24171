//! SQLite implementation of the store contract.
//!
//! Queries compile to a single `SELECT` over the target table. A join becomes
//! an `EXISTS` subquery, so each target row appears at most once no matter
//! how many join rows match. Unordered results follow insertion order.

use crate::migration::{MigrationError, MigrationRunner};
use crate::pool::DatabasePool;
use crate::schema::{self, quote};
use async_trait::async_trait;
use gatehouse_rbac::store::{
    record_key, value_text, Column, ColumnType, Direction, Predicate, Query, Record, Store,
    StoreError, StoreResult, Table, CREATED_TIMESTAMP, UPDATED_TIMESTAMP,
};
use regex::Regex;
use serde_json::Value;
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{QueryBuilder, Row};
use tracing::{debug, instrument, trace};

const TARGET: &str = "t";
const JOINED: &str = "j";

/// A value converted to its column's storage type.
enum Bound {
    Text(String),
    Integer(i64),
    Boolean(bool),
}

impl Bound {
    fn convert(kind: ColumnType, value: &Value) -> Option<Self> {
        match kind {
            ColumnType::Text => value_text(value).map(Self::Text),
            ColumnType::Integer => value
                .as_i64()
                .or_else(|| value_text(value).and_then(|t| t.parse().ok()))
                .map(Self::Integer),
            ColumnType::Boolean => match value {
                Value::Bool(b) => Some(*b),
                Value::Number(n) => n.as_i64().map(|n| n != 0),
                Value::String(s) => s.parse().ok(),
                _ => None,
            }
            .map(Self::Boolean),
        }
    }

    fn push(self, builder: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            Self::Text(v) => builder.push_bind(v),
            Self::Integer(v) => builder.push_bind(v),
            Self::Boolean(v) => builder.push_bind(v),
        };
    }
}

fn default_value(kind: ColumnType) -> Value {
    match kind {
        ColumnType::Text => Value::String(String::new()),
        ColumnType::Integer => Value::from(0),
        ColumnType::Boolean => Value::Bool(false),
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn column_kind(column: Column) -> StoreResult<ColumnType> {
    column
        .table
        .column_def(column.name)
        .map(|def| def.kind)
        .ok_or_else(|| StoreError::InvalidQuery(format!("unknown column {}", column)))
}

fn check_columns(table: Table, record: &Record) -> StoreResult<()> {
    match record.keys().find(|k| !table.has_column(k)) {
        Some(unknown) => Err(StoreError::InvalidQuery(format!(
            "unknown column {}.{}",
            table, unknown
        ))),
        None => Ok(()),
    }
}

/// Append one filter term. Values that cannot be stored in the column
/// match nothing.
fn push_predicate(
    builder: &mut QueryBuilder<'_, Sqlite>,
    alias: &str,
    predicate: &Predicate,
) -> StoreResult<()> {
    let column = predicate.column();
    let kind = column_kind(column)?;
    let target = format!("{alias}.{}", quote(column.name));

    match predicate {
        Predicate::Eq(_, Value::Null) => {
            builder.push(format!("{target} IS NULL"));
        }
        Predicate::Eq(_, value) => match Bound::convert(kind, value) {
            Some(bound) => {
                builder.push(format!("{target} = "));
                bound.push(builder);
            }
            None => {
                builder.push("1 = 0");
            }
        },
        Predicate::In(_, values) => {
            let bound: Vec<Bound> = values
                .iter()
                .filter_map(|v| Bound::convert(kind, &Value::from(v.as_str())))
                .collect();
            if bound.is_empty() {
                builder.push("1 = 0");
                return Ok(());
            }
            builder.push(format!("{target} IN ("));
            for (i, value) in bound.into_iter().enumerate() {
                if i > 0 {
                    builder.push(", ");
                }
                value.push(builder);
            }
            builder.push(")");
        }
        Predicate::Matches(_, pattern) => {
            Regex::new(pattern).map_err(|e| {
                StoreError::InvalidQuery(format!("bad pattern for {}: {}", column, e))
            })?;
            let subject = match kind {
                ColumnType::Text => target,
                _ => format!("CAST({target} AS TEXT)"),
            };
            builder.push(format!("{subject} REGEXP "));
            builder.push_bind(pattern.clone());
        }
    }
    Ok(())
}

fn select(query: &Query) -> StoreResult<QueryBuilder<'static, Sqlite>> {
    query.validate()?;

    let columns: Vec<String> = query
        .table
        .columns()
        .iter()
        .map(|c| format!("{TARGET}.{0} AS {0}", quote(c.name)))
        .collect();
    let mut builder = QueryBuilder::new(format!(
        "SELECT {} FROM {} AS {TARGET} WHERE 1 = 1",
        columns.join(", "),
        quote(query.table.name())
    ));

    let (own, joined): (Vec<&Predicate>, Vec<&Predicate>) = query
        .predicates
        .iter()
        .partition(|p| p.column().table == query.table);

    for predicate in own {
        builder.push(" AND ");
        push_predicate(&mut builder, TARGET, predicate)?;
    }

    if let Some(join) = query.join {
        builder.push(format!(
            " AND EXISTS (SELECT 1 FROM {} AS {JOINED} WHERE {JOINED}.{} = {TARGET}.{}",
            quote(join.table.name()),
            quote(join.foreign),
            quote(join.local)
        ));
        for predicate in joined {
            builder.push(" AND ");
            push_predicate(&mut builder, JOINED, predicate)?;
        }
        builder.push(")");
    }

    builder.push(" ORDER BY ");
    if let Some(order) = query.order_by {
        let direction = match order.direction {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };
        builder.push(format!("{TARGET}.{} {direction}, ", quote(order.column.name)));
    }
    builder.push(format!("{TARGET}.rowid"));
    Ok(builder)
}

fn read_row(table: Table, row: &SqliteRow) -> StoreResult<Record> {
    let mut record = Record::new();
    for column in table.columns() {
        let value = match column.kind {
            ColumnType::Text => row
                .try_get::<Option<String>, _>(column.name)
                .map(|v| v.map(Value::from)),
            ColumnType::Integer => row
                .try_get::<Option<i64>, _>(column.name)
                .map(|v| v.map(Value::from)),
            ColumnType::Boolean => row
                .try_get::<Option<i64>, _>(column.name)
                .map(|v| v.map(|n| Value::Bool(n != 0))),
        }
        .map_err(backend)?;
        record.insert(column.name.to_string(), value.unwrap_or(Value::Null));
    }
    Ok(record)
}

/// [`Store`] backed by a SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: DatabasePool,
}

impl SqliteStore {
    /// Wrap a pool whose schema is already in place.
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }

    /// Wrap a pool after applying pending schema migrations.
    pub async fn migrated(db: DatabasePool) -> Result<Self, MigrationError> {
        let mut runner = MigrationRunner::new(db.pool().clone());
        runner.add_migrations(schema::migrations());
        runner.run().await?;
        Ok(Self::new(db))
    }

    pub fn database(&self) -> &DatabasePool {
        &self.db
    }
}

#[async_trait]
impl Store for SqliteStore {
    #[instrument(skip(self, record), fields(table = %table))]
    async fn insert(&self, table: Table, mut record: Record) -> StoreResult<String> {
        check_columns(table, &record)?;

        for column in table.columns() {
            let value = record
                .entry(column.name.to_string())
                .or_insert_with(|| default_value(column.kind));
            if value.is_null() {
                *value = default_value(column.kind);
            }
        }

        if table.generates_id() {
            let empty = record.get("id").and_then(Value::as_str).map(str::is_empty).unwrap_or(true);
            if empty {
                record.insert("id".into(), Value::from(uuid::Uuid::new_v4().to_string()));
            }
        }

        let now = Value::from(chrono::Utc::now().to_rfc3339());
        record.insert(CREATED_TIMESTAMP.into(), now.clone());
        record.insert(UPDATED_TIMESTAMP.into(), now);

        let key = record_key(table, &record);
        let names: Vec<String> = table.columns().iter().map(|c| quote(c.name)).collect();
        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
            "INSERT INTO {} ({}) VALUES (",
            quote(table.name()),
            names.join(", ")
        ));
        for (i, column) in table.columns().iter().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            let value = record.get(column.name).unwrap_or(&Value::Null);
            let bound = Bound::convert(column.kind, value).ok_or_else(|| {
                StoreError::InvalidQuery(format!(
                    "value {} does not fit {}",
                    value,
                    table.col(column.name)
                ))
            })?;
            bound.push(&mut builder);
        }
        builder.push(")");

        trace!(key = %key, "insert");
        match builder.build().execute(self.db.pool()).await {
            Ok(_) => Ok(key),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::Duplicate { table, key })
            }
            Err(e) => Err(backend(e)),
        }
    }

    #[instrument(skip(self, matcher), fields(table = %table))]
    async fn delete(&self, table: Table, matcher: Record) -> StoreResult<u64> {
        if matcher.is_empty() {
            return Err(StoreError::InvalidQuery(format!(
                "refusing unconditional delete on {}",
                table
            )));
        }
        check_columns(table, &matcher)?;

        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("DELETE FROM {} WHERE 1 = 1", quote(table.name())));
        for (name, value) in &matcher {
            let kind = table
                .column_def(name)
                .map(|def| def.kind)
                .ok_or_else(|| StoreError::InvalidQuery(format!("unknown column {}.{}", table, name)))?;
            builder.push(" AND ");
            match (value, Bound::convert(kind, value)) {
                (Value::Null, _) => {
                    builder.push(format!("{} IS NULL", quote(name)));
                }
                (_, Some(bound)) => {
                    builder.push(format!("{} = ", quote(name)));
                    bound.push(&mut builder);
                }
                (_, None) => {
                    builder.push("1 = 0");
                }
            }
        }

        let result = builder.build().execute(self.db.pool()).await.map_err(backend)?;
        debug!(removed = result.rows_affected(), "delete");
        Ok(result.rows_affected())
    }

    async fn query(&self, query: &Query) -> StoreResult<Vec<Record>> {
        let mut builder = select(query)?;
        trace!(sql = builder.sql(), "query");
        let rows = builder
            .build()
            .fetch_all(self.db.pool())
            .await
            .map_err(backend)?;
        rows.iter().map(|row| read_row(query.table, row)).collect()
    }
}
