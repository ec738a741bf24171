//! In-memory store.
//!
//! Test double for the persistence contract. Rows keep insertion order, so
//! unordered queries are deterministic. Failures and latency can be injected
//! per table to exercise error and cancellation paths.

use super::schema::{Column, ColumnType, Table, CREATED_TIMESTAMP, UPDATED_TIMESTAMP};
use super::{record_key, value_text, Direction, Predicate, Query, Record, Store, StoreError, StoreResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;
use tracing::trace;

/// In-memory implementation of [`Store`].
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<Table, Vec<Record>>>,
    failures: RwLock<HashMap<Table, String>>,
    latency: RwLock<Option<Duration>>,
    queries: AtomicU64,
}

enum Test<'q> {
    Eq(&'q Value),
    In(&'q [String]),
    Matches(Regex),
}

struct Compiled<'q> {
    column: Column,
    test: Test<'q>,
}

impl Compiled<'_> {
    fn matches(&self, row: &Record) -> bool {
        let Some(value) = row.get(self.column.name) else {
            return false;
        };
        match &self.test {
            Test::Eq(expected) => {
                value == *expected
                    || matches!((value_text(value), value_text(expected)), (Some(a), Some(b)) if a == b)
            }
            Test::In(values) => value_text(value)
                .map(|text| values.iter().any(|v| *v == text))
                .unwrap_or(false),
            Test::Matches(re) => value_text(value)
                .map(|text| re.is_match(&text))
                .unwrap_or(false),
        }
    }
}

fn compile(query: &Query) -> StoreResult<Vec<Compiled<'_>>> {
    query
        .predicates
        .iter()
        .map(|predicate| {
            let test = match predicate {
                Predicate::Eq(_, value) => Test::Eq(value),
                Predicate::In(_, values) => Test::In(values),
                Predicate::Matches(_, pattern) => Test::Matches(Regex::new(pattern).map_err(|e| {
                    StoreError::InvalidQuery(format!("bad pattern {:?}: {}", pattern, e))
                })?),
            };
            Ok(Compiled {
                column: predicate.column(),
                test,
            })
        })
        .collect()
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            x.as_f64().partial_cmp(&y.as_f64()).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

fn default_value(kind: ColumnType) -> Value {
    match kind {
        ColumnType::Text => Value::String(String::new()),
        ColumnType::Integer => Value::from(0),
        ColumnType::Boolean => Value::Bool(false),
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation touching `table` fail with a backend error.
    pub fn fail_table(&self, table: Table, message: impl Into<String>) {
        self.failures.write().insert(table, message.into());
    }

    pub fn clear_failures(&self) {
        self.failures.write().clear();
    }

    /// Delay every operation by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write() = latency;
    }

    /// Number of queries served so far.
    pub fn query_count(&self) -> u64 {
        self.queries.load(AtomicOrdering::Relaxed)
    }

    /// Snapshot of a table's rows.
    pub fn rows(&self, table: Table) -> Vec<Record> {
        self.tables.read().get(&table).cloned().unwrap_or_default()
    }

    pub fn len(&self, table: Table) -> usize {
        self.tables.read().get(&table).map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().values().all(Vec::is_empty)
    }

    async fn enter(&self, tables: &[Table]) -> StoreResult<()> {
        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let failures = self.failures.read();
        for table in tables {
            if let Some(message) = failures.get(table) {
                return Err(StoreError::Backend(message.clone()));
            }
        }
        Ok(())
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
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert(&self, table: Table, mut record: Record) -> StoreResult<String> {
        self.enter(&[table]).await?;
        Self::check_columns(table, &record)?;

        for column in table.columns() {
            record
                .entry(column.name.to_string())
                .or_insert_with(|| default_value(column.kind));
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
        let mut tables = self.tables.write();
        let rows = tables.entry(table).or_default();
        if rows.iter().any(|row| record_key(table, row) == key) {
            return Err(StoreError::Duplicate { table, key });
        }
        trace!(table = %table, key = %key, "insert");
        rows.push(record);
        Ok(key)
    }

    async fn delete(&self, table: Table, matcher: Record) -> StoreResult<u64> {
        self.enter(&[table]).await?;
        if matcher.is_empty() {
            return Err(StoreError::InvalidQuery(format!(
                "refusing unconditional delete on {}",
                table
            )));
        }
        Self::check_columns(table, &matcher)?;

        let mut tables = self.tables.write();
        let Some(rows) = tables.get_mut(&table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|row| !matcher.iter().all(|(k, v)| row.get(k) == Some(v)));
        Ok((before - rows.len()) as u64)
    }

    async fn query(&self, query: &Query) -> StoreResult<Vec<Record>> {
        let mut touched = vec![query.table];
        touched.extend(query.join.map(|j| j.table));
        self.enter(&touched).await?;
        query.validate()?;
        self.queries.fetch_add(1, AtomicOrdering::Relaxed);

        let compiled = compile(query)?;
        let (target_tests, join_tests): (Vec<_>, Vec<_>) =
            compiled.iter().partition(|c| c.column.table == query.table);

        let tables = self.tables.read();
        let empty = Vec::new();
        let rows = tables.get(&query.table).unwrap_or(&empty);

        let mut result: Vec<Record> = rows
            .iter()
            .filter(|row| target_tests.iter().all(|t| t.matches(row)))
            .filter(|row| match &query.join {
                None => true,
                Some(join) => {
                    let Some(local) = row.get(join.local).and_then(value_text) else {
                        return false;
                    };
                    tables.get(&join.table).unwrap_or(&empty).iter().any(|other| {
                        other.get(join.foreign).and_then(value_text).as_deref() == Some(local.as_str())
                            && join_tests.iter().all(|t| t.matches(other))
                    })
                }
            })
            .cloned()
            .collect();

        if let Some(order) = &query.order_by {
            let name = order.column.name;
            result.sort_by(|a, b| {
                let ordering = compare(a.get(name), b.get(name));
                match order.direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                }
            });
        }

        Ok(result)
    }
}
