//! Persistence contract.
//!
//! The engines talk to storage only through [`Store`]. Rows travel as JSON
//! object maps ([`Record`]) so one contract serves the in-memory double and
//! SQL backends alike.

mod cached;
mod memory;
mod query;
mod schema;

pub use cached::CachedStore;
pub use memory::MemoryStore;
pub use query::{Direction, Join, OrderBy, Predicate, Query};
pub use schema::{Column, ColumnDef, ColumnType, Table, CREATED_TIMESTAMP, UPDATED_TIMESTAMP};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A row: column name to value.
pub type Record = Map<String, Value>;

/// Store operation result.
pub type StoreResult<T> = Result<T, StoreError>;

/// Store errors.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("duplicate key in {table}: {key}")]
    Duplicate { table: Table, key: String },
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Storage capability consumed by the engine.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a row, returning its key (generated UUID for roles and groups,
    /// the key columns joined by `/` otherwise).
    async fn insert(&self, table: Table, record: Record) -> StoreResult<String>;

    /// Delete every row whose columns equal all columns present in `matcher`.
    /// Returns the number of rows removed. An empty matcher is rejected.
    async fn delete(&self, table: Table, matcher: Record) -> StoreResult<u64>;

    /// Run a query, returning target-table rows.
    async fn query(&self, query: &Query) -> StoreResult<Vec<Record>>;
}

/// A typed row of one table.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + Sized {
    const TABLE: Table;

    fn to_record(&self) -> StoreResult<Record> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(StoreError::Serialization(format!(
                "{} did not serialize to an object: {}",
                Self::TABLE,
                other
            ))),
        }
    }

    fn from_record(record: Record) -> StoreResult<Self> {
        Ok(serde_json::from_value(Value::Object(record))?)
    }
}

/// Build a matcher record from column/value pairs.
pub fn matcher<I, V>(pairs: I) -> Record
where
    I: IntoIterator<Item = (&'static str, V)>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.into()))
        .collect()
}

/// Text form of a scalar value, used for `In` and regex predicates.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// The key string returned by `insert`.
pub fn record_key(table: Table, record: &Record) -> String {
    table
        .primary_key()
        .iter()
        .map(|col| record.get(*col).and_then(value_text).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("/")
}
