//! Backend-neutral query description.
//!
//! A query selects rows of one target table. Predicates are AND-ed. With a
//! join, a target row is returned at most once when at least one join row
//! satisfies `target.local = join.foreign` together with every predicate on
//! join columns.

use super::schema::{Column, Table};
use super::{StoreError, StoreResult};
use serde::Serialize;
use serde_json::Value;

/// One filter term.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Column equals the value.
    Eq(Column, Value),
    /// Column is one of the values. An empty list matches nothing.
    In(Column, Vec<String>),
    /// Column matches the regular expression.
    Matches(Column, String),
}

impl Predicate {
    pub fn column(&self) -> Column {
        match self {
            Self::Eq(c, _) | Self::In(c, _) | Self::Matches(c, _) => *c,
        }
    }
}

/// Join against a second table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Join {
    pub table: Table,
    /// Column of the target table.
    pub local: &'static str,
    /// Column of the joined table.
    pub foreign: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderBy {
    pub column: Column,
    pub direction: Direction,
}

/// A read against the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Query {
    pub table: Table,
    pub predicates: Vec<Predicate>,
    pub join: Option<Join>,
    pub order_by: Option<OrderBy>,
    /// Hint that the result may be served from the query cache.
    pub use_cache: bool,
}

impl Query {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            predicates: Vec::new(),
            join: None,
            order_by: None,
            use_cache: false,
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn eq(self, column: Column, value: impl Into<Value>) -> Self {
        self.filter(Predicate::Eq(column, value.into()))
    }

    pub fn is_in<I, S>(self, column: Column, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter(Predicate::In(
            column,
            values.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn matches(self, column: Column, pattern: impl Into<String>) -> Self {
        self.filter(Predicate::Matches(column, pattern.into()))
    }

    pub fn join(mut self, table: Table, local: &'static str, foreign: &'static str) -> Self {
        self.join = Some(Join {
            table,
            local,
            foreign,
        });
        self
    }

    pub fn order_by(mut self, column: Column, direction: Direction) -> Self {
        self.order_by = Some(OrderBy { column, direction });
        self
    }

    pub fn use_cache(mut self) -> Self {
        self.use_cache = true;
        self
    }

    /// Check that every referenced column exists on the table it names and
    /// that predicates only address the target or the joined table.
    pub fn validate(&self) -> StoreResult<()> {
        if let Some(join) = &self.join {
            if !self.table.has_column(join.local) {
                return Err(unknown_column(self.table.col(join.local)));
            }
            if !join.table.has_column(join.foreign) {
                return Err(unknown_column(join.table.col(join.foreign)));
            }
        }

        for predicate in &self.predicates {
            let column = predicate.column();
            let addressable = column.table == self.table
                || self.join.map(|j| j.table == column.table).unwrap_or(false);
            if !addressable {
                return Err(StoreError::InvalidQuery(format!(
                    "predicate on {} outside the queried tables",
                    column
                )));
            }
            if !column.table.has_column(column.name) {
                return Err(unknown_column(column));
            }
        }

        if let Some(order) = &self.order_by {
            if order.column.table != self.table || !self.table.has_column(order.column.name) {
                return Err(StoreError::InvalidQuery(format!(
                    "cannot order {} by {}",
                    self.table, order.column
                )));
            }
        }

        Ok(())
    }
}

fn unknown_column(column: Column) -> StoreError {
    StoreError::InvalidQuery(format!("unknown column {}", column))
}
