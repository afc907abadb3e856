//! Executor capability set.
//!
//! An [`Executor`] is anything that can run rendered SQL: a pool, a single
//! connection, or an open transaction. Transaction support is discovered at
//! runtime through the `as_beginner` / `as_transaction` accessors instead of a
//! mode flag, so one [`Connection`](crate::db::Connection) type covers both
//! root handles and transactions.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;

use crate::db::scan::ColumnMapper;
use crate::models::{ExecOutcome, SqlValue};

/// A result row: column names in select order with their decoded values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    columns: Vec<String>,
    values: Vec<JsonValue>,
}

impl Record {
    pub fn new(columns: Vec<String>, values: Vec<JsonValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Build a record from `(column, value)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, JsonValue)>,
        S: Into<String>,
    {
        let (columns, values) = pairs.into_iter().map(|(c, v)| (c.into(), v)).unzip();
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[JsonValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of the first column called `name`.
    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|idx| &self.values[idx])
    }

    pub fn get_index(&self, idx: usize) -> Option<&JsonValue> {
        self.values.get(idx)
    }

    /// Values only, in column order.
    pub fn into_values(self) -> Vec<JsonValue> {
        self.values
    }

    /// JSON object keyed by mapped column names. Later duplicates win.
    pub fn into_map(self, mapper: &ColumnMapper) -> serde_json::Map<String, JsonValue> {
        self.columns
            .into_iter()
            .zip(self.values)
            .map(|(column, value)| (mapper.map(&column), value))
            .collect()
    }
}

/// Runs rendered SQL against a database or transaction handle.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, sql: &str, args: &[SqlValue]) -> Result<ExecOutcome, sqlx::Error>;

    async fn query_rows(&self, sql: &str, args: &[SqlValue]) -> Result<Vec<Record>, sqlx::Error>;

    /// First row of the result; `sqlx::Error::RowNotFound` when there is none.
    async fn query_single_row(&self, sql: &str, args: &[SqlValue]) -> Result<Record, sqlx::Error>;

    /// Release the underlying handle.
    async fn close(&self) {}

    /// Present when this executor can open transactions.
    fn as_beginner(&self) -> Option<&dyn TransactionBeginner> {
        None
    }

    /// Present when this executor is an open transaction.
    fn as_transaction(&self) -> Option<&dyn TransactionHandle> {
        None
    }
}

#[async_trait]
pub trait TransactionBeginner: Send + Sync {
    /// Start a transaction and return it as a new executor.
    async fn begin_transaction(&self) -> Result<Arc<dyn Executor>, sqlx::Error>;
}

/// An open transaction. Commit and rollback consume the driver transaction.
#[async_trait]
pub trait TransactionHandle: Send + Sync {
    async fn commit(&self) -> Result<(), sqlx::Error>;

    async fn rollback(&self) -> Result<(), sqlx::Error>;

    /// False once committed or rolled back.
    async fn is_active(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_lookup() {
        let record = Record::from_pairs([("id", json!(1)), ("name", json!("alice"))]);
        assert_eq!(record.len(), 2);
        assert_eq!(record.columns(), ["id", "name"]);
        assert_eq!(record.get("name"), Some(&json!("alice")));
        assert_eq!(record.get("missing"), None);
        assert_eq!(record.get_index(0), Some(&json!(1)));
        assert_eq!(record.get_index(2), None);
    }

    #[test]
    fn test_record_into_map_applies_mapper() {
        let record = Record::from_pairs([("UserName", json!("bob"))]);
        let map = record.into_map(&ColumnMapper::lowercase());
        assert_eq!(map.get("username"), Some(&json!("bob")));
    }

    #[test]
    fn test_empty_record() {
        assert!(Record::default().is_empty());
    }
}
