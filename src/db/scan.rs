//! Row scanning into caller types.
//!
//! Rows arrive as [`Record`]s and are deserialized with serde. A
//! [`ColumnMapper`] renames columns before they are matched against struct
//! fields; the mapper lives in a [`RowScanner`] shared by every connection
//! of a registry, so swapping it affects all of them.

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::sync::{Arc, RwLock};
use thiserror::Error;

use crate::db::executor::Record;

/// Maps a column name to the field name used during deserialization.
#[derive(Clone)]
pub struct ColumnMapper(Arc<dyn Fn(&str) -> String + Send + Sync>);

impl ColumnMapper {
    /// Column names are used unchanged.
    pub fn identity() -> Self {
        Self::custom(str::to_string)
    }

    /// Column names are lowercased.
    pub fn lowercase() -> Self {
        Self::custom(str::to_lowercase)
    }

    pub fn custom(f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn map(&self, column: &str) -> String {
        (self.0)(column)
    }
}

impl Default for ColumnMapper {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::fmt::Debug for ColumnMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ColumnMapper")
    }
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("no rows in result set")]
    NoRows,

    #[error("expected one row, got {0}")]
    TooManyRows(usize),

    #[error(transparent)]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Default)]
pub struct RowScanner {
    mapper: RwLock<ColumnMapper>,
}

impl RowScanner {
    pub fn new(mapper: ColumnMapper) -> Self {
        Self {
            mapper: RwLock::new(mapper),
        }
    }

    /// Replace the column mapper for every connection using this scanner.
    pub fn set_column_mapper(&self, mapper: ColumnMapper) {
        match self.mapper.write() {
            Ok(mut guard) => *guard = mapper,
            Err(poisoned) => *poisoned.into_inner() = mapper,
        }
    }

    pub fn column_mapper(&self) -> ColumnMapper {
        match self.mapper.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Deserialize every row into `T`. Zero rows yields an empty vec.
    pub fn scan_all<T: DeserializeOwned>(&self, records: Vec<Record>) -> Result<Vec<T>, ScanError> {
        let mapper = self.column_mapper();
        records
            .into_iter()
            .map(|r| {
                serde_json::from_value(JsonValue::Object(r.into_map(&mapper)))
                    .map_err(ScanError::from)
            })
            .collect()
    }

    /// Deserialize the only row into `T`.
    pub fn scan_one<T: DeserializeOwned>(&self, records: Vec<Record>) -> Result<T, ScanError> {
        let count = records.len();
        let Some(record) = records.into_iter().next() else {
            return Err(ScanError::NoRows);
        };
        if count > 1 {
            return Err(ScanError::TooManyRows(count));
        }
        let mapper = self.column_mapper();
        Ok(serde_json::from_value(JsonValue::Object(
            record.into_map(&mapper),
        ))?)
    }

    /// Copy columns positionally into `T` (a tuple, array or `Vec`).
    ///
    /// A single-column row may also scan into a bare scalar.
    pub fn scan_positional<T: DeserializeOwned>(&self, record: Record) -> Result<T, ScanError> {
        let mut values = record.into_values();
        match serde_json::from_value(JsonValue::Array(values.clone())) {
            Ok(v) => Ok(v),
            Err(_) if values.len() == 1 => Ok(serde_json::from_value(values.remove(0))?),
            Err(e) => Err(e.into()),
        }
    }
}
