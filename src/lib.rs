//! dbstore
//!
//! A data-access layer over sqlx: named connections with a uniform
//! transaction model, query fragments rendered per SQL dialect, serde-based
//! row scanning, and validated pagination/sort/filter options.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod query;

pub use config::{Config, ConnectionSettings, DatabaseConfig};
pub use db::{Connection, ConnectionRegistry, Executor, RowScanner, Store};
pub use error::{DbError, DbResult, ErrorKind};
pub use models::{DatabaseType, SqlValue};
pub use query::{QueryFragment, QueryOptions, QueryOptionsConfig};
