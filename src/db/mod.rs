//! Database access layer.
//!
//! This module provides:
//! - The executor capability traits and the SQLite implementation
//! - The `Connection` state machine (root handle or open transaction)
//! - The named connection registry
//! - Row scanning and column type decoding

pub mod connection;
pub mod executor;
pub mod params;
pub mod registry;
pub mod scan;
pub mod sqlite;
pub mod store;
pub mod types;

pub use connection::Connection;
pub use executor::{Executor, Record, TransactionBeginner, TransactionHandle};
pub use registry::ConnectionRegistry;
pub use scan::{ColumnMapper, RowScanner, ScanError};
pub use sqlite::{SqlitePoolExecutor, SqliteTxExecutor};
pub use store::Store;
