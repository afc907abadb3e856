//! Data models shared across the crate.

pub mod connection;
pub mod query;

pub use connection::{ConnectionSummary, DatabaseType};
pub use query::{ExecOutcome, SqlValue};
