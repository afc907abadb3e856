//! Error types for dbstore.
//!
//! This module defines all error types using `thiserror`. Every variant maps
//! onto one [`ErrorKind`] so callers can branch on the category without
//! matching individual variants.

use crate::models::SqlValue;
use std::time::Duration;
use thiserror::Error;

/// Coarse error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing handle at registration, unknown connection name.
    Configuration,
    /// The underlying executor lacks the requested capability.
    Unsupported,
    /// The query descriptor could not be rendered.
    QueryBuild,
    /// The driver call (or scanning its rows) failed.
    Execution,
    /// Query options were rejected.
    Validation,
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Connection not found: {name}")]
    ConnectionNotFound { name: String },

    #[error("Database handle is missing for connection '{name}'")]
    NilHandle { name: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Unsupported operation: cannot {operation} on this connection")]
    Unsupported { operation: &'static str },

    #[error("Transaction is no longer active")]
    TransactionClosed,

    #[error("Failed to build query: {message} (fragment: {fragment})")]
    QueryBuild { message: String, fragment: String },

    #[error("Execution failed: {message} (sql: {sql})")]
    Execution {
        message: String,
        sql: String,
        args: Vec<SqlValue>,
        /// e.g., "2067" for a SQLite unique constraint violation
        sql_state: Option<String>,
    },

    #[error("No rows returned (sql: {sql})")]
    NoRows { sql: String },

    #[error("Expected a single row, got {count} (sql: {sql})")]
    TooManyRows { sql: String, count: usize },

    #[error("Failed to scan rows: {message} (sql: {sql})")]
    Scan { message: String, sql: String },

    #[error("Timeout: {operation} exceeded {}ms", .elapsed.as_millis())]
    Timeout {
        operation: String,
        elapsed: Duration,
        /// Bound arguments when the timed-out operation was a query.
        args: Vec<SqlValue>,
    },

    #[error("No limit defined")]
    NoLimitDefined,

    #[error("Invalid integer for '{key}': {value}")]
    InvalidInteger { key: String, value: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a connection not found error.
    pub fn connection_not_found(name: impl Into<String>) -> Self {
        Self::ConnectionNotFound { name: name.into() }
    }

    /// Create a missing handle error.
    pub fn nil_handle(name: impl Into<String>) -> Self {
        Self::NilHandle { name: name.into() }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// `begin` on an executor that cannot start transactions.
    pub fn no_begin() -> Self {
        Self::Unsupported { operation: "begin" }
    }

    /// `commit` on an executor that is not a transaction.
    pub fn no_commit() -> Self {
        Self::Unsupported {
            operation: "commit",
        }
    }

    /// `rollback` on an executor that is not a transaction.
    pub fn no_rollback() -> Self {
        Self::Unsupported {
            operation: "rollback",
        }
    }

    /// Create a query build error carrying the descriptor.
    pub fn query_build(message: impl Into<String>, fragment: &impl std::fmt::Debug) -> Self {
        Self::QueryBuild {
            message: message.into(),
            fragment: format!("{:?}", fragment),
        }
    }

    /// Wrap a driver error with the SQL that actually ran.
    ///
    /// `RowNotFound` becomes [`DbError::NoRows`].
    pub fn execution(err: sqlx::Error, sql: impl Into<String>, args: Vec<SqlValue>) -> Self {
        let sql = sql.into();
        match err {
            sqlx::Error::RowNotFound => Self::NoRows { sql },
            sqlx::Error::Database(db_err) => Self::Execution {
                message: db_err.message().to_string(),
                sql_state: db_err.code().map(|c| c.to_string()),
                sql,
                args,
            },
            other => Self::Execution {
                message: other.to_string(),
                sql_state: None,
                sql,
                args,
            },
        }
    }

    /// Create a scan error.
    pub fn scan(message: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::Scan {
            message: message.into(),
            sql: sql.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed,
            args: Vec::new(),
        }
    }

    /// A rendered query that ran past its deadline.
    pub fn query_timeout(sql: impl Into<String>, elapsed: Duration, args: Vec<SqlValue>) -> Self {
        Self::Timeout {
            operation: sql.into(),
            elapsed,
            args,
        }
    }

    /// Create an integer parse error for a query option.
    pub fn invalid_integer(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidInteger {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. }
            | Self::ConnectionNotFound { .. }
            | Self::NilHandle { .. }
            | Self::Connection { .. } => ErrorKind::Configuration,
            Self::Unsupported { .. } => ErrorKind::Unsupported,
            Self::QueryBuild { .. } => ErrorKind::QueryBuild,
            Self::NoLimitDefined | Self::InvalidInteger { .. } => ErrorKind::Validation,
            Self::TransactionClosed
            | Self::Execution { .. }
            | Self::NoRows { .. }
            | Self::TooManyRows { .. }
            | Self::Scan { .. }
            | Self::Timeout { .. }
            | Self::Database { .. }
            | Self::Internal { .. } => ErrorKind::Execution,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    ///
    /// Nothing in this crate retries; the flag is for callers.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }

    /// Whether the error means the query matched nothing.
    pub fn is_no_rows(&self) -> bool {
        matches!(self, Self::NoRows { .. })
    }
}

/// Convert sqlx errors raised outside of a rendered query (pool open,
/// begin, commit, rollback).
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::PoolTimedOut => DbError::timeout(
                "connection pool acquire",
                crate::config::DEFAULT_ACQUIRE_TIMEOUT,
            ),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Register the connection again")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check that the database file is accessible",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database driver compatibility",
            ),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check the path");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_unsupported_messages() {
        assert_eq!(
            DbError::no_begin().to_string(),
            "Unsupported operation: cannot begin on this connection"
        );
        assert!(DbError::no_commit().to_string().contains("cannot commit"));
        assert!(DbError::no_rollback().to_string().contains("cannot rollback"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(DbError::nil_handle("x").kind(), ErrorKind::Configuration);
        assert_eq!(
            DbError::connection_not_found("x").kind(),
            ErrorKind::Configuration
        );
        assert_eq!(DbError::no_begin().kind(), ErrorKind::Unsupported);
        assert_eq!(
            DbError::query_build("bad", &"SELECT").kind(),
            ErrorKind::QueryBuild
        );
        assert_eq!(DbError::NoLimitDefined.kind(), ErrorKind::Validation);
        assert_eq!(
            DbError::invalid_integer("page", "x").kind(),
            ErrorKind::Validation
        );
        assert_eq!(DbError::TransactionClosed.kind(), ErrorKind::Execution);
    }

    #[test]
    fn test_execution_keeps_rendered_sql_and_args() {
        let err = DbError::execution(
            sqlx::Error::Protocol("boom".into()),
            "SELECT ?",
            vec![SqlValue::Int(1)],
        );
        match err {
            DbError::Execution { sql, args, .. } => {
                assert_eq!(sql, "SELECT ?");
                assert_eq!(args, vec![SqlValue::Int(1)]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_row_not_found_becomes_no_rows() {
        let err = DbError::execution(sqlx::Error::RowNotFound, "SELECT 1", Vec::new());
        assert!(err.is_no_rows());
    }

    #[test]
    fn test_timeout_reports_milliseconds() {
        let err = DbError::query_timeout(
            "SELECT * FROM t WHERE id = ?",
            Duration::from_millis(250),
            vec![SqlValue::Int(4)],
        );
        assert_eq!(
            err.to_string(),
            "Timeout: SELECT * FROM t WHERE id = ? exceeded 250ms"
        );
        match err {
            DbError::Timeout { args, .. } => assert_eq!(args, vec![SqlValue::Int(4)]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::timeout("query", Duration::from_secs(30)).is_retryable());
        assert!(DbError::connection("err", "sugg").is_retryable());
        assert!(!DbError::no_commit().is_retryable());
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::database("Syntax error", Some("1".to_string()), "Check SQL syntax");
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
        assert_eq!(DbError::NoLimitDefined.suggestion(), None);
    }
}
