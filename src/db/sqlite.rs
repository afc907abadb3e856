//! SQLite executors backed by sqlx.
//!
//! [`SqlitePoolExecutor`] is a root handle: it can begin transactions but
//! has nothing to commit. [`SqliteTxExecutor`] wraps one open transaction:
//! it can commit or roll back but cannot begin another one (no savepoints).

use async_trait::async_trait;
use futures_util::TryStreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteQueryResult};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::PoolOptions;
use crate::db::executor::{Executor, Record, TransactionBeginner, TransactionHandle};
use crate::db::params::sqlite_query;
use crate::db::types::sqlite_row_to_record;
use crate::error::{DbError, DbResult};
use crate::models::{ExecOutcome, SqlValue};

fn outcome(result: SqliteQueryResult) -> ExecOutcome {
    ExecOutcome {
        rows_affected: result.rows_affected(),
        last_insert_id: Some(result.last_insert_rowid()),
    }
}

fn transaction_finished() -> sqlx::Error {
    sqlx::Error::Protocol("transaction is no longer active".to_string())
}

/// Pooled SQLite handle.
#[derive(Debug, Clone)]
pub struct SqlitePoolExecutor {
    pool: SqlitePool,
}

impl SqlitePoolExecutor {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool for `connection_string` (`sqlite:path`, `sqlite::memory:`
    /// or a bare file path).
    pub async fn connect(
        connection_string: &str,
        pool_opts: &PoolOptions,
        read_only: bool,
    ) -> DbResult<Self> {
        let mut options = SqliteConnectOptions::from_str(connection_string).map_err(|e| {
            DbError::connection(
                format!("Invalid SQLite connection string: {}", e),
                "Check the connection URL format: sqlite:path/to/db.sqlite",
            )
        })?;

        if read_only {
            options = options.read_only(true);
        } else {
            options = options.create_if_missing(true).read_only(false);
        }

        let in_memory = is_in_memory(connection_string);
        if in_memory && pool_opts.max_connections.is_some_and(|max| max > 1) {
            warn!(
                requested = ?pool_opts.max_connections,
                "In-memory SQLite database is private to one connection; using a single-connection pool"
            );
        }

        let sizing = pool_opts.resolve(in_memory);
        let mut pool_options = SqlitePoolOptions::new()
            .min_connections(sizing.min_connections)
            .max_connections(sizing.max_connections)
            .acquire_timeout(sizing.acquire_timeout)
            .idle_timeout(sizing.idle_timeout)
            .test_before_acquire(sizing.test_before_acquire);
        if in_memory {
            pool_options = pool_options.max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| DbError::connection(format!("Failed to connect: {}", e), suggestion(&e)))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// `sqlite::memory:`, `sqlite:file:name?mode=memory` and friends.
fn is_in_memory(connection_string: &str) -> bool {
    connection_string.contains(":memory:") || connection_string.contains("mode=memory")
}

/// Generate a helpful suggestion for connection errors.
fn suggestion(error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("unable to open") {
        return "Check that the directory exists and is writable".to_string();
    }

    if error_str.contains("readonly") || error_str.contains("read-only") {
        return "The database file is read-only; drop read_only=true or fix permissions"
            .to_string();
    }

    "Verify the file path exists and is accessible: sqlite:path/to/db.sqlite".to_string()
}

#[async_trait]
impl Executor for SqlitePoolExecutor {
    async fn execute(&self, sql: &str, args: &[SqlValue]) -> Result<ExecOutcome, sqlx::Error> {
        sqlite_query(sql, args).execute(&self.pool).await.map(outcome)
    }

    async fn query_rows(&self, sql: &str, args: &[SqlValue]) -> Result<Vec<Record>, sqlx::Error> {
        sqlite_query(sql, args)
            .fetch(&self.pool)
            .map_ok(|row| sqlite_row_to_record(&row))
            .try_collect()
            .await
    }

    async fn query_single_row(&self, sql: &str, args: &[SqlValue]) -> Result<Record, sqlx::Error> {
        let row = sqlite_query(sql, args).fetch_one(&self.pool).await?;
        Ok(sqlite_row_to_record(&row))
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn as_beginner(&self) -> Option<&dyn TransactionBeginner> {
        Some(self)
    }
}

#[async_trait]
impl TransactionBeginner for SqlitePoolExecutor {
    async fn begin_transaction(&self) -> Result<Arc<dyn Executor>, sqlx::Error> {
        let tx = self.pool.begin().await?;
        debug!("SQLite transaction started");
        Ok(Arc::new(SqliteTxExecutor::new(tx)))
    }
}

/// One open SQLite transaction.
///
/// Dropping an executor whose transaction is still active rolls it back.
pub struct SqliteTxExecutor {
    tx: Mutex<Option<Transaction<'static, Sqlite>>>,
}

impl SqliteTxExecutor {
    pub fn new(tx: Transaction<'static, Sqlite>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    async fn take(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.tx.lock().await.take().ok_or_else(transaction_finished)
    }
}

impl std::fmt::Debug for SqliteTxExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteTxExecutor").finish_non_exhaustive()
    }
}

#[async_trait]
impl Executor for SqliteTxExecutor {
    async fn execute(&self, sql: &str, args: &[SqlValue]) -> Result<ExecOutcome, sqlx::Error> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(transaction_finished)?;
        sqlite_query(sql, args).execute(&mut **tx).await.map(outcome)
    }

    async fn query_rows(&self, sql: &str, args: &[SqlValue]) -> Result<Vec<Record>, sqlx::Error> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(transaction_finished)?;
        let rows = sqlite_query(sql, args).fetch_all(&mut **tx).await?;
        Ok(rows.iter().map(sqlite_row_to_record).collect())
    }

    async fn query_single_row(&self, sql: &str, args: &[SqlValue]) -> Result<Record, sqlx::Error> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(transaction_finished)?;
        let row = sqlite_query(sql, args).fetch_one(&mut **tx).await?;
        Ok(sqlite_row_to_record(&row))
    }

    async fn close(&self) {
        if let Some(tx) = self.tx.lock().await.take() {
            // Best effort rollback
            if let Err(e) = tx.rollback().await {
                warn!(error = %e, "Rollback on close failed");
            }
        }
    }

    fn as_transaction(&self) -> Option<&dyn TransactionHandle> {
        Some(self)
    }
}

#[async_trait]
impl TransactionHandle for SqliteTxExecutor {
    async fn commit(&self) -> Result<(), sqlx::Error> {
        self.take().await?.commit().await
    }

    async fn rollback(&self) -> Result<(), sqlx::Error> {
        self.take().await?.rollback().await
    }

    async fn is_active(&self) -> bool {
        self.tx.lock().await.is_some()
    }
}
