//! A named executor plus the translator and scanner used to talk to it.
//!
//! A [`Connection`] is either a root handle or an open transaction; which
//! one depends only on the capabilities its [`Executor`] reports. `begin`
//! never mutates the connection it is called on, it returns a new
//! [`Connection`] sharing the same translator, scanner and settings.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{debug, trace};

use crate::config::ConnectionSettings;
use crate::db::executor::{Executor, Record};
use crate::db::scan::{RowScanner, ScanError};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionSummary, ExecOutcome};
use crate::query::{FragmentTranslator, QueryFragment, RenderedQuery};

pub struct Connection {
    name: String,
    executor: Arc<dyn Executor>,
    translator: Arc<dyn FragmentTranslator>,
    scanner: Arc<RowScanner>,
    settings: ConnectionSettings,
    /// Microseconds since the epoch; 0 until the first operation.
    last_used: AtomicI64,
}

impl Connection {
    pub fn new(
        name: impl Into<String>,
        executor: Arc<dyn Executor>,
        translator: Arc<dyn FragmentTranslator>,
        scanner: Arc<RowScanner>,
        settings: ConnectionSettings,
    ) -> Self {
        Self {
            name: name.into(),
            executor,
            translator,
            scanner,
            settings,
            last_used: AtomicI64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    pub fn translator(&self) -> &Arc<dyn FragmentTranslator> {
        &self.translator
    }

    pub fn scanner(&self) -> &Arc<RowScanner> {
        &self.scanner
    }

    pub fn settings(&self) -> ConnectionSettings {
        self.settings
    }

    pub fn is_transaction(&self) -> bool {
        self.executor.as_transaction().is_some()
    }

    /// Time of the last attempted operation, failed ones included.
    pub fn last_used(&self) -> Option<DateTime<Utc>> {
        match self.last_used.load(Ordering::Relaxed) {
            0 => None,
            micros => DateTime::from_timestamp_micros(micros),
        }
    }

    pub fn summary(&self) -> ConnectionSummary {
        ConnectionSummary {
            name: self.name.clone(),
            in_transaction: self.is_transaction(),
            last_used: self.last_used(),
        }
    }

    fn touch(&self) {
        self.last_used
            .store(Utc::now().timestamp_micros(), Ordering::Relaxed);
    }

    fn render(&self, fragment: &QueryFragment) -> DbResult<RenderedQuery> {
        let rendered = self
            .translator
            .render(fragment)
            .map_err(|e| DbError::query_build(e.to_string(), fragment))?;

        if self.settings.log_queries {
            debug!(connection = %self.name, sql = %rendered.sql, args = rendered.args.len(), "Running query");
        } else {
            trace!(connection = %self.name, sql = %rendered.sql, args = rendered.args.len(), "Running query");
        }
        Ok(rendered)
    }

    /// Await a driver call, bounded by the configured query timeout.
    async fn run<T, F>(&self, rendered: &RenderedQuery, fut: F) -> DbResult<T>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        let result = match self.settings.query_timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(DbError::query_timeout(
                        rendered.sql.clone(),
                        limit,
                        rendered.args.clone(),
                    ));
                }
            },
            None => fut.await,
        };
        result.map_err(|e| DbError::execution(e, rendered.sql.clone(), rendered.args.clone()))
    }

    fn scan_error(err: ScanError, sql: &str) -> DbError {
        match err {
            ScanError::NoRows => DbError::NoRows {
                sql: sql.to_string(),
            },
            ScanError::TooManyRows(count) => DbError::TooManyRows {
                sql: sql.to_string(),
                count,
            },
            ScanError::Decode(e) => DbError::scan(e.to_string(), sql),
        }
    }

    /// Run a statement that returns no rows.
    pub async fn exec(&self, fragment: &QueryFragment) -> DbResult<ExecOutcome> {
        self.touch();
        let rendered = self.render(fragment)?;
        self.run(
            &rendered,
            self.executor.execute(&rendered.sql, &rendered.args),
        )
        .await
    }

    /// Fetch the first row and copy its columns positionally into `T`
    /// (a tuple, or a bare scalar for single-column queries).
    pub async fn fetch_scalar<T: DeserializeOwned>(&self, fragment: &QueryFragment) -> DbResult<T> {
        self.touch();
        let rendered = self.render(fragment)?;
        let record = self
            .run(
                &rendered,
                self.executor
                    .query_single_row(&rendered.sql, &rendered.args),
            )
            .await?;
        self.scanner
            .scan_positional(record)
            .map_err(|e| Self::scan_error(e, &rendered.sql))
    }

    /// Fetch every row into `T`. An empty result is not an error.
    pub async fn fetch_all<T: DeserializeOwned>(&self, fragment: &QueryFragment) -> DbResult<Vec<T>> {
        let (records, sql) = self.query(fragment).await?;
        self.scanner
            .scan_all(records)
            .map_err(|e| Self::scan_error(e, &sql))
    }

    /// Fetch exactly one row into `T`.
    pub async fn fetch_one<T: DeserializeOwned>(&self, fragment: &QueryFragment) -> DbResult<T> {
        let (records, sql) = self.query(fragment).await?;
        self.scanner
            .scan_one(records)
            .map_err(|e| Self::scan_error(e, &sql))
    }

    /// Fetch rows without deserializing them.
    pub async fn fetch_records(&self, fragment: &QueryFragment) -> DbResult<Vec<Record>> {
        self.query(fragment).await.map(|(records, _)| records)
    }

    async fn query(&self, fragment: &QueryFragment) -> DbResult<(Vec<Record>, String)> {
        self.touch();
        let rendered = self.render(fragment)?;
        let records = self
            .run(
                &rendered,
                self.executor.query_rows(&rendered.sql, &rendered.args),
            )
            .await?;
        Ok((records, rendered.sql))
    }

    /// Start a transaction on this connection's executor.
    pub async fn begin(&self) -> DbResult<Connection> {
        self.touch();
        let beginner = self.executor.as_beginner().ok_or_else(DbError::no_begin)?;
        let tx = beginner.begin_transaction().await?;
        debug!(connection = %self.name, "Transaction started");

        Ok(Connection::new(
            self.name.clone(),
            tx,
            Arc::clone(&self.translator),
            Arc::clone(&self.scanner),
            self.settings,
        ))
    }

    pub async fn commit(&self) -> DbResult<()> {
        self.touch();
        let tx = self.executor.as_transaction().ok_or_else(DbError::no_commit)?;
        if !tx.is_active().await {
            return Err(DbError::TransactionClosed);
        }
        tx.commit().await?;
        debug!(connection = %self.name, "Transaction committed");
        Ok(())
    }

    pub async fn rollback(&self) -> DbResult<()> {
        self.touch();
        let tx = self
            .executor
            .as_transaction()
            .ok_or_else(DbError::no_rollback)?;
        if !tx.is_active().await {
            return Err(DbError::TransactionClosed);
        }
        tx.rollback().await?;
        debug!(connection = %self.name, "Transaction rolled back");
        Ok(())
    }

    /// Release the underlying handle. An open transaction is rolled back.
    pub async fn close(&self) {
        self.executor.close().await;
        debug!(connection = %self.name, "Connection closed");
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("in_transaction", &self.is_transaction())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
