//! Named connection registry.
//!
//! Manages the root [`Connection`] registered under each name. Connections
//! are added at startup, looked up by name from request handlers and closed
//! at shutdown. The map is guarded by a `tokio::sync::RwLock`, so lookups run
//! concurrently while registration and close take the write lock.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::{ConnectionSettings, DEFAULT_CONNECTION_NAME, DatabaseConfig};
use crate::db::connection::Connection;
use crate::db::executor::Executor;
use crate::db::scan::RowScanner;
use crate::db::sqlite::SqlitePoolExecutor;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionSummary, DatabaseType};
use crate::query::{FragmentTranslator, PlaceholderTranslator};

#[derive(Clone)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<String, Arc<Connection>>>>,
    translator: Arc<dyn FragmentTranslator>,
    scanner: Arc<RowScanner>,
    settings: ConnectionSettings,
}

fn resolve_name(name: &str) -> &str {
    if name.is_empty() {
        DEFAULT_CONNECTION_NAME
    } else {
        name
    }
}

impl ConnectionRegistry {
    /// Create an empty registry using SQLite placeholders and the identity
    /// column mapper.
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            translator: Arc::new(PlaceholderTranslator::default()),
            scanner: Arc::new(RowScanner::default()),
            settings: ConnectionSettings::default(),
        }
    }

    /// Translator used when a registration does not supply one.
    pub fn with_translator(mut self, translator: Arc<dyn FragmentTranslator>) -> Self {
        self.translator = translator;
        self
    }

    /// Scanner shared by every connection registered afterwards.
    pub fn with_scanner(mut self, scanner: Arc<RowScanner>) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn with_settings(mut self, settings: ConnectionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn scanner(&self) -> &Arc<RowScanner> {
        &self.scanner
    }

    pub fn settings(&self) -> ConnectionSettings {
        self.settings
    }

    /// Open `connection_string` and register it under `name`.
    ///
    /// An empty name registers the connection as "default".
    pub async fn register(
        &self,
        name: &str,
        connection_string: &str,
        translator: Option<Arc<dyn FragmentTranslator>>,
    ) -> DbResult<Arc<Connection>> {
        let config = DatabaseConfig::from_url(name, connection_string)
            .map_err(DbError::configuration)?;
        self.register_config(&config, translator).await
    }

    /// Open and register a parsed [`DatabaseConfig`].
    pub async fn register_config(
        &self,
        config: &DatabaseConfig,
        translator: Option<Arc<dyn FragmentTranslator>>,
    ) -> DbResult<Arc<Connection>> {
        if config.db_type != DatabaseType::SQLite {
            return Err(DbError::configuration(format!(
                "No built-in {} driver for connection '{}'; register a custom executor instead",
                config.db_type, config.name
            )));
        }

        // Early check for existing connection
        self.ensure_vacant(&config.name).await?;

        info!(
            connection = %config.name,
            db_type = %config.db_type,
            read_only = config.read_only,
            "Connecting to database"
        );

        let executor = SqlitePoolExecutor::connect(
            &config.connection_string,
            &config.pool_options,
            config.read_only,
        )
        .await?;

        self.register_handle(&config.name, Some(Arc::new(executor)), translator)
            .await
    }

    /// Register a pre-built executor under `name`.
    ///
    /// A missing handle fails with [`DbError::NilHandle`]. If the name is
    /// already taken the handle is closed and a configuration error returned.
    pub async fn register_handle(
        &self,
        name: &str,
        executor: Option<Arc<dyn Executor>>,
        translator: Option<Arc<dyn FragmentTranslator>>,
    ) -> DbResult<Arc<Connection>> {
        let name = resolve_name(name);
        let executor = executor.ok_or_else(|| DbError::nil_handle(name))?;
        let translator = translator.unwrap_or_else(|| Arc::clone(&self.translator));

        let connection = Arc::new(Connection::new(
            name,
            executor,
            translator,
            Arc::clone(&self.scanner),
            self.settings,
        ));

        // If a duplicate appeared while connecting, close ours outside the lock
        let rejected = {
            let mut connections = self.connections.write().await;
            if connections.contains_key(name) {
                Some(Arc::clone(&connection))
            } else {
                connections.insert(name.to_string(), Arc::clone(&connection));
                None
            }
        };

        if let Some(conn) = rejected {
            conn.close().await;
            return Err(Self::duplicate(name));
        }

        info!(connection = %name, "Connection registered");
        Ok(connection)
    }

    async fn ensure_vacant(&self, name: &str) -> DbResult<()> {
        if self.connections.read().await.contains_key(name) {
            return Err(Self::duplicate(name));
        }
        Ok(())
    }

    fn duplicate(name: &str) -> DbError {
        DbError::configuration(format!(
            "Connection '{}' already exists; close it first or use a different name",
            name
        ))
    }

    /// Look up a connection. Absent names yield `None`.
    pub async fn get(&self, name: &str) -> Option<Arc<Connection>> {
        self.connections
            .read()
            .await
            .get(resolve_name(name))
            .cloned()
    }

    pub async fn get_default(&self) -> Option<Arc<Connection>> {
        self.get(DEFAULT_CONNECTION_NAME).await
    }

    /// Look up a connection, failing with [`DbError::ConnectionNotFound`].
    pub async fn require(&self, name: &str) -> DbResult<Arc<Connection>> {
        self.get(name)
            .await
            .ok_or_else(|| DbError::connection_not_found(resolve_name(name)))
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.connections
            .read()
            .await
            .contains_key(resolve_name(name))
    }

    /// Remove a connection and close its handle.
    pub async fn close(&self, name: &str) -> DbResult<()> {
        let name = resolve_name(name);
        let removed = self.connections.write().await.remove(name);
        match removed {
            Some(conn) => {
                info!(connection = %name, "Closing connection");
                if Arc::strong_count(&conn) > 1 {
                    warn!(connection = %name, "Connection is still referenced elsewhere");
                }
                conn.close().await;
                Ok(())
            }
            None => Err(DbError::connection_not_found(name)),
        }
    }

    /// Close all connections and clear the registry.
    pub async fn close_all(&self) {
        let drained: Vec<_> = self.connections.write().await.drain().collect();
        for (name, conn) in drained {
            info!(connection = %name, "Closing connection");
            conn.close().await;
        }
        info!("All connections closed");
    }

    /// Registered names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connections.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Summaries of all registered connections, sorted by name.
    pub async fn list_connections_detail(&self) -> Vec<ConnectionSummary> {
        let mut summaries: Vec<ConnectionSummary> = self
            .connections
            .read()
            .await
            .values()
            .map(|conn| conn.summary())
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_registry_new() {
        let registry = ConnectionRegistry::new();
        assert!(registry.is_empty().await);
        assert!(registry.get_default().await.is_none());
    }

    #[tokio::test]
    async fn test_register_empty_name_becomes_default() {
        let registry = ConnectionRegistry::new();
        let conn = registry.register("", "sqlite::memory:", None).await.unwrap();
        assert_eq!(conn.name(), DEFAULT_CONNECTION_NAME);
        assert!(registry.get_default().await.is_some());
        assert!(registry.get("").await.is_some());
    }

    #[tokio::test]
    async fn test_register_nil_handle() {
        let registry = ConnectionRegistry::new();
        let err = registry.register_handle("x", None, None).await.unwrap_err();
        assert!(matches!(err, DbError::NilHandle { .. }));
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_register_duplicate_name() {
        let registry = ConnectionRegistry::new();
        registry.register("a", "sqlite::memory:", None).await.unwrap();
        let err = registry
            .register("a", "sqlite::memory:", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_register_unsupported_backend() {
        let registry = ConnectionRegistry::new();
        let err = registry
            .register("pg", "postgres://localhost/app", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_close_missing() {
        let registry = ConnectionRegistry::new();
        let err = registry.close("missing").await.unwrap_err();
        assert!(matches!(err, DbError::ConnectionNotFound { name } if name == "missing"));
    }

    #[tokio::test]
    async fn test_close_removes_connection() {
        let registry = ConnectionRegistry::new();
        registry.register("a", "sqlite::memory:", None).await.unwrap();
        registry.close("a").await.unwrap();
        assert!(!registry.contains("a").await);
        assert!(registry.require("a").await.is_err());
    }

    #[tokio::test]
    async fn test_register_handle_duplicate_keeps_first() {
        use crate::config::PoolOptions;
        use crate::query::QueryFragment;

        let registry = ConnectionRegistry::new();
        let pool_opts = PoolOptions::default();
        let open = || SqlitePoolExecutor::connect("sqlite::memory:", &pool_opts, false);

        let first = registry
            .register_handle("shared", Some(Arc::new(open().await.unwrap())), None)
            .await
            .unwrap();
        assert_eq!(first.name(), "shared");

        let err = registry
            .register_handle("shared", Some(Arc::new(open().await.unwrap())), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        // The registered connection is the first one and still works
        let kept = registry.require("shared").await.unwrap();
        assert!(Arc::ptr_eq(&kept, &first));
        let one: i64 = kept.fetch_scalar(&QueryFragment::new("SELECT 1")).await.unwrap();
        assert_eq!(one, 1);
    }
}
