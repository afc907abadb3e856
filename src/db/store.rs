//! Base type for repositories.
//!
//! A repository embeds a [`Store`] and runs its queries through
//! [`Store::conn`]. Swapping the connection (for example to a transaction
//! begun on it) redirects every later query of that repository.

use std::sync::Arc;

use crate::db::connection::Connection;
use crate::db::registry::ConnectionRegistry;
use crate::error::DbResult;

#[derive(Debug, Clone)]
pub struct Store {
    conn: Arc<Connection>,
}

impl Store {
    pub fn new(conn: Arc<Connection>) -> Self {
        Self { conn }
    }

    /// Build a store on a registered connection.
    pub async fn from_registry(registry: &ConnectionRegistry, name: &str) -> DbResult<Self> {
        registry.require(name).await.map(Self::new)
    }

    pub fn conn(&self) -> &Arc<Connection> {
        &self.conn
    }

    pub fn set_connection(&mut self, conn: Arc<Connection>) {
        self.conn = conn;
    }
}
