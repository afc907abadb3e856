//! Configuration handling for dbstore.
//!
//! This module provides the CLI configuration (arguments and environment
//! variables), database URL parsing with pool options, and the per-connection
//! settings every [`Connection`](crate::db::Connection) carries.

use clap::Parser;
use std::time::Duration;
use url::Url;

use crate::models::DatabaseType;
use crate::query::QueryOptionsConfig;

/// Name used when a connection is registered or looked up without one.
pub const DEFAULT_CONNECTION_NAME: &str = "default";

pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

// Pool configuration defaults. SQLite keeps an in-memory database inside the
// connection that created it, so those pools are pinned to one connection.
pub const DEFAULT_FILE_MAX_CONNECTIONS: u32 = 4;
pub const MEMORY_MAX_CONNECTIONS: u32 = 1;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 1;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Pool overrides taken from the database URL. Unset fields fall back to the
/// defaults above when the pool is built.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PoolOptions {
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub idle_timeout: Option<Duration>,
    pub acquire_timeout: Option<Duration>,
    /// Ping a pooled connection before handing it out.
    pub test_before_acquire: Option<bool>,
}

/// Pool settings with every default applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSizing {
    pub max_connections: u32,
    pub min_connections: u32,
    /// `None` keeps idle connections open forever.
    pub idle_timeout: Option<Duration>,
    pub acquire_timeout: Duration,
    pub test_before_acquire: bool,
}

impl PoolOptions {
    /// Resolve the overrides for a file database or an in-memory one.
    ///
    /// In-memory pools always hold exactly one connection that never idles
    /// out, whatever `max_connections` asks for. `min_connections` is
    /// clamped to the resolved maximum.
    pub fn resolve(&self, in_memory: bool) -> PoolSizing {
        let max_connections = if in_memory {
            MEMORY_MAX_CONNECTIONS
        } else {
            self.max_connections.unwrap_or(DEFAULT_FILE_MAX_CONNECTIONS)
        };
        let min_connections = self
            .min_connections
            .unwrap_or(DEFAULT_MIN_CONNECTIONS)
            .min(max_connections);

        PoolSizing {
            max_connections,
            min_connections,
            idle_timeout: (!in_memory).then(|| self.idle_timeout.unwrap_or(DEFAULT_IDLE_TIMEOUT)),
            acquire_timeout: self.acquire_timeout.unwrap_or(DEFAULT_ACQUIRE_TIMEOUT),
            test_before_acquire: self.test_before_acquire.unwrap_or(true),
        }
    }

    /// Reject sizes no pool can satisfy.
    pub fn validate(&self) -> Result<(), String> {
        let max = self.max_connections.unwrap_or(DEFAULT_FILE_MAX_CONNECTIONS);
        match (self.max_connections, self.min_connections) {
            (Some(0), _) => Err("max_connections must be greater than 0".to_string()),
            (_, Some(0)) => Err("min_connections must be greater than 0".to_string()),
            (_, Some(min)) if min > max => Err(format!(
                "min_connections ({min}) cannot exceed max_connections ({max})"
            )),
            _ => Ok(()),
        }
    }
}

/// Behaviour shared by a root connection and every transaction begun on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Abandon a driver call after this long. `None` waits indefinitely.
    pub query_timeout: Option<Duration>,
    /// Log rendered SQL at `debug` instead of `trace`.
    pub log_queries: bool,
}

/// Database connection configuration parsed from a CLI argument.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// From the "name=url" form, or "default".
    pub name: String,
    pub db_type: DatabaseType,
    /// Driver connection string with dbstore-specific options removed.
    pub connection_string: String,
    /// Open the database read-only. Default: false
    pub read_only: bool,
    pub pool_options: PoolOptions,
}

impl DatabaseConfig {
    /// Parse a database config from CLI argument.
    ///
    /// # Format
    ///
    /// ```text
    /// sqlite:data.db                              # registered as "default"
    /// app=sqlite:data.db                          # registered as "app"
    /// app=sqlite:data.db?max_connections=8        # pool options
    /// stats=sqlite:stats.db?read_only=true        # opened read-only
    /// data.db                                     # bare path, sqlite assumed
    /// ```
    pub fn parse(s: &str) -> Result<Self, String> {
        // A name never contains ':' or '?', so only look before those
        let head_end = s.find([':', '?']).unwrap_or(s.len());
        let (name, url_str) = match s[..head_end].find('=') {
            Some(idx) => (s[..idx].trim(), &s[idx + 1..]),
            None => ("", s),
        };
        Self::from_url(name, url_str)
    }

    /// Parse a connection string registered under `name` (empty → "default").
    pub fn from_url(name: &str, url_str: &str) -> Result<Self, String> {
        let url_str = match DatabaseType::from_connection_string(url_str) {
            Some(_) => url_str.to_string(),
            None if !url_str.contains("://") => format!("sqlite:{url_str}"),
            None => return Err(format!("Unknown database type for: {url_str}")),
        };

        let mut url = Url::parse(&url_str).map_err(|e| format!("Invalid URL: {e}"))?;
        let (read_only, pool_options) = Self::take_options(&mut url)?;
        pool_options.validate()?;

        let db_type = DatabaseType::from_connection_string(url.as_str())
            .ok_or_else(|| format!("Unknown database type for: {url}"))?;

        let name = if name.is_empty() {
            DEFAULT_CONNECTION_NAME.to_string()
        } else {
            name.to_string()
        };

        Ok(Self {
            name,
            db_type,
            connection_string: url.to_string(),
            read_only,
            pool_options,
        })
    }

    /// Remove dbstore's own query parameters from `url` and parse them.
    /// Keys match case-insensitively; everything else stays for the driver.
    fn take_options(url: &mut Url) -> Result<(bool, PoolOptions), String> {
        let mut read_only = false;
        let mut pool = PoolOptions::default();
        let mut driver_params = Vec::new();

        for (key, value) in url.query_pairs().into_owned() {
            match key.to_ascii_lowercase().as_str() {
                "read_only" => read_only = parse_value(&key, &value.to_ascii_lowercase())?,
                "max_connections" => pool.max_connections = Some(parse_value(&key, &value)?),
                "min_connections" => pool.min_connections = Some(parse_value(&key, &value)?),
                "idle_timeout" => {
                    pool.idle_timeout = Some(Duration::from_secs(parse_value(&key, &value)?))
                }
                "acquire_timeout" => {
                    pool.acquire_timeout = Some(Duration::from_secs(parse_value(&key, &value)?))
                }
                "test_before_acquire" => {
                    pool.test_before_acquire = Some(parse_value(&key, &value.to_ascii_lowercase())?)
                }
                _ => driver_params.push((key, value)),
            }
        }

        if driver_params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(driver_params);
        }
        Ok((read_only, pool))
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("Invalid value '{value}' for URL option '{key}'"))
}

/// Configuration for the dbstore CLI.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dbstore",
    about = "Run queries against named SQLite connections with validated pagination and sorting",
    version
)]
pub struct Config {
    /// Database connections to register.
    /// Format: "connection_string" or "name=connection_string".
    /// Can be specified multiple times.
    #[arg(
        short = 'd',
        long = "database",
        value_name = "URL",
        env = "DBSTORE_DATABASE",
        value_delimiter = ','
    )]
    pub databases: Vec<String>,

    /// Connection to run the statement on
    #[arg(
        short,
        long,
        default_value = DEFAULT_CONNECTION_NAME,
        env = "DBSTORE_CONNECTION"
    )]
    pub connection: String,

    /// SQL to run. Use {} for positional arguments.
    #[arg(short, long)]
    pub sql: String,

    /// Positional arguments for the {} placeholders in --sql
    #[arg(short, long = "arg", value_name = "VALUE")]
    pub args: Vec<String>,

    /// Execute as a statement and print affected rows instead of fetching
    #[arg(long)]
    pub exec: bool,

    /// Run the statement inside a transaction and roll it back afterwards
    #[arg(long, conflicts_with = "commit")]
    pub dry_run: bool,

    /// Run the statement inside a transaction and commit it
    #[arg(long)]
    pub commit: bool,

    /// Query options as a URL query string, e.g. "limit=20&page=2&sort=name:desc"
    #[arg(short, long, env = "DBSTORE_OPTIONS")]
    pub options: Option<String>,

    /// Columns accepted in sort options
    #[arg(long, value_delimiter = ',', env = "DBSTORE_SORT_ALLOW")]
    pub sort_allow: Vec<String>,

    /// ORDER BY expression used when no sort option is given
    #[arg(long, env = "DBSTORE_SORT_DEFAULT")]
    pub sort_default: Option<String>,

    /// Upper bound for the limit option
    #[arg(long, default_value_t = crate::query::options::DEFAULT_LIMIT_MAX, env = "DBSTORE_LIMIT_MAX")]
    pub limit_max: u32,

    /// Limit used when the limit option is zero or not a number
    #[arg(long, default_value_t = crate::query::options::DEFAULT_LIMIT_DEFAULT, env = "DBSTORE_LIMIT_DEFAULT")]
    pub limit_default: u32,

    /// Filter parameter names accepted in options
    #[arg(long, value_delimiter = ',', env = "DBSTORE_PARAMS_ALLOW")]
    pub params_allow: Vec<String>,

    /// Query timeout in seconds (0 disables it)
    #[arg(
        long,
        default_value_t = DEFAULT_QUERY_TIMEOUT_SECS,
        env = "DBSTORE_QUERY_TIMEOUT"
    )]
    pub query_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "DBSTORE_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "DBSTORE_JSON_LOGS")]
    pub json_logs: bool,

    /// Log every rendered query at debug level
    #[arg(long, env = "DBSTORE_LOG_QUERIES")]
    pub log_queries: bool,
}

impl Config {
    /// Parse all database configurations.
    pub fn parse_databases(&self) -> Result<Vec<DatabaseConfig>, String> {
        self.databases
            .iter()
            .map(|s| DatabaseConfig::parse(s))
            .collect()
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            query_timeout: (self.query_timeout > 0)
                .then(|| Duration::from_secs(self.query_timeout)),
            log_queries: self.log_queries,
        }
    }

    /// Allow-list policy built from the sort/limit/params flags.
    pub fn query_options_config(&self) -> QueryOptionsConfig {
        let mut cfg = QueryOptionsConfig::new()
            .with_sort_allow(self.sort_allow.iter().cloned())
            .with_limits(self.limit_default, self.limit_max)
            .with_params_allow(self.params_allow.iter().cloned());
        if let Some(default) = &self.sort_default {
            cfg = cfg.with_sort_default(default.clone());
        }
        cfg
    }
}
