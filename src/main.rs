//! dbstore - Main entry point.
//!
//! Registers the configured databases, renders one statement with optional
//! pagination/sort options and prints the result as JSON.

use clap::Parser;
use dbstore::config::Config;
use dbstore::db::{Connection, ConnectionRegistry};
use dbstore::error::DbResult;
use dbstore::models::SqlValue;
use dbstore::query::{QueryFragment, QueryOptions};
use serde_json::Value as JsonValue;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr so stdout only carries query results.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Interpret a command-line argument as the narrowest matching value.
fn parse_arg(raw: &str) -> SqlValue {
    if raw.eq_ignore_ascii_case("null") {
        SqlValue::Null
    } else if let Ok(v) = raw.parse::<i64>() {
        SqlValue::Int(v)
    } else if let Ok(v) = raw.parse::<f64>() {
        SqlValue::Float(v)
    } else if let Ok(v) = raw.parse::<bool>() {
        SqlValue::Bool(v)
    } else {
        SqlValue::String(raw.to_string())
    }
}

async fn run_statement(conn: &Connection, fragment: &QueryFragment, exec: bool) -> DbResult<JsonValue> {
    if exec {
        let outcome = conn.exec(fragment).await?;
        return Ok(serde_json::json!(outcome));
    }

    let mapper = conn.scanner().column_mapper();
    let rows: Vec<JsonValue> = conn
        .fetch_records(fragment)
        .await?
        .into_iter()
        .map(|record| JsonValue::Object(record.into_map(&mapper)))
        .collect();
    Ok(JsonValue::Array(rows))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    // Require at least one database to be configured
    if config.databases.is_empty() {
        eprintln!("Error: At least one database must be configured.");
        eprintln!();
        eprintln!("Usage: dbstore --database <connection_string> --sql <SQL>");
        eprintln!("       dbstore --database <name>=<connection_string> --connection <name> --sql <SQL>");
        eprintln!();
        eprintln!("Examples:");
        eprintln!("  dbstore -d sqlite:data.db --sql 'SELECT * FROM users' \\");
        eprintln!("      --sort-allow name,id --options 'limit=20&page=2&sort=name:desc'");
        eprintln!("  dbstore -d app=sqlite:app.db -c app --exec \\");
        eprintln!("      --sql 'DELETE FROM sessions WHERE user_id = {{}}' --arg 42 --dry-run");
        std::process::exit(1);
    }

    info!("Starting dbstore v{}", env!("CARGO_PKG_VERSION"));

    let registry = ConnectionRegistry::new().with_settings(config.connection_settings());

    let db_configs = config.parse_databases()?;
    info!(count = db_configs.len(), "Registering databases");
    for db_config in &db_configs {
        registry.register_config(db_config, None).await?;
    }

    let conn = registry.require(&config.connection).await?;

    let mut fragment =
        QueryFragment::with_args(config.sql.as_str(), config.args.iter().map(|a| parse_arg(a)));

    if let Some(raw) = &config.options {
        let mut options = QueryOptions::new(config.query_options_config().shared());
        options.fill_from_query(raw)?;
        options.apply_to_query(&mut fragment)?;
    }

    let result = if config.dry_run || config.commit {
        let tx = conn.begin().await?;
        let result = run_statement(&tx, &fragment, config.exec).await;
        if config.commit && result.is_ok() {
            tx.commit().await?;
        } else {
            tx.rollback().await?;
            info!("Transaction rolled back");
        }
        result
    } else {
        run_statement(&conn, &fragment, config.exec).await
    };

    registry.close_all().await;

    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Statement failed");
            Err(e.into())
        }
    }
}
