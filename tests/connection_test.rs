//! Integration tests for connections and transactions against SQLite.

use dbstore::config::ConnectionSettings;
use dbstore::db::{Connection, ConnectionRegistry};
use dbstore::error::{DbError, ErrorKind};
use dbstore::models::SqlValue;
use dbstore::query::{QueryFragment, QueryOptions, QueryOptionsConfig};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[derive(Debug, Deserialize, PartialEq)]
struct User {
    id: i64,
    name: String,
    age: Option<i64>,
    active: bool,
}

async fn seed(conn: &Connection) {
    conn.exec(&QueryFragment::new(
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER, active BOOLEAN NOT NULL)",
    ))
    .await
    .unwrap();

    for (name, age, active) in [
        ("carol", Some(41), true),
        ("alice", Some(30), true),
        ("dave", None, false),
        ("bob", Some(25), true),
        ("erin", Some(35), false),
    ] {
        conn.exec(&QueryFragment::with_args(
            "INSERT INTO users (name, age, active) VALUES ({}, {}, {})",
            [SqlValue::from(name), SqlValue::from(age), SqlValue::from(active)],
        ))
        .await
        .unwrap();
    }
}

/// Counts through the multi-row path so the read statement runs to completion.
async fn count_users(conn: &Connection) -> i64 {
    let records = conn
        .fetch_records(&QueryFragment::new("SELECT COUNT(*) FROM users"))
        .await
        .unwrap();
    records[0].get_index(0).and_then(|v| v.as_i64()).unwrap()
}

async fn memory_db() -> (ConnectionRegistry, Arc<Connection>) {
    let registry = ConnectionRegistry::new();
    let conn = registry.register("", "sqlite::memory:", None).await.unwrap();
    seed(&conn).await;
    (registry, conn)
}

#[tokio::test]
async fn test_paginated_sorted_fetch() {
    let (_registry, conn) = memory_db().await;
    let cfg = QueryOptionsConfig::new()
        .with_sort_allow(["name", "age"])
        .with_limits(10, 2)
        .shared();

    let mut options = QueryOptions::new(cfg);
    options
        .fill_from_query("limit=50&sort=name:desc&page=2&sort=id")
        .unwrap();
    assert_eq!(options.limit(), 2);

    let mut fragment = QueryFragment::new("SELECT id, name, age, active FROM users");
    options.apply_to_query(&mut fragment).unwrap();
    assert_eq!(options.offset(), 2);

    let users: Vec<User> = conn.fetch_all(&fragment).await.unwrap();
    let names: Vec<&str> = users.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, ["carol", "bob"]);
}

#[tokio::test]
async fn test_filter_params_feed_where_clause() {
    let (_registry, conn) = memory_db().await;
    let cfg = QueryOptionsConfig::new()
        .with_sort_allow(["age"])
        .with_sort_default("id")
        .with_params_allow(["min_age"])
        .shared();

    let mut options = QueryOptions::new(cfg);
    options
        .fill_from_pairs([("min_age", "30"), ("role", "admin"), ("limit", "0")])
        .unwrap();
    assert!(!options.has_param("role"));
    assert_eq!(options.limit(), 100);

    let min_age: i64 = options.get_param("min_age").unwrap().parse().unwrap();
    let mut fragment = QueryFragment::new("SELECT id, name, age, active FROM users");
    fragment.append_with("WHERE age >= {}", [min_age]);
    options.apply_to_query(&mut fragment).unwrap();

    let users: Vec<User> = conn.fetch_all(&fragment).await.unwrap();
    let ids: Vec<i64> = users.iter().map(|u| u.id).collect();
    assert_eq!(ids, [1, 2, 5]);
}

#[tokio::test]
async fn test_fetch_one_and_scalar() {
    let (_registry, conn) = memory_db().await;

    let dave: User = conn
        .fetch_one(&QueryFragment::with_args(
            "SELECT id, name, age, active FROM users WHERE name = {}",
            ["dave"],
        ))
        .await
        .unwrap();
    assert_eq!(
        dave,
        User {
            id: 3,
            name: "dave".into(),
            age: None,
            active: false
        }
    );

    let (count, oldest): (i64, i64) = conn
        .fetch_scalar(&QueryFragment::new("SELECT COUNT(*), MAX(age) FROM users"))
        .await
        .unwrap();
    assert_eq!((count, oldest), (5, 41));

    let err = conn
        .fetch_one::<User>(&QueryFragment::new(
            "SELECT id, name, age, active FROM users WHERE id > 100",
        ))
        .await
        .unwrap_err();
    assert!(err.is_no_rows());
}

#[tokio::test]
async fn test_execution_error_carries_rendered_query() {
    let (_registry, conn) = memory_db().await;
    let err = conn
        .exec(&QueryFragment::with_args(
            "INSERT INTO users (id, name, active) VALUES ({}, {}, {})",
            [SqlValue::from(1), SqlValue::from("dup"), SqlValue::from(true)],
        ))
        .await
        .unwrap_err();

    match err {
        DbError::Execution {
            sql,
            args,
            sql_state,
            ..
        } => {
            assert_eq!(sql, "INSERT INTO users (id, name, active) VALUES (?, ?, ?)");
            assert_eq!(args.len(), 3);
            assert!(sql_state.is_some());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_begin_leaves_parent_usable() {
    let dir = TempDir::new().unwrap();
    // Default pool sizing for a file database
    let url = format!("sqlite:{}", dir.path().join("tx.db").display());
    let registry = ConnectionRegistry::new();
    let conn = registry.register("", &url, None).await.unwrap();
    seed(&conn).await;

    let tx = conn.begin().await.unwrap();
    assert!(tx.is_transaction());
    assert!(!conn.is_transaction());

    tx.exec(&QueryFragment::new("DELETE FROM users WHERE active = 0"))
        .await
        .unwrap();
    assert_eq!(count_users(&tx).await, 3);

    // Parent reads on another pooled connection and misses the uncommitted delete
    let parent_count = tokio::time::timeout(Duration::from_secs(5), count_users(&conn))
        .await
        .expect("parent read blocked while transaction open");
    assert_eq!(parent_count, 5);

    tx.commit().await.unwrap();
    assert_eq!(count_users(&conn).await, 3);
}

#[tokio::test]
async fn test_transaction_capability_errors() {
    let (_registry, conn) = memory_db().await;

    let err = conn.commit().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);
    assert!(err.to_string().contains("cannot commit"));
    let err = conn.rollback().await.unwrap_err();
    assert!(err.to_string().contains("cannot rollback"));

    let tx = conn.begin().await.unwrap();
    let err = tx.begin().await.unwrap_err();
    assert!(err.to_string().contains("cannot begin"));

    tx.rollback().await.unwrap();
    assert!(matches!(tx.rollback().await, Err(DbError::TransactionClosed)));
    let count: i64 = conn
        .fetch_scalar(&QueryFragment::new("SELECT COUNT(*) FROM users"))
        .await
        .unwrap();
    assert_eq!(count, 5);
}

#[tokio::test]
async fn test_dropped_transaction_rolls_back() {
    let (_registry, conn) = memory_db().await;
    {
        let tx = conn.begin().await.unwrap();
        tx.exec(&QueryFragment::new("DELETE FROM users")).await.unwrap();
    }
    let count: i64 = conn
        .fetch_scalar(&QueryFragment::new("SELECT COUNT(*) FROM users"))
        .await
        .unwrap();
    assert_eq!(count, 5);
}

#[tokio::test]
async fn test_settings_inherited_by_transaction() {
    let settings = ConnectionSettings {
        query_timeout: Some(Duration::from_secs(5)),
        log_queries: true,
    };
    let registry = ConnectionRegistry::new().with_settings(settings);
    let conn = registry.register("", "sqlite::memory:", None).await.unwrap();
    let tx = conn.begin().await.unwrap();
    assert_eq!(tx.settings(), settings);
    tx.rollback().await.unwrap();
}
