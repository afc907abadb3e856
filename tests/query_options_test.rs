//! Integration tests for query option parsing and rendering.

use dbstore::error::{DbError, ErrorKind};
use dbstore::models::{DatabaseType, SqlValue};
use dbstore::query::{
    FragmentTranslator, PlaceholderTranslator, QueryFragment, QueryOptions, QueryOptionsConfig,
};
use std::collections::HashMap;
use std::sync::Arc;

fn users_config() -> Arc<QueryOptionsConfig> {
    QueryOptionsConfig::new()
        .with_sort_allow(["name"])
        .with_limits(10, 50)
        .shared()
}

fn input(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn render(fragment: &QueryFragment, dialect: DatabaseType) -> (String, Vec<SqlValue>) {
    let rendered = PlaceholderTranslator::new(dialect).render(fragment).unwrap();
    (rendered.sql, rendered.args)
}

#[test]
fn test_limit_clamped_and_page_sets_offset() {
    let mut options = QueryOptions::new(users_config());
    options
        .fill_from_map(&input(&[("limit", "1000"), ("sort", "name:desc"), ("page", "2")]))
        .unwrap();
    assert_eq!(options.limit(), 50);

    let mut fragment = QueryFragment::new("SELECT * FROM users");
    options.apply_to_query(&mut fragment).unwrap();
    assert_eq!(options.offset(), 50);

    let (sql, args) = render(&fragment, DatabaseType::SQLite);
    assert_eq!(sql, "SELECT * FROM users ORDER BY name DESC LIMIT ? OFFSET ?");
    assert_eq!(args, vec![SqlValue::Int(50), SqlValue::Int(50)]);

    let (sql, _) = render(&fragment, DatabaseType::PostgreSQL);
    assert_eq!(sql, "SELECT * FROM users ORDER BY name DESC LIMIT $1 OFFSET $2");
}

#[test]
fn test_page_without_limit_fails() {
    let mut options = QueryOptions::new(users_config());
    options.fill_from_map(&input(&[("page", "3")])).unwrap();
    assert_eq!(options.limit(), 0);

    let mut fragment = QueryFragment::new("SELECT * FROM users");
    let err = options.apply_to_query(&mut fragment).unwrap_err();
    assert!(matches!(err, DbError::NoLimitDefined));
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn test_disallowed_sort_and_params_are_dropped() {
    let cfg = QueryOptionsConfig::new()
        .with_sort_allow(["name"])
        .with_params_allow(["status"])
        .with_warn_on_rejected(true)
        .shared();
    let mut options = QueryOptions::new(cfg);
    options
        .fill_from_pairs([
            ("sort", "password:desc"),
            ("sort", "name"),
            ("status", "active"),
            ("admin", "1"),
        ])
        .unwrap();

    assert_eq!(options.sort(), ["name"]);
    assert_eq!(options.get_param("status"), Some("active"));
    assert!(!options.has_param("admin"));

    let mut fragment = QueryFragment::new("SELECT * FROM users");
    options.apply_to_query(&mut fragment).unwrap();
    let (sql, args) = render(&fragment, DatabaseType::SQLite);
    assert_eq!(sql, "SELECT * FROM users ORDER BY name");
    assert!(args.is_empty());
}

#[test]
fn test_invalid_offset_leaves_options_untouched() {
    let mut options = QueryOptions::new(users_config());
    options.fill_from_query("limit=5").unwrap();

    let err = options
        .fill_from_query("limit=20&sort=name&offset=-1")
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidInteger { ref key, .. } if key == "offset"));
    assert_eq!(options.limit(), 5);
    assert!(options.sort().is_empty());
}

#[test]
fn test_url_ingestion_uses_first_value() {
    let url = url::Url::parse("https://api.example.com/users?limit=7&limit=9&sort=name:DESC").unwrap();
    let mut options = QueryOptions::new(users_config());
    options.fill_from_url(&url).unwrap();
    assert_eq!(options.limit(), 7);
    assert_eq!(options.sort(), ["name DESC"]);
}

#[test]
fn test_explicit_offset_without_page() {
    let mut options = QueryOptions::new(users_config());
    options.fill_from_query("?limit=0&offset=30").unwrap();
    assert_eq!(options.limit(), 10);

    let mut fragment = QueryFragment::with_args("SELECT * FROM users WHERE team = {}", ["red"]);
    options.apply_to_query(&mut fragment).unwrap();
    let (sql, args) = render(&fragment, DatabaseType::PostgreSQL);
    assert_eq!(sql, "SELECT * FROM users WHERE team = $1 LIMIT $2 OFFSET $3");
    assert_eq!(
        args,
        vec![SqlValue::from("red"), SqlValue::Int(10), SqlValue::Int(30)]
    );
}
