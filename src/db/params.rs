//! Parameter binding utilities for database queries.
//!
//! Binds positional [`SqlValue`]s onto sqlx query objects.

use crate::models::SqlValue;
use sqlx::Sqlite;
use sqlx::sqlite::SqliteArguments;

pub(crate) type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Bind one value to a SQLite query.
pub(crate) fn bind_sqlite_param<'q>(query: SqliteQuery<'q>, param: &'q SqlValue) -> SqliteQuery<'q> {
    match param {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::String(v) => query.bind(v.as_str()),
        SqlValue::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Build a query for `sql` with every argument bound in order.
pub(crate) fn sqlite_query<'q>(sql: &'q str, args: &'q [SqlValue]) -> SqliteQuery<'q> {
    args.iter()
        .fold(sqlx::query(sql), |query, arg| bind_sqlite_param(query, arg))
}
