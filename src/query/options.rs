//! Pagination, sorting and filter options parsed from untrusted input.
//!
//! A [`QueryOptionsConfig`] is the allow-list policy, built once and shared
//! through an `Arc`. Each request gets its own [`QueryOptions`], fills it
//! from key/value pairs (usually a URL query string) and then applies it to
//! a [`QueryFragment`], which appends `ORDER BY`, `LIMIT` and `OFFSET`.
//!
//! # Parsing rules
//!
//! | key      | behaviour                                                        |
//! |----------|------------------------------------------------------------------|
//! | `limit`  | non-numeric or zero becomes `limit_default`, clamped to `limit_max` |
//! | `offset` | unsigned integer, parse failure is an error                      |
//! | `page`   | unsigned integer, parse failure is an error                      |
//! | `sort`   | `column[:desc]`, column must be in `sort_allow` or it is dropped |
//! | other    | kept as a filter parameter only when listed in `params_allow`    |
//!
//! Filter parameters are never applied to the query automatically.

use super::fragment::QueryFragment;
use crate::error::{DbError, DbResult};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default for `limit_max` when a config is deserialized without one.
pub const DEFAULT_LIMIT_MAX: u32 = 300;

/// Default for `limit_default` when a config is deserialized without one.
pub const DEFAULT_LIMIT_DEFAULT: u32 = 100;

fn default_limit_max() -> u32 {
    DEFAULT_LIMIT_MAX
}

fn default_limit_default() -> u32 {
    DEFAULT_LIMIT_DEFAULT
}

/// Allow-list policy for [`QueryOptions`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueryOptionsConfig {
    /// Column names that may appear in `sort`.
    #[serde(default)]
    pub sort_allow: Vec<String>,
    /// Raw ORDER BY expression used when no sort was requested.
    #[serde(default)]
    pub sort_default: Option<String>,
    #[serde(default = "default_limit_max")]
    pub limit_max: u32,
    #[serde(default = "default_limit_default")]
    pub limit_default: u32,
    /// Filter parameter names accepted from input.
    #[serde(default)]
    pub params_allow: Vec<String>,
    /// Log dropped sort columns and filter keys at `warn` instead of `debug`.
    #[serde(default)]
    pub warn_on_rejected: bool,
}

impl Default for QueryOptionsConfig {
    fn default() -> Self {
        Self {
            sort_allow: Vec::new(),
            sort_default: None,
            limit_max: DEFAULT_LIMIT_MAX,
            limit_default: DEFAULT_LIMIT_DEFAULT,
            params_allow: Vec::new(),
            warn_on_rejected: false,
        }
    }
}

impl QueryOptionsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sort_allow<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sort_allow = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_sort_default(mut self, expr: impl Into<String>) -> Self {
        let expr = expr.into();
        self.sort_default = (!expr.trim().is_empty()).then_some(expr);
        self
    }

    pub fn with_limits(mut self, limit_default: u32, limit_max: u32) -> Self {
        self.limit_default = limit_default;
        self.limit_max = limit_max;
        self
    }

    pub fn with_params_allow<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params_allow = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_warn_on_rejected(mut self, enabled: bool) -> Self {
        self.warn_on_rejected = enabled;
        self
    }

    /// Freeze the policy for sharing.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn sort_allowed(&self, column: &str) -> bool {
        self.sort_allow.iter().any(|c| c == column)
    }

    fn param_allowed(&self, name: &str) -> bool {
        self.params_allow.iter().any(|p| p == name)
    }

    fn rejected(&self, key: &str, value: &str, reason: &'static str) {
        if self.warn_on_rejected {
            warn!(key = %key, value = %value, reason, "Dropped query option");
        } else {
            debug!(key = %key, value = %value, reason, "Dropped query option");
        }
    }
}

/// Per-request pagination, sort and filter state.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    limit: u32,
    offset: u32,
    page: u32,
    sort: Vec<String>,
    params: HashMap<String, String>,
    cfg: Arc<QueryOptionsConfig>,
}

impl QueryOptions {
    /// Create empty options: no limit, offset, page, sort or filters.
    pub fn new(cfg: Arc<QueryOptionsConfig>) -> Self {
        Self {
            limit: 0,
            offset: 0,
            page: 0,
            sort: Vec::new(),
            params: HashMap::new(),
            cfg,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    /// Accepted sort expressions in encounter order.
    pub fn sort(&self) -> &[String] {
        &self.sort
    }

    pub fn config(&self) -> &QueryOptionsConfig {
        &self.cfg
    }

    /// Fill from ordered pairs. Every `sort` pair is kept, in order.
    ///
    /// On error nothing is applied.
    pub fn fill_from_pairs<I, K, V>(&mut self, pairs: I) -> DbResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut staged = self.clone();
        for (key, value) in pairs {
            staged.process_input(key.as_ref(), value.as_ref())?;
        }
        *self = staged;
        Ok(())
    }

    /// Fill from a plain string map.
    pub fn fill_from_map(&mut self, map: &HashMap<String, String>) -> DbResult<()> {
        self.fill_from_pairs(map.iter())
    }

    /// Fill from a URL-encoded query string (`limit=10&sort=name:desc`).
    ///
    /// Only the first value of a repeated key is used.
    pub fn fill_from_query(&mut self, query: &str) -> DbResult<()> {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut seen = HashSet::new();
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
            .filter(|(k, _)| seen.insert(k.to_string()))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        self.fill_from_pairs(pairs)
    }

    /// Fill from the query component of a URL.
    pub fn fill_from_url(&mut self, url: &url::Url) -> DbResult<()> {
        self.fill_from_query(url.query().unwrap_or(""))
    }

    fn process_input(&mut self, name: &str, value: &str) -> DbResult<()> {
        match name {
            "limit" => {
                let requested = value.trim().parse::<u32>().unwrap_or(0);
                self.limit = if requested == 0 {
                    self.cfg.limit_default
                } else {
                    requested.min(self.cfg.limit_max)
                };
            }
            "offset" => self.offset = parse_unsigned(name, value)?,
            "page" => self.page = parse_unsigned(name, value)?,
            "sort" => {
                let (column, direction) = match value.split_once(':') {
                    Some((column, direction)) => (column, Some(direction)),
                    None => (value, None),
                };
                if !self.cfg.sort_allowed(column) {
                    self.cfg.rejected(name, value, "sort column not allowed");
                    return Ok(());
                }
                let expr = match direction {
                    Some(d) if d.eq_ignore_ascii_case("desc") => format!("{column} DESC"),
                    _ => column.to_string(),
                };
                self.sort.push(expr);
            }
            _ => {
                if self.cfg.param_allowed(name) {
                    self.params.insert(name.to_string(), value.to_string());
                } else {
                    self.cfg.rejected(name, value, "parameter not allowed");
                }
            }
        }
        Ok(())
    }

    /// Append ORDER BY / LIMIT / OFFSET to `fragment`.
    ///
    /// A nonzero page overrides any parsed offset with `limit * (page - 1)`
    /// and requires a nonzero limit.
    pub fn apply_to_query(&mut self, fragment: &mut QueryFragment) -> DbResult<()> {
        if self.page > 0 {
            if self.limit == 0 {
                return Err(DbError::NoLimitDefined);
            }
            self.offset = self
                .limit
                .checked_mul(self.page - 1)
                .ok_or_else(|| DbError::invalid_integer("page", self.page.to_string()))?;
        }

        if !self.sort.is_empty() {
            fragment.append(format!("ORDER BY {}", self.sort.join(", ")));
        } else if let Some(default) = &self.cfg.sort_default {
            fragment.append(format!("ORDER BY {default}"));
        }

        if self.limit > 0 {
            fragment.append_with("LIMIT {}", [self.limit]);
        }

        if self.offset > 0 {
            fragment.append_with("OFFSET {}", [self.offset]);
        }

        Ok(())
    }

    /// Set a filter parameter directly, bypassing the allow-list.
    pub fn set_param(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn get_param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }
}

fn parse_unsigned(key: &str, value: &str) -> DbResult<u32> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|_| DbError::invalid_integer(key, value))
}
