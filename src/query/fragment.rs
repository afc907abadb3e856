//! Structured query descriptor.
//!
//! A [`QueryFragment`] is an ordered list of SQL snippets. Each snippet marks
//! its positional arguments with `{}`; the fragment translator turns those
//! into the dialect's placeholders when the query is rendered.
//!
//! Every `{}` counts as a marker, including one inside a quoted SQL literal.
//! Write `{{}}` for a literal `{}` in the rendered SQL.

use crate::models::SqlValue;

/// Placeholder marker used inside fragment text.
pub const PLACEHOLDER: &str = "{}";

/// Renders as a literal `{}` and binds nothing.
pub const ESCAPED_PLACEHOLDER: &str = "{{}}";

/// Split `text` at its placeholders, unescaping `{{}}` along the way.
///
/// The result always has one more segment than there are placeholders.
pub(crate) fn split_placeholders(text: &str) -> Vec<String> {
    let mut segments = vec![String::new()];
    for (idx, chunk) in text.split(ESCAPED_PLACEHOLDER).enumerate() {
        let mut pieces = chunk.split(PLACEHOLDER);
        if let Some(current) = segments.last_mut() {
            if idx > 0 {
                current.push_str(PLACEHOLDER);
            }
            current.push_str(pieces.next().unwrap_or_default());
        }
        segments.extend(pieces.map(str::to_string));
    }
    segments
}

/// One snippet of a query and the arguments bound to its placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentPart {
    pub sql: String,
    pub args: Vec<SqlValue>,
}

impl FragmentPart {
    /// Number of `{}` markers in this snippet, not counting `{{}}` escapes.
    pub fn placeholder_count(&self) -> usize {
        split_placeholders(&self.sql).len() - 1
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFragment {
    parts: Vec<FragmentPart>,
}

impl QueryFragment {
    /// Start a fragment with a snippet that takes no arguments.
    pub fn new(sql: impl Into<String>) -> Self {
        let mut fragment = Self::default();
        fragment.append(sql);
        fragment
    }

    /// Start a fragment with a snippet and its arguments.
    pub fn with_args<I, V>(sql: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        let mut fragment = Self::default();
        fragment.append_with(sql, args);
        fragment
    }

    /// Append a snippet without arguments.
    pub fn append(&mut self, sql: impl Into<String>) -> &mut Self {
        self.parts.push(FragmentPart {
            sql: sql.into(),
            args: Vec::new(),
        });
        self
    }

    /// Append a snippet together with the arguments for its placeholders.
    pub fn append_with<I, V>(&mut self, sql: impl Into<String>, args: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        self.parts.push(FragmentPart {
            sql: sql.into(),
            args: args.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn parts(&self) -> &[FragmentPart] {
        &self.parts
    }

    /// True when no snippet carries any SQL text.
    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(|p| p.sql.trim().is_empty())
    }

    /// Total number of bound arguments.
    pub fn arg_count(&self) -> usize {
        self.parts.iter().map(|p| p.args.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_fragment_has_one_part() {
        let q = QueryFragment::new("SELECT * FROM users");
        assert_eq!(q.parts().len(), 1);
        assert_eq!(q.arg_count(), 0);
        assert!(!q.is_empty());
    }

    #[test]
    fn test_append_chains() {
        let mut q = QueryFragment::new("SELECT * FROM users");
        q.append_with("WHERE age > {}", [18])
            .append_with("AND name = {}", ["bob"]);
        assert_eq!(q.parts().len(), 3);
        assert_eq!(q.arg_count(), 2);
        assert_eq!(q.parts()[2].args, vec![SqlValue::String("bob".into())]);
    }

    #[test]
    fn test_empty_fragment() {
        assert!(QueryFragment::default().is_empty());
        assert!(QueryFragment::new("   ").is_empty());
    }

    #[test]
    fn test_placeholder_count() {
        let q = QueryFragment::with_args("id IN ({}, {}, {})", [1, 2, 3]);
        assert_eq!(q.parts()[0].placeholder_count(), 3);
    }

    #[test]
    fn test_escaped_placeholder_is_not_counted() {
        let q = QueryFragment::with_args("WHERE data = '{{}}' AND id = {}", [1]);
        assert_eq!(q.parts()[0].placeholder_count(), 1);
        assert_eq!(QueryFragment::new("SELECT '{{}}{{}}'").parts()[0].placeholder_count(), 0);
    }

    #[test]
    fn test_split_placeholders() {
        assert_eq!(split_placeholders("a = {} AND b = {}"), ["a = ", " AND b = ", ""]);
        assert_eq!(split_placeholders("x = '{{}}' OR y = {}"), ["x = '{}' OR y = ", ""]);
        assert_eq!(split_placeholders("{{}}{}{{}}"), ["{}", "{}"]);
        assert_eq!(split_placeholders("SELECT 1"), ["SELECT 1"]);
    }
}
