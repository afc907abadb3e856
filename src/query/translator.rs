//! Rendering query fragments into dialect SQL.

use super::fragment::{QueryFragment, split_placeholders};
use crate::models::{DatabaseType, SqlValue};
use thiserror::Error;

/// SQL text plus positional arguments, ready for the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
    pub sql: String,
    pub args: Vec<SqlValue>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("query fragment is empty")]
    Empty,

    #[error("part {part} has {placeholders} placeholder(s) but {args} argument(s)")]
    ArgumentMismatch {
        part: usize,
        placeholders: usize,
        args: usize,
    },
}

/// Turns a [`QueryFragment`] into SQL for one dialect.
pub trait FragmentTranslator: Send + Sync {
    fn render(&self, fragment: &QueryFragment) -> Result<RenderedQuery, RenderError>;
}

/// Translator that joins parts with spaces and rewrites `{}` markers.
/// `{{}}` comes out as a literal `{}`.
#[derive(Debug, Clone, Copy)]
pub struct PlaceholderTranslator {
    dialect: DatabaseType,
}

impl PlaceholderTranslator {
    pub fn new(dialect: DatabaseType) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> DatabaseType {
        self.dialect
    }
}

impl Default for PlaceholderTranslator {
    fn default() -> Self {
        Self::new(DatabaseType::SQLite)
    }
}

impl FragmentTranslator for PlaceholderTranslator {
    fn render(&self, fragment: &QueryFragment) -> Result<RenderedQuery, RenderError> {
        if fragment.is_empty() {
            return Err(RenderError::Empty);
        }

        let mut sql = String::new();
        let mut args = Vec::with_capacity(fragment.arg_count());

        for (idx, part) in fragment.parts().iter().enumerate() {
            let placeholders = part.placeholder_count();
            if placeholders != part.args.len() {
                return Err(RenderError::ArgumentMismatch {
                    part: idx,
                    placeholders,
                    args: part.args.len(),
                });
            }

            let text = part.sql.trim();
            if text.is_empty() {
                continue;
            }
            if !sql.is_empty() {
                sql.push(' ');
            }

            let mut position = args.len();
            let segments = split_placeholders(text);
            let mut pieces = segments.iter();
            if let Some(first) = pieces.next() {
                sql.push_str(first);
            }
            for piece in pieces {
                position += 1;
                if self.dialect.numbered_placeholders() {
                    sql.push('$');
                    sql.push_str(&position.to_string());
                } else {
                    sql.push('?');
                }
                sql.push_str(piece);
            }
            args.extend(part.args.iter().cloned());
        }

        Ok(RenderedQuery { sql, args })
    }
}
