//! Named parameter rewriting.
//!
//! Neither driver binds by name, so `:name` references are replaced with the
//! dialect's positional placeholders. The SQL is tokenized with sqlparser so
//! string literals, quoted identifiers, comments, dollar-quoted bodies and
//! PostgreSQL `::type` casts are never mistaken for parameters.

use crate::error::{DbError, DbResult};
use crate::models::{BindStyle, Dialect, QueryParam};
use sqlparser::dialect::{Dialect as SqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::tokenizer::{Location, Span, Token, TokenWithSpan, Tokenizer};
use std::collections::HashMap;

/// Get the sqlparser dialect used to tokenize statements for `dialect`.
fn get_dialect(dialect: Dialect) -> Box<dyn SqlDialect> {
    match dialect {
        Dialect::PostgreSQL => Box::new(PostgreSqlDialect {}),
        Dialect::SQLite => Box::new(SQLiteDialect {}),
    }
}

/// Rewrite `sql` so every `:name` becomes a positional placeholder, returning
/// the new text and the parameters in binding order.
///
/// With numbered placeholders a name used twice is bound once; with `?`
/// placeholders the value is repeated for each occurrence. Text outside the
/// replaced references is copied byte for byte.
pub fn rewrite(
    sql: &str,
    pairs: &[(String, QueryParam)],
    dialect: Dialect,
) -> DbResult<(String, Vec<QueryParam>)> {
    let values: HashMap<&str, &QueryParam> =
        pairs.iter().map(|(k, v)| (k.as_str(), v)).collect();

    let sql_dialect = get_dialect(dialect);
    let tokens = Tokenizer::new(sql_dialect.as_ref(), sql)
        .with_unescape(false)
        .tokenize_with_location()
        .map_err(|e| DbError::invalid_input(format!("Failed to tokenize SQL: {}", e)))?;

    let lines = LineIndex::new(sql);
    let mut out = String::with_capacity(sql.len());
    let mut params = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut copied = 0;

    for (span, name) in named_references(&tokens) {
        let value = values.get(name).ok_or_else(|| {
            DbError::invalid_input(format!("No value bound for parameter :{}", name))
        })?;
        let start = lines.offset(span.start);
        let end = lines.offset(span.end);

        out.push_str(&sql[copied..start]);
        match dialect.bind_style() {
            BindStyle::Numbered => {
                let position = match positions.get(name) {
                    Some(&p) => p,
                    None => {
                        params.push((*value).clone());
                        positions.insert(name, params.len());
                        params.len()
                    }
                };
                out.push_str(&dialect.placeholder(position));
            }
            BindStyle::QuestionMark => {
                params.push((*value).clone());
                out.push_str(&dialect.placeholder(params.len()));
            }
        }
        copied = end;
    }
    out.push_str(&sql[copied..]);

    Ok((out, params))
}

/// `:name` references in token order, with the span covering colon and name.
///
/// Depending on the dialect the tokenizer yields either a single
/// `Placeholder(":name")` or a `Colon` directly followed by an unquoted word.
fn named_references(tokens: &[TokenWithSpan]) -> Vec<(Span, &str)> {
    let mut refs = Vec::new();
    let mut iter = tokens.iter().peekable();

    while let Some(tok) = iter.next() {
        match &tok.token {
            Token::Placeholder(p) if p.len() > 1 && p.starts_with(':') => {
                refs.push((tok.span, &p[1..]));
            }
            Token::Colon => {
                let Some(next) = iter.peek() else { continue };
                if let Token::Word(word) = &next.token {
                    if word.quote_style.is_none() {
                        let span = Span::new(tok.span.start, next.span.end);
                        refs.push((span, word.value.as_str()));
                        iter.next();
                    }
                }
            }
            _ => {}
        }
    }

    refs
}

/// Maps tokenizer locations (1-based line and character column) to byte
/// offsets in the source text.
struct LineIndex<'a> {
    sql: &'a str,
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(sql: &'a str) -> Self {
        let starts = std::iter::once(0)
            .chain(sql.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { sql, starts }
    }

    fn offset(&self, location: Location) -> usize {
        let line = (location.line as usize).saturating_sub(1);
        let Some(&line_start) = self.starts.get(line) else {
            return self.sql.len();
        };
        let column = (location.column as usize).saturating_sub(1);
        self.sql[line_start..]
            .char_indices()
            .nth(column)
            .map(|(i, _)| line_start + i)
            .unwrap_or(self.sql.len())
    }
}
