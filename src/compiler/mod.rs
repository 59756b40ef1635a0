//! Query translation.
//!
//! Sessions accept either statement text (with optional positional or named
//! parameters) or a portable query implementing [`Compile`]. Both are
//! resolved into a [`Statement`] for the session's dialect right before they
//! are sent to the driver:
//! - portable queries are compiled through [`Compile::compile`]
//! - named `:param` references are rewritten into positional placeholders

pub mod builder;
pub mod named;

use crate::error::DbResult;
use crate::models::{CompiledQuery, Dialect, Params, QueryParam};

pub use builder::{Delete, Insert, Op, Select, Table, Update};

/// A backend-agnostic query that can be turned into dialect-specific text.
pub trait Compile: Send + Sync {
    fn compile(&self, dialect: Dialect) -> DbResult<CompiledQuery>;
}

/// Anything a session can execute.
pub enum Query<'a> {
    /// Statement text, already in the target dialect.
    Text(CompiledQuery),
    /// A portable query compiled on use.
    Portable(&'a dyn Compile),
}

impl<'a> Query<'a> {
    pub fn portable(query: &'a dyn Compile) -> Self {
        Self::Portable(query)
    }

    /// Resolve into final text and positional parameters for `dialect`.
    pub fn resolve(self, dialect: Dialect) -> DbResult<Statement> {
        let compiled = match self {
            Query::Text(compiled) => compiled,
            Query::Portable(query) => query.compile(dialect)?,
        };
        Statement::from_compiled(compiled, dialect)
    }
}

impl std::fmt::Debug for Query<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Query::Text(compiled) => f.debug_tuple("Text").field(compiled).finish(),
            Query::Portable(_) => f.debug_tuple("Portable").finish_non_exhaustive(),
        }
    }
}

impl From<&str> for Query<'_> {
    fn from(sql: &str) -> Self {
        Query::Text(CompiledQuery::new(sql))
    }
}

impl From<String> for Query<'_> {
    fn from(sql: String) -> Self {
        Query::Text(CompiledQuery::new(sql))
    }
}

impl From<CompiledQuery> for Query<'_> {
    fn from(compiled: CompiledQuery) -> Self {
        Query::Text(compiled)
    }
}

impl<'a> From<&'a Insert> for Query<'a> {
    fn from(query: &'a Insert) -> Self {
        Query::Portable(query)
    }
}

impl<'a> From<&'a Select> for Query<'a> {
    fn from(query: &'a Select) -> Self {
        Query::Portable(query)
    }
}

impl<'a> From<&'a Update> for Query<'a> {
    fn from(query: &'a Update) -> Self {
        Query::Portable(query)
    }
}

impl<'a> From<&'a Delete> for Query<'a> {
    fn from(query: &'a Delete) -> Self {
        Query::Portable(query)
    }
}

/// Final statement text with positional parameters, ready for binding.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<QueryParam>,
}

impl Statement {
    fn from_compiled(compiled: CompiledQuery, dialect: Dialect) -> DbResult<Self> {
        match compiled.params {
            Params::None => Ok(Self {
                sql: compiled.sql,
                params: Vec::new(),
            }),
            Params::Positional(params) => Ok(Self {
                sql: compiled.sql,
                params,
            }),
            Params::Named(pairs) => {
                let (sql, params) = named::rewrite(&compiled.sql, &pairs, dialect)?;
                Ok(Self { sql, params })
            }
        }
    }
}
