//! Connection URL model.
//!
//! A database URL has the shape `<scheme>://<rest>`. The scheme picks the
//! backend through [`SCHEMES`]; the rest is interpreted by that backend.

use crate::error::{DbError, DbResult};
use crate::models::Dialect;

/// Separator between the scheme and the rest of a database URL.
pub const SCHEME_SEPARATOR: &str = "://";

/// In-memory marker accepted in place of a SQLite file path.
pub const SQLITE_MEMORY: &str = ":memory:";

/// Scheme lookup table. New backends are added here.
pub const SCHEMES: &[(&str, Dialect)] = &[
    ("sqlite", Dialect::SQLite),
    ("postgresql", Dialect::PostgreSQL),
    ("postgres", Dialect::PostgreSQL),
];

/// A parsed `<scheme>://<rest>` database URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseUrl {
    scheme: String,
    rest: String,
    dialect: Dialect,
}

impl DatabaseUrl {
    /// Parse a database URL.
    ///
    /// Fails with [`DbError::InvalidUrl`] unless the string splits into
    /// exactly two parts on `://`, and with [`DbError::UnknownScheme`] when
    /// the scheme has no backend.
    pub fn parse(url: &str) -> DbResult<Self> {
        let parts: Vec<&str> = url.split(SCHEME_SEPARATOR).collect();
        let [scheme, rest] = parts.as_slice() else {
            return Err(DbError::invalid_url(url));
        };

        let dialect = Self::lookup_scheme(scheme).ok_or_else(|| DbError::unknown_scheme(*scheme))?;

        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            rest: rest.to_string(),
            dialect,
        })
    }

    fn lookup_scheme(scheme: &str) -> Option<Dialect> {
        SCHEMES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(scheme))
            .map(|(_, dialect)| *dialect)
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Everything after `://`.
    pub fn rest(&self) -> &str {
        &self.rest
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// SQLite file path (or [`SQLITE_MEMORY`]): the rest with one leading
    /// `/` stripped, so `sqlite:///app.db` is relative and
    /// `sqlite:////var/app.db` is absolute.
    pub fn sqlite_path(&self) -> &str {
        self.rest.strip_prefix('/').unwrap_or(&self.rest)
    }

    /// True for `sqlite:///:memory:`.
    pub fn is_memory(&self) -> bool {
        self.dialect == Dialect::SQLite && self.sqlite_path() == SQLITE_MEMORY
    }

    /// Full URL as originally written.
    pub fn as_connection_string(&self) -> String {
        format!("{}{}{}", self.scheme, SCHEME_SEPARATOR, self.rest)
    }

    /// Get a display-safe version of the URL (password masked).
    pub fn masked(&self) -> String {
        let connection_string = self.as_connection_string();
        // Only the authority part can carry credentials
        let authority_end = self.rest.find('/').unwrap_or(self.rest.len());
        if let Some(at_pos) = self.rest[..authority_end].rfind('@') {
            if let Some(colon_pos) = self.rest[..at_pos].find(':') {
                return format!(
                    "{}{}{}****{}",
                    self.scheme,
                    SCHEME_SEPARATOR,
                    &self.rest[..colon_pos + 1],
                    &self.rest[at_pos..]
                );
            }
        }
        connection_string
    }
}

impl std::str::FromStr for DatabaseUrl {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for DatabaseUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.masked())
    }
}
