//! SQL dialects understood by the session layer.
//!
//! A dialect decides how parameters are spelled in statement text and which
//! statements open, release and roll back a savepoint.

/// Supported SQL dialects (one per backend).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    PostgreSQL,
    SQLite,
}

/// How a dialect spells positional parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindStyle {
    /// `?` for every parameter
    QuestionMark,
    /// `$1`, `$2`, ...
    Numbered,
}

impl Dialect {
    /// Get the display name for this dialect.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::SQLite => "SQLite",
        }
    }

    pub fn bind_style(&self) -> BindStyle {
        match self {
            Self::PostgreSQL => BindStyle::Numbered,
            Self::SQLite => BindStyle::QuestionMark,
        }
    }

    /// Placeholder for the parameter at 1-based `position`.
    pub fn placeholder(&self, position: usize) -> String {
        match self.bind_style() {
            BindStyle::QuestionMark => "?".to_string(),
            BindStyle::Numbered => format!("${}", position),
        }
    }

    /// Quote an identifier with double quotes, doubling embedded quotes.
    pub fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Statements that open savepoint `name`.
    ///
    /// `outermost` is true when no other savepoint is open on the connection.
    /// PostgreSQL only accepts savepoints inside a transaction block, so the
    /// outermost level starts one; SQLite starts a transaction implicitly.
    pub fn create_savepoint(&self, name: &str, outermost: bool) -> Vec<String> {
        let savepoint = format!("SAVEPOINT {}", self.quote_identifier(name));
        match self {
            Self::PostgreSQL if outermost => vec!["BEGIN".to_string(), savepoint],
            _ => vec![savepoint],
        }
    }

    /// Statements that make the work done since savepoint `name` permanent
    /// within the enclosing scope and drop the savepoint.
    pub fn release_savepoint(&self, name: &str, outermost: bool) -> Vec<String> {
        let release = format!("RELEASE SAVEPOINT {}", self.quote_identifier(name));
        match self {
            Self::PostgreSQL if outermost => vec![release, "COMMIT".to_string()],
            _ => vec![release],
        }
    }

    /// Statements that discard the work done since savepoint `name` and
    /// drop the savepoint.
    ///
    /// `ROLLBACK TO` keeps the savepoint on the engine's stack, so it is
    /// released afterwards to leave the connection at the enclosing level.
    pub fn rollback_savepoint(&self, name: &str, outermost: bool) -> Vec<String> {
        let ident = self.quote_identifier(name);
        match self {
            Self::PostgreSQL if outermost => vec!["ROLLBACK".to_string()],
            _ => vec![
                format!("ROLLBACK TO SAVEPOINT {}", ident),
                format!("RELEASE SAVEPOINT {}", ident),
            ],
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
