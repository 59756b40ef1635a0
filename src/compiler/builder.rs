//! Portable statement builder.
//!
//! A [`Table`] hands out insert, select, update and delete statements that
//! compile to either dialect. Identifiers are always quoted and values are
//! always bound as parameters.

use super::Compile;
use crate::error::{DbError, DbResult};
use crate::models::{CompiledQuery, Dialect, Params, QueryParam};

/// Comparison operator in a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Op {
    fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }
}

/// A table to build statements against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    name: String,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn insert(&self) -> Insert {
        Insert {
            table: self.name.clone(),
            values: Vec::new(),
        }
    }

    pub fn select(&self) -> Select {
        Select {
            table: self.name.clone(),
            columns: Vec::new(),
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn update(&self) -> Update {
        Update {
            table: self.name.clone(),
            assignments: Vec::new(),
            filters: Vec::new(),
        }
    }

    pub fn delete(&self) -> Delete {
        Delete {
            table: self.name.clone(),
            filters: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Filter {
    column: String,
    op: Op,
    value: QueryParam,
}

/// Collects parameters while statement text is written.
struct Writer {
    dialect: Dialect,
    sql: String,
    params: Vec<QueryParam>,
}

impl Writer {
    fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn ident(&mut self, name: &str) {
        let quoted = self.dialect.quote_identifier(name);
        self.sql.push_str(&quoted);
    }

    fn value(&mut self, value: &QueryParam) {
        self.params.push(value.clone());
        let placeholder = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
    }

    fn filters(&mut self, filters: &[Filter]) {
        for (i, filter) in filters.iter().enumerate() {
            self.push(if i == 0 { " WHERE " } else { " AND " });
            self.ident(&filter.column);
            if filter.value.is_null() && matches!(filter.op, Op::Eq | Op::Ne) {
                self.push(if filter.op == Op::Eq {
                    " IS NULL"
                } else {
                    " IS NOT NULL"
                });
                continue;
            }
            self.push(" ");
            self.push(filter.op.as_sql());
            self.push(" ");
            self.value(&filter.value);
        }
    }

    fn finish(self) -> CompiledQuery {
        CompiledQuery {
            sql: self.sql,
            params: Params::from(self.params),
        }
    }
}

/// `INSERT INTO table (...) VALUES (...)`
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    table: String,
    values: Vec<(String, QueryParam)>,
}

impl Insert {
    pub fn value(mut self, column: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        self.values.push((column.into(), value.into()));
        self
    }
}

impl Compile for Insert {
    fn compile(&self, dialect: Dialect) -> DbResult<CompiledQuery> {
        if self.values.is_empty() {
            return Err(DbError::invalid_input(format!(
                "Insert into {} has no values",
                self.table
            )));
        }

        let mut w = Writer::new(dialect);
        w.push("INSERT INTO ");
        w.ident(&self.table);
        w.push(" (");
        for (i, (column, _)) in self.values.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.ident(column);
        }
        w.push(") VALUES (");
        for (i, (_, value)) in self.values.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.value(value);
        }
        w.push(")");
        Ok(w.finish())
    }
}

/// `SELECT ... FROM table [WHERE ...] [ORDER BY ...] [LIMIT n]`
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    table: String,
    columns: Vec<String>,
    filters: Vec<Filter>,
    order_by: Vec<(String, bool)>,
    limit: Option<u64>,
}

impl Select {
    /// Restrict the selected columns. Without this every column is returned.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn filter(mut self, column: impl Into<String>, op: Op, value: impl Into<QueryParam>) -> Self {
        self.filters.push(Filter {
            column: column.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.order_by.push((column.into(), false));
        self
    }

    pub fn order_by_desc(mut self, column: impl Into<String>) -> Self {
        self.order_by.push((column.into(), true));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl Compile for Select {
    fn compile(&self, dialect: Dialect) -> DbResult<CompiledQuery> {
        let mut w = Writer::new(dialect);
        w.push("SELECT ");
        if self.columns.is_empty() {
            w.push("*");
        } else {
            for (i, column) in self.columns.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                w.ident(column);
            }
        }
        w.push(" FROM ");
        w.ident(&self.table);
        w.filters(&self.filters);

        for (i, (column, desc)) in self.order_by.iter().enumerate() {
            w.push(if i == 0 { " ORDER BY " } else { ", " });
            w.ident(column);
            if *desc {
                w.push(" DESC");
            }
        }
        if let Some(limit) = self.limit {
            w.push(&format!(" LIMIT {}", limit));
        }
        Ok(w.finish())
    }
}

/// `UPDATE table SET ... [WHERE ...]`
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    table: String,
    assignments: Vec<(String, QueryParam)>,
    filters: Vec<Filter>,
}

impl Update {
    pub fn set(mut self, column: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        self.assignments.push((column.into(), value.into()));
        self
    }

    pub fn filter(mut self, column: impl Into<String>, op: Op, value: impl Into<QueryParam>) -> Self {
        self.filters.push(Filter {
            column: column.into(),
            op,
            value: value.into(),
        });
        self
    }
}

impl Compile for Update {
    fn compile(&self, dialect: Dialect) -> DbResult<CompiledQuery> {
        if self.assignments.is_empty() {
            return Err(DbError::invalid_input(format!(
                "Update of {} sets no columns",
                self.table
            )));
        }

        let mut w = Writer::new(dialect);
        w.push("UPDATE ");
        w.ident(&self.table);
        w.push(" SET ");
        for (i, (column, value)) in self.assignments.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.ident(column);
            w.push(" = ");
            w.value(value);
        }
        w.filters(&self.filters);
        Ok(w.finish())
    }
}

/// `DELETE FROM table [WHERE ...]`
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    table: String,
    filters: Vec<Filter>,
}

impl Delete {
    pub fn filter(mut self, column: impl Into<String>, op: Op, value: impl Into<QueryParam>) -> Self {
        self.filters.push(Filter {
            column: column.into(),
            op,
            value: value.into(),
        });
        self
    }
}

impl Compile for Delete {
    fn compile(&self, dialect: Dialect) -> DbResult<CompiledQuery> {
        let mut w = Writer::new(dialect);
        w.push("DELETE FROM ");
        w.ident(&self.table);
        w.filters(&self.filters);
        Ok(w.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_postgres() {
        let movies = Table::new("movies");
        let insert = movies.insert().value("title", "Plastic Man").value("year", 2008);
        let compiled = insert.compile(Dialect::PostgreSQL).unwrap();
        assert_eq!(
            compiled.sql,
            "INSERT INTO \"movies\" (\"title\", \"year\") VALUES ($1, $2)"
        );
        assert_eq!(
            compiled.params,
            Params::Positional(vec![QueryParam::from("Plastic Man"), QueryParam::Int(2008)])
        );
    }

    #[test]
    fn test_insert_without_values() {
        let result = Table::new("movies").insert().compile(Dialect::SQLite);
        assert!(matches!(result, Err(DbError::InvalidInput { .. })));
    }

    #[test]
    fn test_select_with_order_and_limit() {
        let select = Table::new("movies")
            .select()
            .columns(["title"])
            .filter("year", Op::Ge, 1996)
            .filter("title", Op::Ne, "Farwent")
            .order_by_desc("year")
            .limit(10);
        let compiled = select.compile(Dialect::SQLite).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT \"title\" FROM \"movies\" WHERE \"year\" >= ? AND \"title\" <> ? ORDER BY \"year\" DESC LIMIT 10"
        );
        assert_eq!(compiled.params.len(), 2);
    }

    #[test]
    fn test_null_filter() {
        let select = Table::new("movies")
            .select()
            .filter("year", Op::Eq, QueryParam::Null);
        let compiled = select.compile(Dialect::PostgreSQL).unwrap();
        assert_eq!(compiled.sql, "SELECT * FROM \"movies\" WHERE \"year\" IS NULL");
        assert_eq!(compiled.params, Params::None);
    }

    #[test]
    fn test_update_numbering_continues_into_filters() {
        let update = Table::new("movies")
            .update()
            .set("year", 2017)
            .filter("title", Op::Eq, "Blade Sprinter 2049");
        let compiled = update.compile(Dialect::PostgreSQL).unwrap();
        assert_eq!(
            compiled.sql,
            "UPDATE \"movies\" SET \"year\" = $1 WHERE \"title\" = $2"
        );
    }

    #[test]
    fn test_delete() {
        let delete = Table::new("movies").delete().filter("year", Op::Lt, 2000);
        let compiled = delete.compile(Dialect::SQLite).unwrap();
        assert_eq!(compiled.sql, "DELETE FROM \"movies\" WHERE \"year\" < ?");
    }
}
