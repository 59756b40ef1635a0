//! Query-related data models.
//!
//! This module defines parameter values, parameter lists, compiled statements
//! and result rows.

use serde_json::Value as JsonValue;

/// A result row: column name to value, in the column order reported by the
/// driver.
pub type Row = serde_json::Map<String, JsonValue>;

/// A parameter value for parameterized queries.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// JSON document
    Json(JsonValue),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for QueryParam {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for QueryParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for QueryParam {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<JsonValue> for QueryParam {
    fn from(v: JsonValue) -> Self {
        Self::Json(v)
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Parameters accompanying statement text.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Params {
    #[default]
    None,
    /// Bound in order to the dialect's positional placeholders.
    Positional(Vec<QueryParam>),
    /// Bound by `:name` references in the statement text.
    Named(Vec<(String, QueryParam)>),
}

impl Params {
    /// Build a named parameter list.
    pub fn named<K, V, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<QueryParam>,
    {
        Self::Named(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Positional(values) => values.len(),
            Self::Named(pairs) => pairs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<QueryParam>> for Params {
    fn from(values: Vec<QueryParam>) -> Self {
        if values.is_empty() {
            Self::None
        } else {
            Self::Positional(values)
        }
    }
}

/// Statement text plus its parameters, ready for one dialect.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Params,
}

impl CompiledQuery {
    /// A statement without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Params::None,
        }
    }

    /// Add a positional parameter.
    ///
    /// Switching from named to positional parameters drops the named ones.
    pub fn bind(mut self, param: impl Into<QueryParam>) -> Self {
        match &mut self.params {
            Params::Positional(values) => values.push(param.into()),
            _ => self.params = Params::Positional(vec![param.into()]),
        }
        self
    }

    /// Add a named parameter referenced as `:name` in the text.
    ///
    /// Switching from positional to named parameters drops the positional ones.
    pub fn bind_named(mut self, name: impl Into<String>, param: impl Into<QueryParam>) -> Self {
        match &mut self.params {
            Params::Named(pairs) => pairs.push((name.into(), param.into())),
            _ => self.params = Params::Named(vec![(name.into(), param.into())]),
        }
        self
    }

    pub fn with_params(mut self, params: impl Into<Params>) -> Self {
        self.params = params.into();
        self
    }
}

impl From<&str> for CompiledQuery {
    fn from(sql: &str) -> Self {
        Self::new(sql)
    }
}

impl From<String> for CompiledQuery {
    fn from(sql: String) -> Self {
        Self::new(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param_types() {
        assert!(QueryParam::Null.is_null());
        assert!(!QueryParam::Bool(true).is_null());
        assert_eq!(QueryParam::from("hello"), QueryParam::String("hello".into()));
        assert_eq!(QueryParam::from(b"hi".to_vec()), QueryParam::Bytes(b"hi".to_vec()));
        assert_eq!(QueryParam::from(None::<i64>), QueryParam::Null);
        assert_eq!(QueryParam::from(Some(2008)), QueryParam::Int(2008));
    }

    #[test]
    fn test_compiled_query_binding() {
        let query = CompiledQuery::new("SELECT * FROM movies WHERE year > ? AND title = ?")
            .bind(2000)
            .bind("Farwent");
        assert_eq!(
            query.params,
            Params::Positional(vec![QueryParam::Int(2000), QueryParam::from("Farwent")])
        );

        let query = CompiledQuery::new("SELECT * FROM movies WHERE title = :title")
            .bind_named("title", "Farwent");
        assert_eq!(query.params.len(), 1);
        assert!(matches!(query.params, Params::Named(_)));
    }

    #[test]
    fn test_params_from_empty_vec() {
        assert_eq!(Params::from(Vec::new()), Params::None);
        assert!(Params::None.is_empty());
    }
}
