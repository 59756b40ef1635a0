//! Data models for based.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod dialect;
pub mod query;

// Re-export commonly used types
pub use connection::{DatabaseUrl, SCHEME_SEPARATOR, SCHEMES, SQLITE_MEMORY};
pub use dialect::{BindStyle, Dialect};
pub use query::{CompiledQuery, Params, QueryParam, Row};
