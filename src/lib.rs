//! based library
//!
//! An async session and transaction layer over SQLite and PostgreSQL.
//! Sessions nest through savepoints, and a force-rollback mode pins one
//! connection whose work is rolled back on disconnect, leaving no trace in
//! the database.

pub mod compiler;
pub mod config;
pub mod database;
pub mod db;
pub mod error;
pub mod models;

pub use compiler::{Compile, Query};
pub use config::{Config, DatabaseOptions, PoolOptions};
pub use database::Database;
pub use db::Session;
pub use error::{DbError, DbResult};
pub use models::{CompiledQuery, Dialect, Params, QueryParam, Row};
