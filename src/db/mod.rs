//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Connection pool management
//! - Sessions and savepoint-based nested transactions
//! - Backend lifecycle, including force-rollback mode
//! - Parameter binding and row decoding
//! - Database dispatch macros for reducing code duplication

pub mod backend;
#[macro_use]
pub mod macros;
pub mod params;
pub mod pool;
pub mod session;
pub mod types;

pub use backend::Backend;
pub use pool::{DbConnection, DbPool};
pub use session::{SAVEPOINT_PREFIX, Session};
