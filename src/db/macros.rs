//! Backend dispatch macros for reducing code duplication.
//!
//! Pools and checked-out connections are closed enums with one variant per
//! backend. These macros generate the match arms so that code dispatching
//! over them stays linear and readable.

/// Dispatch over the variants of a `db::pool` enum ([`DbPool`] or
/// [`DbConnection`]).
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(DbPool, self, {
///     Postgres(p) => p.close().await,
///     SQLite(p) => p.close().await,
/// });
/// ```
///
/// [`DbPool`]: crate::db::pool::DbPool
/// [`DbConnection`]: crate::db::pool::DbConnection
#[macro_export]
macro_rules! impl_db_dispatch {
    ($kind:ident, $value:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $value {
            $(
                $crate::db::pool::$kind::$variant($p) => $body,
            )+
        }
    };
}

pub use impl_db_dispatch;
