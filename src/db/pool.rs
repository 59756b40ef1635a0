//! Connection pool management.
//!
//! This module wraps the backend-specific sqlx pools (`PgPool`,
//! `SqlitePool`) in closed enums so that the rest of the crate can open a
//! pool, check out a connection and run statements on it without caring
//! which engine is behind the URL.

use crate::compiler::Statement;
use crate::config::PoolOptions;
use crate::db::params::{bind_postgres_param, bind_sqlite_param};
use crate::db::types::RowToJson;
use crate::error::DbResult;
use crate::impl_db_dispatch;
use crate::models::{DatabaseUrl, Dialect, Row};
use sqlx::pool::PoolConnection;
use sqlx::{
    Executor, PgPool, Postgres, Sqlite, SqlitePool, postgres::PgConnectOptions,
    postgres::PgPoolOptions, sqlite::SqliteConnectOptions, sqlite::SqlitePoolOptions,
};
use std::str::FromStr;
use tracing::{debug, info};

/// Backend-specific connection pool (avoids AnyPool limitations).
#[derive(Debug, Clone)]
pub enum DbPool {
    Postgres(PgPool),
    SQLite(SqlitePool),
}

impl DbPool {
    /// Open a pool for `url`.
    ///
    /// `url` must already have its pool options extracted; the remaining
    /// query parameters are handed to the driver.
    pub async fn connect(url: &DatabaseUrl, options: &PoolOptions) -> DbResult<Self> {
        let is_sqlite = url.dialect() == Dialect::SQLite;
        let min_connections = options.min_connections_or_default(is_sqlite);
        let max_connections = options.max_connections_or_default(is_sqlite);
        let acquire_timeout = options.acquire_timeout_or_default();
        let test_before_acquire = options.test_before_acquire_or_default();

        info!(
            url = %url,
            dialect = %url.dialect(),
            max_connections,
            "Opening connection pool"
        );

        match url.dialect() {
            Dialect::PostgreSQL => {
                let connect_options = PgConnectOptions::from_str(&url.as_connection_string())?;
                let pool = PgPoolOptions::new()
                    .min_connections(min_connections)
                    .max_connections(max_connections)
                    .acquire_timeout(acquire_timeout)
                    .idle_timeout(Some(options.idle_timeout_or_default()))
                    .test_before_acquire(test_before_acquire)
                    .connect_with(connect_options)
                    .await?;
                Ok(DbPool::Postgres(pool))
            }
            Dialect::SQLite => {
                let connect_options =
                    SqliteConnectOptions::from_str(&format!("sqlite://{}", url.sqlite_path()))?
                        .create_if_missing(true);

                let mut pool_options = SqlitePoolOptions::new()
                    .min_connections(min_connections)
                    .max_connections(max_connections)
                    .acquire_timeout(acquire_timeout)
                    .idle_timeout(Some(options.idle_timeout_or_default()))
                    .test_before_acquire(test_before_acquire);

                // An in-memory database lives as long as its last connection
                if url.is_memory() {
                    pool_options = pool_options.idle_timeout(None).max_lifetime(None);
                }

                let pool = pool_options.connect_with(connect_options).await?;
                Ok(DbPool::SQLite(pool))
            }
        }
    }

    /// Check a connection out of the pool.
    pub async fn acquire(&self) -> DbResult<DbConnection> {
        let conn = impl_db_dispatch!(DbPool, self, {
            Postgres(pool) => DbConnection::Postgres(pool.acquire().await?),
            SQLite(pool) => DbConnection::SQLite(pool.acquire().await?),
        });
        debug!(dialect = %self.dialect(), "Acquired connection");
        Ok(conn)
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        impl_db_dispatch!(DbPool, self, {
            Postgres(pool) => pool.close().await,
            SQLite(pool) => pool.close().await,
        })
    }

    /// Get the dialect spoken by this pool's connections.
    pub fn dialect(&self) -> Dialect {
        match self {
            DbPool::Postgres(_) => Dialect::PostgreSQL,
            DbPool::SQLite(_) => Dialect::SQLite,
        }
    }
}

/// A connection checked out of a [`DbPool`].
///
/// Dropping it returns the connection to its pool; [`DbConnection::detach`]
/// closes it instead.
#[derive(Debug)]
pub enum DbConnection {
    Postgres(PoolConnection<Postgres>),
    SQLite(PoolConnection<Sqlite>),
}

impl DbConnection {
    pub fn dialect(&self) -> Dialect {
        match self {
            DbConnection::Postgres(_) => Dialect::PostgreSQL,
            DbConnection::SQLite(_) => Dialect::SQLite,
        }
    }

    /// Run a statement without parameters through the simple query path.
    ///
    /// Used for transaction control, which some drivers refuse to prepare.
    pub async fn execute_raw(&mut self, sql: &str) -> DbResult<()> {
        debug!(sql = %sql, "Executing raw statement");
        impl_db_dispatch!(DbConnection, self, {
            Postgres(conn) => (&mut **conn).execute(sql).await.map(|_| ())?,
            SQLite(conn) => (&mut **conn).execute(sql).await.map(|_| ())?,
        });
        Ok(())
    }

    /// Execute a statement and return the number of affected rows.
    pub async fn execute(&mut self, stmt: &Statement) -> DbResult<u64> {
        debug!(sql = %stmt.sql, params = stmt.params.len(), "Executing statement");

        // When params is empty, execute raw SQL directly to avoid prepared statement issues
        let result = match self {
            DbConnection::Postgres(conn) => {
                if stmt.params.is_empty() {
                    (&mut **conn).execute(stmt.sql.as_str()).await?.rows_affected()
                } else {
                    let mut query = sqlx::query(&stmt.sql);
                    for param in &stmt.params {
                        query = bind_postgres_param(query, param);
                    }
                    query.execute(&mut **conn).await?.rows_affected()
                }
            }
            DbConnection::SQLite(conn) => {
                if stmt.params.is_empty() {
                    (&mut **conn).execute(stmt.sql.as_str()).await?.rows_affected()
                } else {
                    let mut query = sqlx::query(&stmt.sql);
                    for param in &stmt.params {
                        query = bind_sqlite_param(query, param);
                    }
                    query.execute(&mut **conn).await?.rows_affected()
                }
            }
        };
        Ok(result)
    }

    /// Fetch the first row of a statement's result, if any.
    pub async fn fetch_optional(&mut self, stmt: &Statement) -> DbResult<Option<Row>> {
        debug!(sql = %stmt.sql, params = stmt.params.len(), "Fetching one row");

        let row = match self {
            DbConnection::Postgres(conn) => {
                let row = if stmt.params.is_empty() {
                    (&mut **conn).fetch_optional(stmt.sql.as_str()).await?
                } else {
                    let mut query = sqlx::query(&stmt.sql);
                    for param in &stmt.params {
                        query = bind_postgres_param(query, param);
                    }
                    query.fetch_optional(&mut **conn).await?
                };
                row.map(|r| r.to_json_map())
            }
            DbConnection::SQLite(conn) => {
                let row = if stmt.params.is_empty() {
                    (&mut **conn).fetch_optional(stmt.sql.as_str()).await?
                } else {
                    let mut query = sqlx::query(&stmt.sql);
                    for param in &stmt.params {
                        query = bind_sqlite_param(query, param);
                    }
                    query.fetch_optional(&mut **conn).await?
                };
                row.map(|r| r.to_json_map())
            }
        };
        Ok(row)
    }

    /// Fetch every row of a statement's result.
    pub async fn fetch_all(&mut self, stmt: &Statement) -> DbResult<Vec<Row>> {
        debug!(sql = %stmt.sql, params = stmt.params.len(), "Fetching all rows");

        let rows = match self {
            DbConnection::Postgres(conn) => {
                let rows = if stmt.params.is_empty() {
                    (&mut **conn).fetch_all(stmt.sql.as_str()).await?
                } else {
                    let mut query = sqlx::query(&stmt.sql);
                    for param in &stmt.params {
                        query = bind_postgres_param(query, param);
                    }
                    query.fetch_all(&mut **conn).await?
                };
                rows.iter().map(|r| r.to_json_map()).collect()
            }
            DbConnection::SQLite(conn) => {
                let rows = if stmt.params.is_empty() {
                    (&mut **conn).fetch_all(stmt.sql.as_str()).await?
                } else {
                    let mut query = sqlx::query(&stmt.sql);
                    for param in &stmt.params {
                        query = bind_sqlite_param(query, param);
                    }
                    query.fetch_all(&mut **conn).await?
                };
                rows.iter().map(|r| r.to_json_map()).collect()
            }
        };
        Ok(rows)
    }

    /// Take the connection out of the pool's accounting and close it.
    ///
    /// Used when the connection is left in an unknown transaction state and
    /// must not be handed to another caller.
    pub fn detach(self) {
        impl_db_dispatch!(DbConnection, self, {
            Postgres(conn) => drop(conn.detach()),
            SQLite(conn) => drop(conn.detach()),
        })
    }
}
