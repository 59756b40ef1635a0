//! The `Database` entry point.

use crate::config::DatabaseOptions;
use crate::db::{Backend, Session};
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseUrl, Dialect};
use std::future::Future;
use tracing::warn;

/// A database reachable through one URL.
///
/// ```no_run
/// # async fn demo() -> based::DbResult<()> {
/// use based::{Database, DatabaseOptions};
///
/// let db = Database::new("sqlite:///movies.db", DatabaseOptions::new())?;
/// db.connect().await?;
/// db.transaction(|session| async move {
///     session.execute("INSERT INTO movies (title, year) VALUES ('Plastic Man', 2008)").await
/// })
/// .await?;
/// db.disconnect().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Database {
    backend: Backend,
}

impl Database {
    /// Parse `url` and pick the backend for its scheme.
    ///
    /// Fails with `InvalidUrl` unless the URL has the form `scheme://rest`
    /// and with `UnknownScheme` for schemes other than `sqlite`,
    /// `postgresql` and `postgres`.
    pub fn new(url: &str, options: DatabaseOptions) -> DbResult<Self> {
        let url = DatabaseUrl::parse(url)?;
        Ok(Self {
            backend: Backend::new(url, options)?,
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.backend.dialect()
    }

    pub fn force_rollback(&self) -> bool {
        self.backend.force_rollback()
    }

    /// The connection URL, password masked.
    pub fn url(&self) -> String {
        self.backend.url()
    }

    pub async fn is_connected(&self) -> bool {
        self.backend.is_connected().await
    }

    pub async fn connect(&self) -> DbResult<()> {
        self.backend.connect().await
    }

    pub async fn disconnect(&self) -> DbResult<()> {
        self.backend.disconnect().await
    }

    pub async fn session(&self) -> DbResult<Session> {
        self.backend.session().await
    }

    /// Run `f` in a session that commits if `f` succeeds and rolls back if
    /// it fails. See [`Session::scope`].
    pub async fn transaction<F, Fut, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<DbError>,
    {
        let session = self.session().await?;
        session.scope(f).await
    }

    /// Connect, run `f`, and disconnect whatever `f` returned.
    ///
    /// An error from `f` wins over an error from disconnecting, which is
    /// only logged in that case.
    pub async fn run<'a, F, Fut, T, E>(&'a self, f: F) -> Result<T, E>
    where
        F: FnOnce(&'a Database) -> Fut,
        Fut: Future<Output = Result<T, E>> + 'a,
        E: From<DbError>,
    {
        self.connect().await?;
        let result = f(self).await;

        match self.disconnect().await {
            Ok(()) => result,
            Err(e) => match result {
                Ok(_) => Err(e.into()),
                Err(original) => {
                    warn!(error = %e, "Failed to disconnect after error");
                    Err(original)
                }
            },
        }
    }
}
