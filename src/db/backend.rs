//! Backend connection lifecycle.
//!
//! A [`Backend`] owns the connection pool for one database URL and hands out
//! sessions. Its lifecycle is strict: `Disconnected -> Connected -> Closed`.
//! A closed backend cannot be connected again because sqlx pools cannot be
//! reopened once closed.
//!
//! In force-rollback mode one connection is pinned at connect time and an
//! anchor savepoint is opened on it. Every `session()` call returns the same
//! root session bound to that connection, so writes made through it are
//! visible to later callers, and `disconnect()` rolls the anchor back so
//! none of them outlive the backend.

use crate::config::{DatabaseOptions, extract_pool_options};
use crate::db::pool::{DbConnection, DbPool};
use crate::db::session::{Session, savepoint_name};
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseUrl, Dialect};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug)]
enum ForceRollback {
    /// Pinned at connect, not yet handed out.
    Pending { conn: DbConnection, anchor: String },
    Session(Session),
}

#[derive(Debug)]
struct Connected {
    pool: DbPool,
    force_rollback: Option<ForceRollback>,
}

#[derive(Debug)]
enum Lifecycle {
    Disconnected,
    Connected(Connected),
    Closed,
}

impl Lifecycle {
    fn connect_error(&self) -> Option<DbError> {
        match self {
            Lifecycle::Disconnected => None,
            Lifecycle::Connected(_) => Some(DbError::AlreadyConnected),
            Lifecycle::Closed => Some(DbError::ReopenProhibited),
        }
    }
}

#[derive(Debug)]
pub struct Backend {
    url: DatabaseUrl,
    options: DatabaseOptions,
    state: Mutex<Lifecycle>,
}

impl Backend {
    /// Create a disconnected backend.
    ///
    /// Pool options found in the URL's query string are taken out of the URL
    /// and take precedence over `options.pool`.
    pub fn new(url: DatabaseUrl, mut options: DatabaseOptions) -> DbResult<Self> {
        let (url, url_pool) = extract_pool_options(&url)?;
        options.pool = options.pool.merge(&url_pool);
        options.validate()?;

        Ok(Self {
            url,
            options,
            state: Mutex::new(Lifecycle::Disconnected),
        })
    }

    /// Connection URL with the password masked.
    pub fn url(&self) -> String {
        self.url.masked()
    }

    pub fn dialect(&self) -> Dialect {
        self.url.dialect()
    }

    pub fn force_rollback(&self) -> bool {
        self.options.force_rollback
    }

    pub fn options(&self) -> &DatabaseOptions {
        &self.options
    }

    pub async fn is_connected(&self) -> bool {
        matches!(*self.state.lock().await, Lifecycle::Connected(_))
    }

    /// Open the pool, and in force-rollback mode pin one connection.
    pub async fn connect(&self) -> DbResult<()> {
        // Early check for existing connection
        if let Some(e) = self.state.lock().await.connect_error() {
            return Err(e);
        }

        info!(
            url = %self.url,
            force_rollback = self.options.force_rollback,
            "Connecting to database"
        );

        let pool = DbPool::connect(&self.url, &self.options.pool).await?;
        let force_rollback = if self.options.force_rollback {
            match pin_connection(&pool).await {
                Ok(pending) => {
                    info!(url = %self.url, "Pinned force-rollback connection");
                    Some(pending)
                }
                Err(e) => {
                    pool.close().await;
                    return Err(e);
                }
            }
        } else {
            None
        };

        // Re-check after async work to prevent TOCTOU race
        // If another connect won, hand our pool back so we can close it outside the lock
        let lost = {
            let mut state = self.state.lock().await;
            match state.connect_error() {
                Some(e) => Some((e, pool, force_rollback)),
                None => {
                    *state = Lifecycle::Connected(Connected {
                        pool,
                        force_rollback,
                    });
                    None
                }
            }
        }; // Lock released here

        if let Some((e, pool, force_rollback)) = lost {
            if let Some(ForceRollback::Pending { conn, .. }) = force_rollback {
                conn.detach();
            }
            pool.close().await;
            return Err(e);
        }

        info!(url = %self.url, "Connected successfully");
        Ok(())
    }

    /// Roll back the force-rollback session if there is one, then close the
    /// pool. The backend cannot be connected again afterwards.
    pub async fn disconnect(&self) -> DbResult<()> {
        let connected = {
            let mut state = self.state.lock().await;
            match std::mem::replace(&mut *state, Lifecycle::Closed) {
                Lifecycle::Connected(connected) => connected,
                other => {
                    *state = other;
                    return Err(DbError::NotConnected);
                }
            }
        };

        let Connected {
            pool,
            force_rollback,
        } = connected;

        let max_depth = self.options.max_savepoint_depth;
        let session = match force_rollback {
            Some(ForceRollback::Session(session)) => Some(session),
            Some(ForceRollback::Pending { conn, anchor }) => {
                Some(Session::pinned(pool.clone(), conn, anchor, max_depth))
            }
            None => None,
        };

        // The pinned session must be rolled back before its pool goes away
        let mut result = Ok(());
        if let Some(session) = session {
            if session.is_open().await {
                if let Err(e) = session.cancel().await {
                    warn!(error = %e, "Failed to cancel force-rollback session");
                }
            }
            result = session.shutdown().await;
            debug!("Force-rollback session closed");
        }

        pool.close().await;
        info!(url = %self.url, "Disconnected");
        result
    }

    /// Get a session.
    ///
    /// In force-rollback mode this is always the same pinned session;
    /// otherwise every call returns a new root session.
    pub async fn session(&self) -> DbResult<Session> {
        let mut state = self.state.lock().await;
        let Lifecycle::Connected(connected) = &mut *state else {
            return Err(DbError::NotConnected);
        };

        let max_depth = self.options.max_savepoint_depth;
        let slot = &mut connected.force_rollback;

        if let Some(ForceRollback::Pending { .. }) = slot {
            if let Some(ForceRollback::Pending { conn, anchor }) = slot.take() {
                debug!("Creating force-rollback session on pinned connection");
                *slot = Some(ForceRollback::Session(Session::pinned(
                    connected.pool.clone(),
                    conn,
                    anchor,
                    max_depth,
                )));
            }
        }

        match slot {
            Some(ForceRollback::Session(session)) => Ok(session.clone()),
            _ => Ok(Session::root(
                connected.pool.clone(),
                self.options.force_rollback,
                max_depth,
            )),
        }
    }
}

/// Check a connection out and open the anchor savepoint that every
/// force-rollback write lands in.
async fn pin_connection(pool: &DbPool) -> DbResult<ForceRollback> {
    let mut conn = pool.acquire().await?;
    let anchor = savepoint_name();
    for sql in conn.dialect().create_savepoint(&anchor, true) {
        if let Err(e) = conn.execute_raw(&sql).await {
            conn.detach();
            return Err(e);
        }
    }
    debug!(savepoint = %anchor, "Opened force-rollback anchor");
    Ok(ForceRollback::Pending { conn, anchor })
}
