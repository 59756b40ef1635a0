//! Sessions and nested transactions.
//!
//! A [`Session`] is a logical unit of work on one pooled connection. Opening
//! a session creates a savepoint on that connection; committing releases it
//! and cancelling rolls back to it. [`Session::transaction`] hands out a
//! nested session on the same connection, so nesting is the same savepoint
//! protocol applied recursively.
//!
//! The connection and its savepoint stack live in a shared link owned
//! jointly by a root session and every session nested under it. The stack
//! is strict LIFO: only the innermost savepoint may be committed or
//! cancelled.

use crate::compiler::Query;
use crate::db::pool::{DbConnection, DbPool};
use crate::error::{DbError, DbResult};
use crate::models::{Dialect, Row};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Prefix of generated savepoint identifiers.
pub const SAVEPOINT_PREFIX: &str = "sp_";

pub(crate) fn savepoint_name() -> String {
    format!("{}{}", SAVEPOINT_PREFIX, Uuid::new_v4().simple())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Release,
    Rollback,
}

/// Connection state shared by a root session and its nested sessions.
#[derive(Debug)]
struct LinkState {
    conn: Option<DbConnection>,
    /// Open savepoints, outermost first.
    savepoints: Vec<String>,
    /// Savepoints below this index belong to the connection itself rather
    /// than to a session.
    base: usize,
}

impl LinkState {
    fn depth(&self) -> usize {
        self.savepoints.len().saturating_sub(self.base)
    }

    fn conn(&mut self) -> DbResult<&mut DbConnection> {
        self.conn.as_mut().ok_or(DbError::SessionNotOpen)
    }

    async fn run(&mut self, statements: &[String]) -> DbResult<()> {
        let conn = self.conn()?;
        for sql in statements {
            conn.execute_raw(sql).await?;
        }
        Ok(())
    }

    async fn create(&mut self, name: &str) -> DbResult<()> {
        let outermost = self.savepoints.is_empty();
        let dialect = self.conn()?.dialect();
        self.run(&dialect.create_savepoint(name, outermost)).await?;
        self.savepoints.push(name.to_string());
        debug!(savepoint = %name, depth = self.savepoints.len(), "Created savepoint");
        Ok(())
    }

    /// Release or roll back `name`, which must be the innermost savepoint.
    /// A savepoint that is no longer on the stack has already been resolved.
    async fn resolve(&mut self, name: &str, resolution: Resolution) -> DbResult<()> {
        let Some(position) = self.savepoints.iter().position(|s| s == name) else {
            debug!(savepoint = %name, "Savepoint already resolved");
            return Ok(());
        };
        if position + 1 != self.savepoints.len() {
            return Err(DbError::savepoint_order(name));
        }

        let outermost = position == 0;
        let dialect = self.conn()?.dialect();
        let statements = match resolution {
            Resolution::Release => dialect.release_savepoint(name, outermost),
            Resolution::Rollback => dialect.rollback_savepoint(name, outermost),
        };
        self.run(&statements).await?;
        self.savepoints.pop();

        debug!(
            savepoint = %name,
            resolution = ?resolution,
            depth = self.savepoints.len(),
            "Resolved savepoint"
        );
        Ok(())
    }

    /// Roll back to `name` regardless of nesting, discarding every savepoint
    /// opened after it.
    async fn unwind(&mut self, name: &str) -> DbResult<()> {
        let Some(position) = self.savepoints.iter().position(|s| s == name) else {
            return Ok(());
        };
        let dialect = self.conn()?.dialect();
        self.run(&dialect.rollback_savepoint(name, position == 0))
            .await?;
        self.savepoints.truncate(position);
        Ok(())
    }

    /// Give the connection back. A connection with pending savepoints is in
    /// an unknown transaction state and is closed instead.
    fn release(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        self.base = 0;
        if self.savepoints.is_empty() {
            debug!(dialect = %conn.dialect(), "Released connection");
            drop(conn);
        } else {
            warn!(
                pending = self.savepoints.len(),
                "Detaching connection with pending savepoints"
            );
            self.savepoints.clear();
            conn.detach();
        }
    }
}

#[derive(Debug)]
struct ConnectionLink {
    pool: DbPool,
    max_depth: Option<usize>,
    state: Mutex<LinkState>,
}

impl Drop for ConnectionLink {
    fn drop(&mut self) {
        self.state.get_mut().release();
    }
}

#[derive(Debug)]
struct SessionInner {
    is_root: bool,
    force_rollback: bool,
    token: Mutex<Option<String>>,
    link: Arc<ConnectionLink>,
}

/// A logical database session.
///
/// `Session` is a cheap handle: clones refer to the same session and share
/// its open/closed state.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// A root session that checks a connection out of `pool` when opened.
    pub(crate) fn root(pool: DbPool, force_rollback: bool, max_depth: Option<usize>) -> Self {
        Self::with_link(
            true,
            force_rollback,
            ConnectionLink {
                pool,
                max_depth,
                state: Mutex::new(LinkState {
                    conn: None,
                    savepoints: Vec::new(),
                    base: 0,
                }),
            },
        )
    }

    /// The force-rollback root session, bound to a connection pinned for the
    /// lifetime of the backend.
    ///
    /// `anchor` is a savepoint already open on `conn`. Everything done
    /// through the session stays inside it until a forced close rolls it
    /// back.
    pub(crate) fn pinned(
        pool: DbPool,
        conn: DbConnection,
        anchor: String,
        max_depth: Option<usize>,
    ) -> Self {
        Self::with_link(
            true,
            true,
            ConnectionLink {
                pool,
                max_depth,
                state: Mutex::new(LinkState {
                    conn: Some(conn),
                    savepoints: vec![anchor],
                    base: 1,
                }),
            },
        )
    }

    fn with_link(is_root: bool, force_rollback: bool, link: ConnectionLink) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                is_root,
                force_rollback,
                token: Mutex::new(None),
                link: Arc::new(link),
            }),
        }
    }

    /// True if this session owns its connection.
    pub fn is_root(&self) -> bool {
        self.inner.is_root
    }

    pub fn force_rollback(&self) -> bool {
        self.inner.force_rollback
    }

    pub fn dialect(&self) -> Dialect {
        self.inner.link.pool.dialect()
    }

    /// True between `open()` and `close()`.
    pub async fn is_open(&self) -> bool {
        self.inner.token.lock().await.is_some()
    }

    /// Number of sessions open on this session's connection.
    pub async fn depth(&self) -> usize {
        self.inner.link.state.lock().await.depth()
    }

    /// True if both handles refer to the same session.
    pub fn same_session(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// A nested session on this session's connection.
    pub fn transaction(&self) -> Session {
        Self {
            inner: Arc::new(SessionInner {
                is_root: false,
                force_rollback: self.inner.force_rollback,
                token: Mutex::new(None),
                link: Arc::clone(&self.inner.link),
            }),
        }
    }

    /// Open the session by creating a fresh savepoint.
    ///
    /// A root session checks its connection out of the pool first if it
    /// does not hold one.
    pub async fn open(&self) -> DbResult<()> {
        let mut token = self.inner.token.lock().await;
        if token.is_some() {
            return Err(DbError::SessionAlreadyOpen);
        }

        let link = &self.inner.link;
        let mut state = link.state.lock().await;
        if let Some(max_depth) = link.max_depth {
            if state.depth() >= max_depth {
                return Err(DbError::savepoint_depth_exceeded(max_depth));
            }
        }

        let acquired = if state.conn.is_none() {
            if !self.inner.is_root {
                return Err(DbError::SessionNotOpen);
            }
            state.conn = Some(link.pool.acquire().await?);
            true
        } else {
            false
        };

        let name = savepoint_name();
        if let Err(e) = state.create(&name).await {
            if acquired {
                if let Some(conn) = state.conn.take() {
                    conn.detach();
                }
            }
            return Err(e);
        }

        *token = Some(name);
        Ok(())
    }

    /// Make the work done in this session permanent within the enclosing
    /// scope. On a force-rollback root session this rolls back instead.
    pub async fn commit(&self) -> DbResult<()> {
        let token = self.inner.token.lock().await;
        let name = token.as_deref().ok_or(DbError::SessionNotOpen)?;

        let resolution = if self.inner.is_root && self.inner.force_rollback {
            debug!(savepoint = %name, "Force rollback: commit becomes rollback");
            Resolution::Rollback
        } else {
            Resolution::Release
        };

        let mut state = self.inner.link.state.lock().await;
        state.resolve(name, resolution).await
    }

    /// Discard the work done in this session.
    pub async fn cancel(&self) -> DbResult<()> {
        let token = self.inner.token.lock().await;
        let name = token.as_deref().ok_or(DbError::SessionNotOpen)?;

        let mut state = self.inner.link.state.lock().await;
        state.resolve(name, Resolution::Rollback).await
    }

    /// Close the session.
    ///
    /// A savepoint left pending is rolled back. The connection goes back to
    /// the pool for a root session outside force-rollback mode, or whenever
    /// `force` is set. Closing a session that is not open does nothing
    /// unless `force` is set.
    ///
    /// A forced close of a root session rolls back everything its sessions
    /// still have pending on the connection. The pinned force-rollback
    /// connection is never given up here: its anchor stays open until the
    /// backend disconnects.
    pub async fn close(&self, force: bool) -> DbResult<()> {
        self.close_with(force, false).await
    }

    /// Force-close the session and roll back the connection's anchor too.
    /// Used by the backend to tear down the pinned session on disconnect.
    pub(crate) async fn shutdown(&self) -> DbResult<()> {
        self.close_with(true, true).await
    }

    async fn close_with(&self, force: bool, teardown: bool) -> DbResult<()> {
        let mut token = self.inner.token.lock().await;
        let name = token.take();
        if name.is_none() && !force {
            return Ok(());
        }

        let mut state = self.inner.link.state.lock().await;
        let mut result = Ok(());
        if let Some(name) = &name {
            if state.savepoints.contains(name) {
                warn!(savepoint = %name, "Closing session with pending savepoint, rolling back");
                result = state.unwind(name).await;
            }
        }

        if force && self.inner.is_root {
            let floor = if teardown { 0 } else { state.base };
            if let Some(bottom) = state.savepoints.get(floor).cloned() {
                debug!(savepoint = %bottom, "Rolling back connection");
                let unwound = state.unwind(&bottom).await;
                if result.is_ok() {
                    result = unwound;
                }
            }
        }

        if let Err(e) = &result {
            warn!(error = %e, "Rollback on close failed");
        }

        let pinned = state.base > 0 && !teardown;
        if force && pinned {
            debug!("Keeping pinned force-rollback connection");
        } else if force || (self.inner.is_root && !self.inner.force_rollback) {
            state.release();
        }

        debug!(savepoint = ?name, force, "Closed session");
        result
    }

    /// Run `f` inside this session.
    ///
    /// Opens the session, then commits if `f` succeeds or cancels if it
    /// fails, and closes it either way. The error from `f` is returned as-is;
    /// failures while cleaning up after it are logged.
    pub async fn scope<F, Fut, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<DbError>,
    {
        self.open().await?;

        match f(self.clone()).await {
            Ok(value) => {
                if let Err(e) = self.commit().await {
                    self.cleanup_after_error().await;
                    return Err(e.into());
                }
                self.close(false).await?;
                Ok(value)
            }
            Err(err) => {
                self.cleanup_after_error().await;
                Err(err)
            }
        }
    }

    async fn cleanup_after_error(&self) {
        if let Err(e) = self.cancel().await {
            warn!(error = %e, "Failed to roll back session");
        }
        if let Err(e) = self.close(false).await {
            warn!(error = %e, "Failed to close session");
        }
    }

    /// Execute a statement, returning the number of affected rows.
    pub async fn execute<'q>(&self, query: impl Into<Query<'q>>) -> DbResult<u64> {
        let mut state = self.inner.link.state.lock().await;
        let conn = state.conn()?;
        let stmt = query.into().resolve(conn.dialect())?;
        conn.execute(&stmt).await
    }

    /// Fetch the first row of the result, `None` if there is none.
    pub async fn fetch_one<'q>(&self, query: impl Into<Query<'q>>) -> DbResult<Option<Row>> {
        let mut state = self.inner.link.state.lock().await;
        let conn = state.conn()?;
        let stmt = query.into().resolve(conn.dialect())?;
        conn.fetch_optional(&stmt).await
    }

    /// Fetch every row of the result.
    pub async fn fetch_all<'q>(&self, query: impl Into<Query<'q>>) -> DbResult<Vec<Row>> {
        let mut state = self.inner.link.state.lock().await;
        let conn = state.conn()?;
        let stmt = query.into().resolve(conn.dialect())?;
        conn.fetch_all(&stmt).await
    }
}
