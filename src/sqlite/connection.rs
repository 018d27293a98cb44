use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;

use super::params::Params;
use super::query::{exec_text, query_text};
use crate::connection::{Connection, PreparedStatement, Queryer, TxHandle};
use crate::error::TransactorError;
use crate::results::Cursor;
use crate::types::{ExecResult, TxOptions, Value};

pub(crate) type SharedSqliteConnection = Arc<Mutex<rusqlite::Connection>>;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A single `SQLite` connection shared by every caller.
///
/// `rusqlite` calls run on the blocking pool. An open transaction owns the connection until it
/// finishes: statements issued outside it wait their turn, so a transaction callback must not
/// use a commander obtained outside the transaction.
#[derive(Clone)]
pub struct SqliteConnection {
    conn: SharedSqliteConnection,
    gate: Arc<Mutex<()>>,
}

impl SqliteConnection {
    /// Open (or create) the database file at `path`.
    ///
    /// # Errors
    /// Returns `TransactorError::SqliteError` if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TransactorError> {
        let conn = rusqlite::Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self::from_connection(conn))
    }

    /// # Errors
    /// Returns `TransactorError::SqliteError` if `SQLite` cannot allocate the database.
    pub fn open_in_memory() -> Result<Self, TransactorError> {
        Ok(Self::from_connection(rusqlite::Connection::open_in_memory()?))
    }

    #[must_use]
    pub fn from_connection(conn: rusqlite::Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            gate: Arc::new(Mutex::new(())),
        }
    }
}

/// Run `func` against the connection on the blocking pool.
pub(crate) async fn run_blocking<F, R>(
    conn: SharedSqliteConnection,
    func: F,
) -> Result<R, TransactorError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, TransactorError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard)
    })
    .await
    .map_err(|e| TransactorError::ConnectionError(format!("sqlite worker join error: {e}")))?
}

fn begin_transaction(
    conn: &mut rusqlite::Connection,
    read_only: bool,
) -> Result<(), TransactorError> {
    if !conn.is_autocommit() {
        // left open by a begin or commit whose caller stopped waiting
        warn!("rolling back stale sqlite transaction");
        end_transaction(conn, "ROLLBACK", true)?;
    }
    if read_only {
        conn.execute_batch("PRAGMA query_only = ON")?;
        let begun = conn.execute_batch("BEGIN DEFERRED");
        if begun.is_err() {
            conn.execute_batch("PRAGMA query_only = OFF")?;
        }
        begun?;
    } else {
        conn.execute_batch("BEGIN IMMEDIATE")?;
    }
    Ok(())
}

fn end_transaction(
    conn: &mut rusqlite::Connection,
    statement: &str,
    read_only: bool,
) -> Result<(), TransactorError> {
    let ended = conn.execute_batch(statement);
    if read_only {
        conn.execute_batch("PRAGMA query_only = OFF")?;
    }
    ended?;
    Ok(())
}

async fn query_on(
    conn: &SharedSqliteConnection,
    text: &str,
    params: &[Value],
) -> Result<Box<dyn Cursor>, TransactorError> {
    let text = text.to_string();
    let params = Params::convert(params);
    run_blocking(Arc::clone(conn), move |conn| query_text(conn, &text, &params)).await
}

async fn exec_on(
    conn: &SharedSqliteConnection,
    text: &str,
    params: &[Value],
) -> Result<ExecResult, TransactorError> {
    let text = text.to_string();
    let params = Params::convert(params);
    run_blocking(Arc::clone(conn), move |conn| exec_text(conn, &text, &params)).await
}

#[async_trait]
impl Queryer for SqliteConnection {
    async fn query(
        &self,
        text: &str,
        params: &[Value],
    ) -> Result<Box<dyn Cursor>, TransactorError> {
        let _gate = self.gate.lock().await;
        query_on(&self.conn, text, params).await
    }

    async fn exec(&self, text: &str, params: &[Value]) -> Result<ExecResult, TransactorError> {
        let _gate = self.gate.lock().await;
        exec_on(&self.conn, text, params).await
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    async fn begin(&self, options: &TxOptions) -> Result<Box<dyn TxHandle>, TransactorError> {
        let gate = Arc::clone(&self.gate).lock_owned().await;
        let read_only = options.read_only;
        let owner = Arc::clone(&self.conn);
        // The handle is built on the blocking thread. If the caller stops waiting, the
        // finished task drops it and its Drop rolls the BEGIN back before releasing the gate.
        let tx = run_blocking(Arc::clone(&self.conn), move |conn| {
            begin_transaction(conn, read_only)?;
            Ok(SqliteTx {
                conn: owner,
                gate: Some(gate),
                read_only,
            })
        })
        .await?;
        Ok(Box::new(tx))
    }
}

/// An open `SQLite` transaction.
///
/// `SQLite` transactions are always serializable; the isolation level in [`TxOptions`] is
/// ignored. Read-only transactions set `PRAGMA query_only` until they finish. Dropping an
/// unfinished transaction rolls it back before the connection is released.
pub struct SqliteTx {
    conn: SharedSqliteConnection,
    gate: Option<OwnedMutexGuard<()>>,
    read_only: bool,
}

impl SqliteTx {
    fn ensure_open(&self) -> Result<(), TransactorError> {
        if self.gate.is_some() {
            Ok(())
        } else {
            Err(TransactorError::TransactionClosed)
        }
    }

    async fn finish(mut self: Box<Self>, statement: &'static str) -> Result<(), TransactorError> {
        let gate = self.gate.take().ok_or(TransactorError::TransactionClosed)?;
        let read_only = self.read_only;
        let result = run_blocking(Arc::clone(&self.conn), move |conn| {
            end_transaction(conn, statement, read_only)
        })
        .await;
        drop(gate);
        result
    }
}

#[async_trait]
impl Queryer for SqliteTx {
    async fn query(
        &self,
        text: &str,
        params: &[Value],
    ) -> Result<Box<dyn Cursor>, TransactorError> {
        self.ensure_open()?;
        query_on(&self.conn, text, params).await
    }

    async fn exec(&self, text: &str, params: &[Value]) -> Result<ExecResult, TransactorError> {
        self.ensure_open()?;
        exec_on(&self.conn, text, params).await
    }
}

#[async_trait]
impl TxHandle for SqliteTx {
    async fn commit(self: Box<Self>) -> Result<(), TransactorError> {
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> Result<(), TransactorError> {
        self.finish("ROLLBACK").await
    }

    async fn prepare<'a>(
        &'a self,
        text: &str,
    ) -> Result<Box<dyn PreparedStatement + 'a>, TransactorError> {
        self.ensure_open()?;
        let text = text.to_string();
        let check = text.clone();
        run_blocking(Arc::clone(&self.conn), move |conn| {
            conn.prepare_cached(&check)?;
            Ok(())
        })
        .await?;
        Ok(Box::new(SqlitePrepared { tx: self, text }))
    }
}

impl Drop for SqliteTx {
    fn drop(&mut self) {
        let Some(gate) = self.gate.take() else {
            return;
        };
        let conn = Arc::clone(&self.conn);
        let read_only = self.read_only;
        if let Ok(handle) = Handle::try_current() {
            // hold the gate until the rollback lands
            handle.spawn(async move {
                let rolled_back = run_blocking(conn, move |conn| {
                    end_transaction(conn, "ROLLBACK", read_only)
                })
                .await;
                if let Err(err) = rolled_back {
                    warn!(error = %err, "rollback of abandoned transaction failed");
                }
                drop(gate);
            });
        } else {
            let mut guard = conn.blocking_lock();
            if let Err(err) = end_transaction(&mut guard, "ROLLBACK", read_only) {
                warn!(error = %err, "rollback of abandoned transaction failed");
            }
            drop(gate);
        }
    }
}

/// A statement prepared inside a [`SqliteTx`], kept in the connection's statement cache.
pub struct SqlitePrepared<'a> {
    tx: &'a SqliteTx,
    text: String,
}

#[async_trait]
impl PreparedStatement for SqlitePrepared<'_> {
    async fn exec(&self, params: &[Value]) -> Result<ExecResult, TransactorError> {
        self.tx.ensure_open()?;
        exec_on(&self.tx.conn, &self.text, params).await
    }

    async fn query(&self, params: &[Value]) -> Result<Box<dyn Cursor>, TransactorError> {
        self.tx.ensure_open()?;
        query_on(&self.tx.conn, &self.text, params).await
    }
}
