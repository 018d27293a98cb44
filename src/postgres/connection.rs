use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};
use tokio::runtime::Handle;
use tracing::warn;

use super::params::as_refs;
use super::query::{query_statement, query_text};
use crate::connection::{Connection, PreparedStatement, Queryer, TxHandle};
use crate::error::TransactorError;
use crate::results::Cursor;
use crate::types::{ExecResult, TxOptions, Value};

/// A pooled PostgreSQL connection source.
///
/// Each statement outside a transaction checks a client out of the pool for its own duration;
/// a transaction holds one client from `BEGIN` until it finishes.
#[derive(Clone)]
pub struct PostgresConnection {
    pool: Pool,
}

impl PostgresConnection {
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

/// The `BEGIN` statement matching `options`.
///
/// ```rust
/// use sql_transactor::postgres::begin_statement;
/// use sql_transactor::{IsolationLevel, TxOptions};
///
/// assert_eq!(
///     begin_statement(&TxOptions::default()),
///     "BEGIN ISOLATION LEVEL SERIALIZABLE READ WRITE"
/// );
/// assert_eq!(
///     begin_statement(&TxOptions::read_only().with_isolation(IsolationLevel::Default)),
///     "BEGIN READ ONLY"
/// );
/// ```
#[must_use]
pub fn begin_statement(options: &TxOptions) -> String {
    let mut sql = String::from("BEGIN");
    if let Some(level) = options.isolation.as_sql() {
        sql.push_str(" ISOLATION LEVEL ");
        sql.push_str(level);
    }
    sql.push_str(if options.read_only {
        " READ ONLY"
    } else {
        " READ WRITE"
    });
    sql
}

async fn exec_on(
    client: &Object,
    text: &str,
    params: &[Value],
) -> Result<ExecResult, TransactorError> {
    let rows_affected = client.execute(text, &as_refs(params)).await?;
    Ok(ExecResult {
        rows_affected,
        last_insert_id: None,
    })
}

#[async_trait]
impl Queryer for PostgresConnection {
    async fn query(
        &self,
        text: &str,
        params: &[Value],
    ) -> Result<Box<dyn Cursor>, TransactorError> {
        let client = self.pool.get().await?;
        query_text(&client, text, params).await
    }

    async fn exec(&self, text: &str, params: &[Value]) -> Result<ExecResult, TransactorError> {
        let client = self.pool.get().await?;
        exec_on(&client, text, params).await
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    async fn begin(&self, options: &TxOptions) -> Result<Box<dyn TxHandle>, TransactorError> {
        // owned by the handle before BEGIN is sent, so an abandoned begin is rolled back on drop
        let tx = PostgresTx {
            client: Some(self.pool.get().await?),
        };
        tx.client()?
            .batch_execute(&begin_statement(options))
            .await?;
        Ok(Box::new(tx))
    }
}

/// An open transaction holding its pooled client.
///
/// Dropping it unfinished issues `ROLLBACK` in the background before the client can be reused.
pub struct PostgresTx {
    client: Option<Object>,
}

impl PostgresTx {
    fn client(&self) -> Result<&Object, TransactorError> {
        self.client.as_ref().ok_or(TransactorError::TransactionClosed)
    }

    async fn finish(mut self: Box<Self>, statement: &str) -> Result<(), TransactorError> {
        let client = self
            .client
            .take()
            .ok_or(TransactorError::TransactionClosed)?;
        client.batch_execute(statement).await?;
        Ok(())
    }
}

#[async_trait]
impl Queryer for PostgresTx {
    async fn query(
        &self,
        text: &str,
        params: &[Value],
    ) -> Result<Box<dyn Cursor>, TransactorError> {
        query_text(self.client()?, text, params).await
    }

    async fn exec(&self, text: &str, params: &[Value]) -> Result<ExecResult, TransactorError> {
        exec_on(self.client()?, text, params).await
    }
}

#[async_trait]
impl TxHandle for PostgresTx {
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
        let client = self.client()?;
        let statement = client.prepare(text).await?;
        Ok(Box::new(PostgresPrepared { client, statement }))
    }
}

impl Drop for PostgresTx {
    fn drop(&mut self) {
        if let Some(client) = self.client.take()
            && let Ok(handle) = Handle::try_current()
        {
            handle.spawn(async move {
                if let Err(err) = client.batch_execute("ROLLBACK").await {
                    warn!(error = %err, "rollback of abandoned transaction failed");
                }
            });
        }
    }
}

/// A statement prepared on a transaction's client.
pub struct PostgresPrepared<'a> {
    client: &'a Object,
    statement: tokio_postgres::Statement,
}

#[async_trait]
impl PreparedStatement for PostgresPrepared<'_> {
    async fn exec(&self, params: &[Value]) -> Result<ExecResult, TransactorError> {
        let rows_affected = self
            .client
            .execute(&self.statement, &as_refs(params))
            .await?;
        Ok(ExecResult {
            rows_affected,
            last_insert_id: None,
        })
    }

    async fn query(&self, params: &[Value]) -> Result<Box<dyn Cursor>, TransactorError> {
        query_statement(self.client, &self.statement, params).await
    }
}
