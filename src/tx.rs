use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::commander::RawCommander;
use crate::connection::{Connection, PreparedStatement, TxHandle};
use crate::error::TransactorError;
use crate::executor::{Executor, cancellable};
use crate::placeholder::PlaceholderFormat;
use crate::results::Rows;
use crate::types::{ExecResult, TxOptions, Value};

/// The commander handed to a transaction callback for one attempt.
///
/// Statements run in the order they are issued on the attempt's transaction. Reads are not
/// retried here; the whole transaction is retried instead.
pub struct Tx {
    handle: Option<Box<dyn TxHandle>>,
    conn: Arc<dyn Connection>,
    options: TxOptions,
    executor: Executor,
    placeholder: Arc<dyn PlaceholderFormat>,
}

impl Tx {
    pub(crate) fn new(
        handle: Box<dyn TxHandle>,
        conn: Arc<dyn Connection>,
        options: TxOptions,
        executor: Executor,
        placeholder: Arc<dyn PlaceholderFormat>,
    ) -> Self {
        Self {
            handle: Some(handle),
            conn,
            options,
            executor,
            placeholder,
        }
    }

    fn handle(&self) -> Result<&dyn TxHandle, TransactorError> {
        self.handle
            .as_deref()
            .ok_or(TransactorError::TransactionClosed)
    }

    pub(crate) fn take_handle(&mut self) -> Option<Box<dyn TxHandle>> {
        self.handle.take()
    }

    #[must_use]
    pub fn options(&self) -> &TxOptions {
        &self.options
    }

    /// The context the transaction was started with.
    #[must_use]
    pub fn context(&self) -> &CancellationToken {
        &self.executor.ctx
    }

    /// Roll back everything done so far and continue in a fresh transaction with the same
    /// options. Commit or rollback still happens when the callback returns.
    ///
    /// # Errors
    /// Returns `TransactorError::RollbackFailure` if the rollback fails, or the begin error.
    /// Either way the `Tx` is left without a transaction and later statements fail with
    /// `TransactorError::TransactionClosed`.
    pub async fn reset(&mut self) -> Result<(), TransactorError> {
        let handle = self
            .handle
            .take()
            .ok_or(TransactorError::TransactionClosed)?;
        handle
            .rollback()
            .await
            .map_err(|err| TransactorError::RollbackFailure(Box::new(err)))?;
        let fresh = cancellable(&self.executor.ctx, self.conn.begin(&self.options)).await?;
        self.handle = Some(fresh);
        Ok(())
    }

    /// Prepare `statement` for repeated execution in this transaction.
    ///
    /// The statement is sent as written.
    ///
    /// # Errors
    /// Returns `TransactorError::StatementError` if the driver rejects the statement.
    pub async fn prepare_raw(&self, statement: &str) -> Result<Prepared<'_>, TransactorError> {
        let handle = self.handle()?;
        let inner = self
            .executor
            .run(statement, &[], handle.prepare(statement))
            .await?;
        Ok(Prepared {
            inner,
            statement: statement.to_string(),
            executor: &self.executor,
        })
    }
}

#[async_trait]
impl RawCommander for Tx {
    fn placeholder_format(&self) -> &dyn PlaceholderFormat {
        self.placeholder.as_ref()
    }

    async fn query_raw(&self, statement: &str, params: &[Value]) -> Result<Rows, TransactorError> {
        self.executor.query(self.handle()?, statement, params).await
    }

    async fn exec_raw(
        &self,
        statement: &str,
        params: &[Value],
    ) -> Result<ExecResult, TransactorError> {
        self.executor.exec(self.handle()?, statement, params).await
    }

    async fn select_raw(
        &self,
        statement: &str,
        params: &[Value],
    ) -> Result<Rows, TransactorError> {
        self.executor.select(self.handle()?, statement, params).await
    }
}

/// A statement prepared inside a transaction. Borrowing the [`Tx`] keeps it from outliving
/// the attempt.
pub struct Prepared<'t> {
    inner: Box<dyn PreparedStatement + 't>,
    statement: String,
    executor: &'t Executor,
}

impl Prepared<'_> {
    #[must_use]
    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// # Errors
    /// Returns `TransactorError::StatementError` wrapping the driver failure.
    pub async fn exec(&self, params: &[Value]) -> Result<ExecResult, TransactorError> {
        self.executor
            .run(&self.statement, params, self.inner.exec(params))
            .await
    }

    /// # Errors
    /// Returns `TransactorError::StatementError` wrapping the driver failure.
    pub async fn query(&self, params: &[Value]) -> Result<Rows, TransactorError> {
        self.executor
            .run(&self.statement, params, self.inner.query(params))
            .await
            .map(Rows::new)
    }
}
