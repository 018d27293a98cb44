//! Capability traits implemented by each backend.
//!
//! A pooled [`Connection`] and an open [`TxHandle`] share the [`Queryer`] contract; only the
//! handle can commit, roll back or prepare. Cancellation and statement logging are layered on
//! top by the executor, so implementations only talk to their driver.

use async_trait::async_trait;

use crate::error::TransactorError;
use crate::results::Cursor;
use crate::types::{ExecResult, TxOptions, Value};

#[async_trait]
pub trait Queryer: Send + Sync {
    /// Run a statement that returns rows.
    ///
    /// # Errors
    /// Returns the driver error unchanged; the executor annotates it with the statement.
    async fn query(&self, text: &str, params: &[Value]) -> Result<Box<dyn Cursor>, TransactorError>;

    /// Run a statement that does not return rows.
    ///
    /// # Errors
    /// Returns the driver error unchanged; the executor annotates it with the statement.
    async fn exec(&self, text: &str, params: &[Value]) -> Result<ExecResult, TransactorError>;
}

#[async_trait]
pub trait Connection: Queryer {
    /// Open a transaction with `options`.
    ///
    /// # Errors
    /// Returns the driver error if the transaction cannot be started.
    async fn begin(&self, options: &TxOptions) -> Result<Box<dyn TxHandle>, TransactorError>;
}

/// One open transaction. Consumed by `commit` or `rollback`.
#[async_trait]
pub trait TxHandle: Queryer {
    /// # Errors
    /// Returns the driver error if the commit fails; the transaction is then finished.
    async fn commit(self: Box<Self>) -> Result<(), TransactorError>;

    /// # Errors
    /// Returns the driver error if the rollback fails.
    async fn rollback(self: Box<Self>) -> Result<(), TransactorError>;

    /// Prepare `text` for repeated execution inside this transaction.
    ///
    /// # Errors
    /// Returns the driver error if the statement does not prepare.
    async fn prepare<'a>(
        &'a self,
        text: &str,
    ) -> Result<Box<dyn PreparedStatement + 'a>, TransactorError>;
}

#[async_trait]
pub trait PreparedStatement: Send + Sync {
    /// # Errors
    /// Returns the driver error unchanged.
    async fn exec(&self, params: &[Value]) -> Result<ExecResult, TransactorError>;

    /// # Errors
    /// Returns the driver error unchanged.
    async fn query(&self, params: &[Value]) -> Result<Box<dyn Cursor>, TransactorError>;
}
