use std::sync::Arc;

use async_trait::async_trait;

use crate::connection::Connection;
use crate::error::TransactorError;
use crate::executor::Executor;
use crate::placeholder::PlaceholderFormat;
use crate::record::{self, InsertSource};
use crate::results::{Row, Rows};
use crate::statement::{Sqlizer, Statement};
use crate::types::{ExecResult, Value};

/// Statement execution against one connection or transaction, without builders.
///
/// Raw statements are sent as written; no placeholder rewriting happens on this path.
#[async_trait]
pub trait RawCommander: Send + Sync {
    /// Placeholder style applied to builder output.
    fn placeholder_format(&self) -> &dyn PlaceholderFormat;

    /// Run a query once.
    ///
    /// # Errors
    /// Returns `TransactorError::StatementError` wrapping the driver failure, or
    /// `TransactorError::Cancelled`.
    async fn query_raw(&self, statement: &str, params: &[Value]) -> Result<Rows, TransactorError>;

    /// Run a statement once.
    ///
    /// # Errors
    /// Returns `TransactorError::StatementError` wrapping the driver failure, or
    /// `TransactorError::Cancelled`.
    async fn exec_raw(
        &self,
        statement: &str,
        params: &[Value],
    ) -> Result<ExecResult, TransactorError>;

    /// Run a read-only query, retrying transient failures outside a transaction.
    ///
    /// Never use this for statements that modify data.
    ///
    /// # Errors
    /// Returns the first failure once every attempt has failed, or the failure of the only
    /// attempt inside a transaction.
    async fn select_raw(&self, statement: &str, params: &[Value])
    -> Result<Rows, TransactorError>;
}

/// Builder-level operations, available on every [`RawCommander`].
#[async_trait]
pub trait Commander: RawCommander {
    /// Produce the statement and rewrite its placeholders.
    ///
    /// # Errors
    /// Returns the builder's `TransactorError::BuildError`.
    fn build(&self, sqlizer: &dyn Sqlizer) -> Result<Statement, TransactorError> {
        let statement = sqlizer.to_statement()?;
        Ok(Statement {
            text: self
                .placeholder_format()
                .replace_placeholders(&statement.text)?,
            params: statement.params,
        })
    }

    /// Run a query once and keep only its first row.
    ///
    /// Failures are carried by the returned [`Row`] and surface when it is scanned.
    async fn query_row_raw(&self, statement: &str, params: &[Value]) -> Row {
        Row::from(self.query_raw(statement, params).await)
    }

    /// # Errors
    /// As [`Commander::build`] and [`RawCommander::exec_raw`].
    async fn exec(&self, sqlizer: &dyn Sqlizer) -> Result<ExecResult, TransactorError> {
        let statement = self.build(sqlizer)?;
        self.exec_raw(&statement.text, &statement.params).await
    }

    /// # Errors
    /// As [`Commander::build`] and [`RawCommander::query_raw`].
    async fn query(&self, sqlizer: &dyn Sqlizer) -> Result<Rows, TransactorError> {
        let statement = self.build(sqlizer)?;
        self.query_raw(&statement.text, &statement.params).await
    }

    async fn query_row(&self, sqlizer: &dyn Sqlizer) -> Row {
        match self.build(sqlizer) {
            Ok(statement) => self.query_row_raw(&statement.text, &statement.params).await,
            Err(err) => Row::failed(err),
        }
    }

    /// # Errors
    /// As [`Commander::build`] and [`RawCommander::select_raw`].
    async fn select(&self, sqlizer: &dyn Sqlizer) -> Result<Rows, TransactorError> {
        let statement = self.build(sqlizer)?;
        self.select_raw(&statement.text, &statement.params).await
    }

    async fn select_row(&self, sqlizer: &dyn Sqlizer) -> Row {
        Row::from(self.select(sqlizer).await)
    }

    /// Insert a single row.
    ///
    /// Returns `true` when one row was written and `false` when none was (e.g. a conflict
    /// clause skipped it).
    ///
    /// # Errors
    /// Returns `TransactorError::SchemaMismatch` if more than one row was affected.
    async fn insert_row(&self, sqlizer: &dyn Sqlizer) -> Result<bool, TransactorError> {
        let result = self.exec(sqlizer).await?;
        match result.rows_affected {
            0 => Ok(false),
            1 => Ok(true),
            n => Err(TransactorError::SchemaMismatch(format!(
                "{n} rows affected by insert_row"
            ))),
        }
    }

    /// Insert one row per record.
    ///
    /// # Errors
    /// As [`record::insert_struct`] and [`Commander::exec`].
    async fn insert_struct(
        &self,
        table: &str,
        records: &[&dyn InsertSource],
    ) -> Result<ExecResult, TransactorError> {
        let insert = record::insert_struct(table, records)?;
        self.exec(&insert).await
    }

    /// Update every mapped column of `record` in rows matching `predicate`.
    ///
    /// # Errors
    /// As [`Commander::exec`].
    async fn update_struct(
        &self,
        table: &str,
        record: &dyn InsertSource,
        predicate: &str,
        params: Vec<Value>,
    ) -> Result<ExecResult, TransactorError> {
        let update = record::update_struct(table, record).where_(predicate, params);
        self.exec(&update).await
    }
}

impl<C: RawCommander + ?Sized> Commander for C {}

/// Commander running straight against the connection, outside any transaction.
///
/// Obtained from [`Transactor::commander`](crate::Transactor::commander); bound to the context
/// it was created with.
#[derive(Clone)]
pub struct DirectCommander {
    pub(crate) conn: Arc<dyn Connection>,
    pub(crate) executor: Executor,
    pub(crate) placeholder: Arc<dyn PlaceholderFormat>,
}

#[async_trait]
impl RawCommander for DirectCommander {
    fn placeholder_format(&self) -> &dyn PlaceholderFormat {
        self.placeholder.as_ref()
    }

    async fn query_raw(&self, statement: &str, params: &[Value]) -> Result<Rows, TransactorError> {
        self.executor.query(self.conn.as_ref(), statement, params).await
    }

    async fn exec_raw(
        &self,
        statement: &str,
        params: &[Value],
    ) -> Result<ExecResult, TransactorError> {
        self.executor.exec(self.conn.as_ref(), statement, params).await
    }

    async fn select_raw(
        &self,
        statement: &str,
        params: &[Value],
    ) -> Result<Rows, TransactorError> {
        self.executor.select(self.conn.as_ref(), statement, params).await
    }
}
