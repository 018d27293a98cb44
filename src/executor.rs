//! Statement execution shared by every commander: logging, cancellation and error annotation,
//! plus the retrying read path.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::connection::Queryer;
use crate::error::TransactorError;
use crate::logging::QueryLogger;
use crate::results::Rows;
use crate::types::{ExecResult, Value};

/// Race `fut` against `ctx`; a cancelled context wins ties.
///
/// # Errors
/// Returns `TransactorError::Cancelled` if the context is cancelled first, otherwise the
/// future's own result.
pub(crate) async fn cancellable<T, F>(ctx: &CancellationToken, fut: F) -> Result<T, TransactorError>
where
    F: Future<Output = Result<T, TransactorError>>,
{
    tokio::select! {
        biased;
        () = ctx.cancelled() => Err(TransactorError::Cancelled),
        res = fut => res,
    }
}

/// Attach the statement text to a driver failure.
fn annotate(err: TransactorError, statement: &str) -> TransactorError {
    if err.is_cancelled() {
        err
    } else {
        TransactorError::StatementError {
            statement: statement.to_string(),
            source: Box::new(err),
        }
    }
}

/// Per-commander execution settings.
#[derive(Clone)]
pub(crate) struct Executor {
    pub(crate) ctx: CancellationToken,
    pub(crate) logger: Option<Arc<dyn QueryLogger>>,
    pub(crate) retry_count: usize,
    /// Reads are never retried inside a transaction.
    pub(crate) in_transaction: bool,
}

impl Executor {
    /// Log, run cancellably and annotate failures of one statement.
    pub(crate) async fn run<T, F>(
        &self,
        statement: &str,
        params: &[Value],
        fut: F,
    ) -> Result<T, TransactorError>
    where
        F: Future<Output = Result<T, TransactorError>>,
    {
        if let Some(logger) = &self.logger {
            logger.log_query(statement, params);
        }
        cancellable(&self.ctx, fut)
            .await
            .map_err(|err| annotate(err, statement))
    }

    pub(crate) async fn query<Q>(
        &self,
        target: &Q,
        statement: &str,
        params: &[Value],
    ) -> Result<Rows, TransactorError>
    where
        Q: Queryer + ?Sized,
    {
        self.run(statement, params, target.query(statement, params))
            .await
            .map(Rows::new)
    }

    pub(crate) async fn exec<Q>(
        &self,
        target: &Q,
        statement: &str,
        params: &[Value],
    ) -> Result<ExecResult, TransactorError>
    where
        Q: Queryer + ?Sized,
    {
        self.run(statement, params, target.exec(statement, params))
            .await
    }

    /// Query with retries for transient failures.
    ///
    /// Stops at the first success, a no-rows result, a cancellation, or any error inside a
    /// transaction. When every attempt fails, the first error is returned.
    pub(crate) async fn select<Q>(
        &self,
        target: &Q,
        statement: &str,
        params: &[Value],
    ) -> Result<Rows, TransactorError>
    where
        Q: Queryer + ?Sized,
    {
        let attempts = self.retry_count.max(1);
        let mut first_error = None;
        for attempt in 1..=attempts {
            match self.query(target, statement, params).await {
                Ok(rows) => return Ok(rows),
                Err(err) if self.in_transaction || err.is_no_rows() || err.is_cancelled() => {
                    return Err(err);
                }
                Err(err) => {
                    warn!(attempt, attempts, error = %err, "select failed");
                    first_error.get_or_insert(err);
                }
            }
        }
        Err(first_error
            .unwrap_or_else(|| TransactorError::Other("select made no attempts".into())))
    }
}
