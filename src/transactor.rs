use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::commander::DirectCommander;
use crate::connection::{Connection, TxHandle};
use crate::error::TransactorError;
use crate::executor::{Executor, cancellable};
use crate::logging::QueryLogger;
use crate::placeholder::PlaceholderFormat;
use crate::retry::RetryPolicy;
use crate::tx::Tx;
use crate::types::TxOptions;

/// Settings for a [`Transactor`], fixed at construction.
#[derive(Clone)]
pub struct TransactorConfig {
    /// Attempts per `transact` call, and per `select` outside a transaction.
    pub retry_count: usize,
    /// Used when `transact` is called without options.
    pub default_tx_options: TxOptions,
    /// Classifies callback errors worth another attempt.
    pub retry_policy: RetryPolicy,
    pub query_logger: Option<Arc<dyn QueryLogger>>,
}

impl Default for TransactorConfig {
    fn default() -> Self {
        Self {
            retry_count: 5,
            default_tx_options: TxOptions::default(),
            retry_policy: RetryPolicy::default(),
            query_logger: None,
        }
    }
}

impl fmt::Debug for TransactorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactorConfig")
            .field("retry_count", &self.retry_count)
            .field("default_tx_options", &self.default_tx_options)
            .field("retry_policy", &self.retry_policy)
            .field("query_logger", &self.query_logger.is_some())
            .finish()
    }
}

/// Runs callbacks inside transactions, retrying the whole transaction on transient failures.
///
/// Cheap to clone; clones share the connection and configuration.
#[derive(Clone)]
pub struct Transactor {
    conn: Arc<dyn Connection>,
    placeholder: Arc<dyn PlaceholderFormat>,
    config: Arc<TransactorConfig>,
}

impl Transactor {
    /// A transactor with the default configuration.
    pub fn new(conn: Arc<dyn Connection>, placeholder: impl PlaceholderFormat + 'static) -> Self {
        Self {
            conn,
            placeholder: Arc::new(placeholder),
            config: Arc::new(TransactorConfig::default()),
        }
    }

    /// # Errors
    /// Returns `TransactorError::ConfigError` if `retry_count` is zero.
    pub fn with_config(
        conn: Arc<dyn Connection>,
        placeholder: impl PlaceholderFormat + 'static,
        config: TransactorConfig,
    ) -> Result<Self, TransactorError> {
        if config.retry_count == 0 {
            return Err(TransactorError::ConfigError(
                "retry_count must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            conn,
            placeholder: Arc::new(placeholder),
            config: Arc::new(config),
        })
    }

    #[must_use]
    pub fn config(&self) -> &TransactorConfig {
        &self.config
    }

    fn executor(&self, ctx: &CancellationToken, in_transaction: bool) -> Executor {
        Executor {
            ctx: ctx.clone(),
            logger: self.config.query_logger.clone(),
            retry_count: self.config.retry_count,
            in_transaction,
        }
    }

    /// A commander that runs statements outside any transaction, bound to `ctx`.
    #[must_use]
    pub fn commander(&self, ctx: &CancellationToken) -> DirectCommander {
        DirectCommander {
            conn: Arc::clone(&self.conn),
            executor: self.executor(ctx, false),
            placeholder: Arc::clone(&self.placeholder),
        }
    }

    /// Run `callback` in a transaction and commit it if the callback succeeds.
    ///
    /// Each attempt begins a fresh transaction. Begin failures and commit failures start a
    /// new attempt; a callback error is rolled back and retried only when the retry policy
    /// accepts it. A panic inside the callback is rolled back and returned as
    /// `TransactorError::PanicContained`, never retried. At most `retry_count` attempts are
    /// made; when all fail the last begin, commit or retryable callback error is returned.
    ///
    /// The callback is called once per attempt, so it must not move captured state into the
    /// returned future; clone what it needs instead.
    ///
    /// ```rust,no_run
    /// use sql_transactor::prelude::*;
    /// use tokio_util::sync::CancellationToken;
    ///
    /// # async fn demo(transactor: Transactor) -> Result<(), TransactorError> {
    /// let ctx = CancellationToken::new();
    /// let inserted = transactor
    ///     .transact(&ctx, None, |tx| {
    ///         Box::pin(async move {
    ///             tx.insert_row(&Insert::new("users").columns(["name"]).values(["ann"]))
    ///                 .await
    ///         })
    ///     })
    ///     .await?;
    /// assert!(inserted);
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// Returns the callback's own error when it is not retryable, `RollbackFailure` when a
    /// rollback fails, `Cancelled` when `ctx` is cancelled, or the last exit error once every
    /// attempt failed.
    pub async fn transact<T, F>(
        &self,
        ctx: &CancellationToken,
        options: Option<TxOptions>,
        mut callback: F,
    ) -> Result<T, TransactorError>
    where
        T: Send,
        F: for<'t> FnMut(&'t mut Tx) -> BoxFuture<'t, Result<T, TransactorError>> + Send,
    {
        let options = options.unwrap_or_else(|| self.config.default_tx_options.clone());
        let attempts = self.config.retry_count;
        let mut exit_error = None;

        for attempt in 1..=attempts {
            if ctx.is_cancelled() {
                return Err(TransactorError::Cancelled);
            }

            let handle = match cancellable(ctx, self.conn.begin(&options)).await {
                Ok(handle) => handle,
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    warn!(attempt, attempts, error = %err, "begin failed");
                    exit_error = Some(TransactorError::Begin {
                        attempt,
                        attempts,
                        source: Box::new(err),
                    });
                    continue;
                }
            };

            let mut tx = Tx::new(
                handle,
                Arc::clone(&self.conn),
                options.clone(),
                self.executor(ctx, true),
                Arc::clone(&self.placeholder),
            );

            match run_contained(&mut callback, &mut tx).await {
                Ok(value) => {
                    let Some(handle) = tx.take_handle() else {
                        return Err(TransactorError::TransactionClosed);
                    };
                    if ctx.is_cancelled() {
                        rollback(handle).await?;
                        return Err(TransactorError::Cancelled);
                    }
                    match cancellable(ctx, handle.commit()).await {
                        Ok(()) => return Ok(value),
                        Err(err) if err.is_cancelled() => return Err(err),
                        Err(err) => {
                            let err = TransactorError::Commit {
                                attempt,
                                attempts,
                                source: Box::new(err),
                            };
                            if !options.retryable {
                                return Err(err);
                            }
                            warn!(attempt, attempts, error = %err, "commit failed");
                            exit_error = Some(err);
                        }
                    }
                }
                Err(err) => {
                    if let Some(handle) = tx.take_handle() {
                        rollback(handle).await?;
                    }
                    let terminal = err.is_cancelled()
                        || matches!(
                            err,
                            TransactorError::PanicContained(_)
                                | TransactorError::RollbackFailure(_)
                        );
                    if terminal
                        || !options.retryable
                        || !self.config.retry_policy.should_retry(&err)
                    {
                        return Err(err);
                    }
                    warn!(attempt, attempts, error = %err, "retrying transaction");
                    exit_error = Some(err);
                }
            }
        }

        Err(exit_error.unwrap_or_else(|| {
            TransactorError::Other("no transaction attempts were made".to_string())
        }))
    }
}

/// Roll back without racing the context, so locks are released even after cancellation.
async fn rollback(handle: Box<dyn TxHandle>) -> Result<(), TransactorError> {
    handle.rollback().await.map_err(|err| {
        error!(error = %err, "rollback failed");
        TransactorError::RollbackFailure(Box::new(err))
    })
}

/// Invoke the callback and await its future, turning a panic in either into an error.
async fn run_contained<T, F>(callback: &mut F, tx: &mut Tx) -> Result<T, TransactorError>
where
    F: for<'t> FnMut(&'t mut Tx) -> BoxFuture<'t, Result<T, TransactorError>>,
{
    // moving `tx` out makes the closure FnOnce, so the future may keep the borrow
    let fut = match std::panic::catch_unwind(AssertUnwindSafe(move || {
        let tx = tx;
        callback(tx)
    })) {
        Ok(fut) => fut,
        Err(payload) => return Err(contained(payload.as_ref())),
    };
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(contained(payload.as_ref())),
    }
}

fn contained(payload: &(dyn Any + Send)) -> TransactorError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|msg| (*msg).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    error!(panic = %message, "transaction callback panicked");
    TransactorError::PanicContained(message)
}
