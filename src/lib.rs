//! Transaction runner with automatic retries, a commander for issuing statements, small
//! statement builders and struct-to-column mapping, over PostgreSQL and SQLite.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use sql_transactor::prelude::*;
//! use sql_transactor::sqlite::SqliteConnection;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> Result<(), TransactorError> {
//! let conn = SqliteConnection::open("app.db")?;
//! let transactor = Transactor::new(Arc::new(conn), Placeholder::Question);
//! let ctx = CancellationToken::new();
//!
//! let total: i64 = transactor
//!     .transact(&ctx, None, |tx| {
//!         Box::pin(async move {
//!             let debit = Update::new("accounts").set_expr("balance", "balance - ?", params![10_i64]);
//!             tx.exec(&debit).await?;
//!             let mut total = 0_i64;
//!             tx.query_row_raw("SELECT sum(balance) FROM accounts", &[])
//!                 .await
//!                 .scan(&mut [&mut total])?;
//!             Ok(total)
//!         })
//!     })
//!     .await?;
//! # let _ = total;
//! # Ok(())
//! # }
//! ```

pub mod commander;
pub mod config;
pub mod connection;
pub mod error;
mod executor;
pub mod logging;
pub mod placeholder;
pub mod prelude;
pub mod query_builder;
pub mod record;
pub mod results;
pub mod retry;
pub mod statement;
pub mod transactor;
pub mod tx;
pub mod types;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use commander::{Commander, DirectCommander, RawCommander};
pub use config::DatabaseConfig;
pub use error::TransactorError;
pub use placeholder::{Placeholder, PlaceholderFormat};
pub use results::{Row, Rows};
pub use retry::RetryPolicy;
pub use statement::{Sqlizer, Statement};
pub use transactor::{Transactor, TransactorConfig};
pub use tx::{Prepared, Tx};
pub use types::{ExecResult, FromValue, IsolationLevel, ScanTarget, TxOptions, Value};
