//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::commander::{Commander, DirectCommander, RawCommander};
pub use crate::error::TransactorError;
pub use crate::logging::{CallbackLogger, QueryLogger, TracingQueryLogger};
pub use crate::placeholder::{Placeholder, PlaceholderFormat};
pub use crate::query_builder::{CaseSum, Delete, Insert, Update, Upsert};
pub use crate::record::{InsertSource, Record, SchemaBuilder, column_names, scan_into};
pub use crate::results::{BufferedCursor, Cursor, Row, Rows};
pub use crate::retry::RetryPolicy;
pub use crate::statement::{Sqlizer, Statement};
pub use crate::transactor::{Transactor, TransactorConfig};
pub use crate::tx::{Prepared, Tx};
pub use crate::types::{ExecResult, FromValue, IsolationLevel, ScanTarget, TxOptions, Value};
pub use crate::{impl_record, params};
