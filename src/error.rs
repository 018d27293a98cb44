use std::sync::Arc;

use thiserror::Error;

/// SQLSTATE reported for serialization failures in the SQL standard.
pub const SERIALIZATION_FAILURE: &str = "40001";

#[derive(Debug, Error)]
pub enum TransactorError {
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PoolErrorPostgres(#[from] deadpool_postgres::PoolError),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    /// Driver failure that is not tied to one of the bundled backends.
    #[error("{}", driver_message(.code.as_deref(), .message))]
    Driver {
        code: Option<String>,
        message: String,
    },

    #[error("building statement: {0}")]
    BuildError(String),

    /// Driver failure annotated with the statement that caused it.
    #[error("{source} `{statement}`")]
    StatementError {
        statement: String,
        source: Box<TransactorError>,
    },

    #[error("no rows in result set")]
    NoRows,

    #[error("rows are closed")]
    Closed,

    /// A single-row result that already failed when it was built.
    #[error("existing row error: {0}")]
    PriorStatement(#[source] Arc<TransactorError>),

    #[error("beginning transaction: ({attempt}/{attempts}) {source}")]
    Begin {
        attempt: usize,
        attempts: usize,
        source: Box<TransactorError>,
    },

    #[error("committing transaction: ({attempt}/{attempts}) {source}")]
    Commit {
        attempt: usize,
        attempts: usize,
        source: Box<TransactorError>,
    },

    #[error("rolling back transaction: {0}")]
    RollbackFailure(#[source] Box<TransactorError>),

    #[error("panic: {0}")]
    PanicContained(String),

    #[error("transaction handle is no longer active")]
    TransactionClosed,

    #[error("operation cancelled")]
    Cancelled,

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("no matching record field for column {0}")]
    UnmappedColumn(String),

    #[error("conversion error: {0}")]
    ConversionError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Other database error: {0}")]
    Other(String),
}

fn driver_message(code: Option<&str>, message: &str) -> String {
    match code {
        Some(code) => format!("{message} (SQLSTATE {code})"),
        None => message.to_string(),
    }
}

impl TransactorError {
    /// Driver-neutral failure with an optional SQLSTATE code.
    pub fn driver(code: Option<&str>, message: impl Into<String>) -> Self {
        TransactorError::Driver {
            code: code.map(str::to_string),
            message: message.into(),
        }
    }

    /// The SQLSTATE carried by this error or the error it wraps, if any.
    #[must_use]
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            #[cfg(feature = "postgres")]
            TransactorError::PostgresError(err) => err.code().map(|state| state.code()),
            TransactorError::Driver { code, .. } => code.as_deref(),
            TransactorError::StatementError { source, .. }
            | TransactorError::Begin { source, .. }
            | TransactorError::Commit { source, .. } => source.sqlstate(),
            TransactorError::PriorStatement(source) => source.sqlstate(),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_no_rows(&self) -> bool {
        match self {
            TransactorError::NoRows => true,
            #[cfg(feature = "sqlite")]
            TransactorError::SqliteError(rusqlite::Error::QueryReturnedNoRows) => true,
            TransactorError::StatementError { source, .. } => source.is_no_rows(),
            TransactorError::PriorStatement(source) => source.is_no_rows(),
            _ => false,
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            TransactorError::Cancelled => true,
            TransactorError::StatementError { source, .. } => source.is_cancelled(),
            TransactorError::PriorStatement(source) => source.is_cancelled(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_error_carries_text_and_code() {
        let err = TransactorError::StatementError {
            statement: "UPDATE a SET b = $1".into(),
            source: Box::new(TransactorError::driver(Some("40001"), "could not serialize")),
        };
        assert_eq!(
            err.to_string(),
            "could not serialize (SQLSTATE 40001) `UPDATE a SET b = $1`"
        );
        assert_eq!(err.sqlstate(), Some(SERIALIZATION_FAILURE));
    }

    #[test]
    fn prior_statement_keeps_no_rows_visible() {
        let err = TransactorError::PriorStatement(Arc::new(TransactorError::NoRows));
        assert!(err.is_no_rows());
        assert!(!err.is_cancelled());
    }
}
