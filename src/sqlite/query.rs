use std::sync::Arc;

use rusqlite::types::Value as SqliteValue;
use rusqlite::{Connection, Statement};

use super::params::Params;
use crate::error::TransactorError;
use crate::results::{BufferedCursor, Cursor};
use crate::types::{ExecResult, Value};

/// Extract a [`Value`] from a `SQLite` row.
///
/// # Errors
/// Returns `TransactorError::SqliteError` if the column cannot be read.
pub fn extract_value(row: &rusqlite::Row<'_>, idx: usize) -> Result<Value, TransactorError> {
    let value: SqliteValue = row.get(idx)?;
    Ok(match value {
        SqliteValue::Null => Value::Null,
        SqliteValue::Integer(i) => Value::Int(i),
        SqliteValue::Real(f) => Value::Float(f),
        SqliteValue::Text(s) => Value::Text(s),
        SqliteValue::Blob(b) => Value::Blob(b),
    })
}

/// Run `stmt` and buffer every row.
///
/// A failure while stepping through the rows is kept as the cursor's trailing error so the
/// rows read before it stay visible.
///
/// # Errors
/// Returns `TransactorError::SqliteError` if the statement fails before producing a row.
pub fn query_statement(
    stmt: &mut Statement<'_>,
    params: &Params,
) -> Result<Box<dyn Cursor>, TransactorError> {
    let columns: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    let width = columns.len();

    let mut rows_iter = stmt.query(params.bind())?;
    let mut rows = Vec::new();
    let trailing = loop {
        match rows_iter.next() {
            Ok(Some(row)) => match (0..width)
                .map(|i| extract_value(row, i))
                .collect::<Result<Vec<_>, _>>()
            {
                Ok(values) => rows.push(values),
                Err(err) => break Some(err),
            },
            Ok(None) => break None,
            Err(err) => break Some(TransactorError::from(err)),
        }
    };

    let cursor = BufferedCursor::new(Arc::new(columns), rows);
    Ok(Box::new(match trailing {
        Some(err) => cursor.with_trailing_error(err),
        None => cursor,
    }))
}

/// Prepare (through the statement cache) and run a query.
///
/// # Errors
/// Returns `TransactorError::SqliteError` from preparing or executing.
pub fn query_text(
    conn: &Connection,
    text: &str,
    params: &Params,
) -> Result<Box<dyn Cursor>, TransactorError> {
    let mut stmt = conn.prepare_cached(text)?;
    query_statement(&mut stmt, params)
}

/// Prepare (through the statement cache) and run a statement that returns no rows.
///
/// # Errors
/// Returns `TransactorError::SqliteError` from preparing or executing.
pub fn exec_text(
    conn: &Connection,
    text: &str,
    params: &Params,
) -> Result<ExecResult, TransactorError> {
    let mut stmt = conn.prepare_cached(text)?;
    let changed = stmt.execute(params.bind())?;
    let rows_affected = u64::try_from(changed).map_err(|e| {
        TransactorError::ConversionError(format!("Invalid rows affected count: {e}"))
    })?;
    Ok(ExecResult {
        rows_affected,
        last_insert_id: Some(conn.last_insert_rowid()),
    })
}
