use tracing::warn;

use crate::error::TransactorError;
use crate::record::{self, Record};
use crate::types::{ScanTarget, Value};

use super::Cursor;

/// A live result set.
///
/// The cursor is released exactly once: by [`Rows::close`], by [`Rows::each`], or when the
/// `Rows` is dropped. Do not keep a `Rows` past the transaction attempt that produced it.
pub struct Rows {
    cursor: Box<dyn Cursor>,
    closed: bool,
}

impl std::fmt::Debug for Rows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rows")
            .field("columns", &self.cursor.columns())
            .field("closed", &self.closed)
            .finish()
    }
}

impl Rows {
    #[must_use]
    pub fn new(cursor: Box<dyn Cursor>) -> Self {
        Self {
            cursor,
            closed: false,
        }
    }

    /// Advance to the next row. Returns `false` once exhausted or closed.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        !self.closed && self.cursor.advance()
    }

    /// # Errors
    /// Returns `TransactorError::Closed` after the rows were closed.
    pub fn columns(&self) -> Result<Vec<String>, TransactorError> {
        if self.closed {
            return Err(TransactorError::Closed);
        }
        Ok(self.cursor.columns().to_vec())
    }

    pub(crate) fn current_values(&self) -> Result<&[Value], TransactorError> {
        if self.closed {
            return Err(TransactorError::Closed);
        }
        self.cursor
            .current()
            .ok_or_else(|| TransactorError::Other("scan called without a current row".into()))
    }

    /// Copy the current row into `targets`, one per column.
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use sql_transactor::prelude::*;
    ///
    /// let cursor = BufferedCursor::new(
    ///     Arc::new(vec!["id".into(), "name".into()]),
    ///     vec![vec![Value::Int(7), Value::Text("x".into())]],
    /// );
    /// let mut rows = Rows::new(Box::new(cursor));
    /// let (mut id, mut name) = (0_i64, String::new());
    /// assert!(rows.next());
    /// rows.scan(&mut [&mut id, &mut name]).unwrap();
    /// assert_eq!((id, name.as_str()), (7, "x"));
    /// ```
    ///
    /// # Errors
    /// Returns `TransactorError::ConversionError` if the target count differs from the column
    /// count or a value does not convert.
    pub fn scan(&mut self, targets: &mut [&mut dyn ScanTarget]) -> Result<(), TransactorError> {
        let values = self.current_values()?;
        if values.len() != targets.len() {
            return Err(TransactorError::ConversionError(format!(
                "expected {} destination arguments in scan, not {}",
                values.len(),
                targets.len()
            )));
        }
        for (target, value) in targets.iter_mut().zip(values) {
            target.scan_value(value.clone())?;
        }
        Ok(())
    }

    /// Map the current row onto `record` by column name.
    ///
    /// # Errors
    /// Returns `TransactorError::UnmappedColumn` for a column the record does not declare.
    pub fn scan_record<R: Record>(&mut self, record: &mut R) -> Result<(), TransactorError> {
        record::scan_into(self, record)
    }

    /// Take the error that ended iteration early, if any.
    pub fn err(&mut self) -> Option<TransactorError> {
        self.cursor.err()
    }

    /// Release the cursor. Later calls are no-ops.
    ///
    /// # Errors
    /// Returns the driver error raised by the first close.
    pub fn close(&mut self) -> Result<(), TransactorError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.cursor.close()
    }

    /// Call `f` for every row, then close.
    ///
    /// # Errors
    /// Returns the first error from `f`, the driver error that ended iteration, or the close
    /// error, in that order of precedence.
    pub fn each<F>(&mut self, mut f: F) -> Result<(), TransactorError>
    where
        F: FnMut(&mut Rows) -> Result<(), TransactorError>,
    {
        while self.next() {
            if let Err(err) = f(self) {
                self.close_logged();
                return Err(err);
            }
        }
        if let Some(err) = self.err() {
            self.close_logged();
            return Err(err);
        }
        self.close()
    }

    /// Close, logging a close failure instead of returning it.
    pub(crate) fn close_logged(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "closing rows failed");
        }
    }

    /// Drain the remaining rows as raw values, then close.
    ///
    /// # Errors
    /// Same as [`Rows::each`].
    pub fn collect_values(&mut self) -> Result<Vec<Vec<Value>>, TransactorError> {
        let mut out = Vec::new();
        self.each(|rows| {
            out.push(rows.current_values()?.to_vec());
            Ok(())
        })?;
        Ok(out)
    }
}

impl Drop for Rows {
    fn drop(&mut self) {
        if !self.closed {
            self.close_logged();
        }
    }
}
