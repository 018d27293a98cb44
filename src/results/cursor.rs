use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::TransactorError;
use crate::types::Value;

/// A driver result set positioned before its first row.
///
/// Implementations are owned by exactly one [`Rows`](super::Rows), which guarantees `close`
/// is called once.
pub trait Cursor: Send {
    fn columns(&self) -> &[String];

    /// Move to the next row. Returns `false` when exhausted, closed, or on a driver error
    /// (reported afterwards by [`Cursor::err`]).
    fn advance(&mut self) -> bool;

    /// The values of the current row, if positioned on one.
    fn current(&self) -> Option<&[Value]>;

    /// Take the error that stopped iteration, if any.
    fn err(&mut self) -> Option<TransactorError>;

    /// Release the driver resource.
    ///
    /// # Errors
    /// Returns the driver error raised while releasing.
    fn close(&mut self) -> Result<(), TransactorError>;
}

/// Rows materialized up front, optionally followed by the error that cut the read short.
#[derive(Debug, Default)]
pub struct BufferedCursor {
    columns: Arc<Vec<String>>,
    rows: VecDeque<Vec<Value>>,
    current: Option<Vec<Value>>,
    trailing: Option<TransactorError>,
    closed: bool,
}

impl BufferedCursor {
    #[must_use]
    pub fn new(columns: Arc<Vec<String>>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows: rows.into(),
            ..Self::default()
        }
    }

    /// Report `error` once the buffered rows run out.
    #[must_use]
    pub fn with_trailing_error(mut self, error: TransactorError) -> Self {
        self.trailing = Some(error);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Cursor for BufferedCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn advance(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.current = self.rows.pop_front();
        self.current.is_some()
    }

    fn current(&self) -> Option<&[Value]> {
        self.current.as_deref()
    }

    fn err(&mut self) -> Option<TransactorError> {
        if self.rows.is_empty() {
            self.trailing.take()
        } else {
            None
        }
    }

    fn close(&mut self) -> Result<(), TransactorError> {
        self.closed = true;
        self.rows.clear();
        self.current = None;
        Ok(())
    }
}
