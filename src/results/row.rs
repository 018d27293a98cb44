use std::sync::Arc;

use crate::error::TransactorError;
use crate::record::Record;
use crate::types::ScanTarget;

use super::Rows;

#[derive(Debug)]
enum RowState {
    /// The statement failed before any cursor existed.
    Failed(Arc<TransactorError>),
    Live(Rows),
    Done,
}

/// The first row of a query, or the error that prevented running it.
///
/// A `Row` is scanned at most once: the cursor is closed after the first scan whatever the
/// outcome, and later scans return `TransactorError::Closed`.
#[derive(Debug)]
pub struct Row {
    state: RowState,
}

impl From<Result<Rows, TransactorError>> for Row {
    fn from(value: Result<Rows, TransactorError>) -> Self {
        match value {
            Ok(rows) => Row::new(rows),
            Err(err) => Row::failed(err),
        }
    }
}

impl Row {
    #[must_use]
    pub fn new(rows: Rows) -> Self {
        Self {
            state: RowState::Live(rows),
        }
    }

    #[must_use]
    pub fn failed(err: TransactorError) -> Self {
        Self {
            state: RowState::Failed(Arc::new(err)),
        }
    }

    /// # Errors
    /// Returns `TransactorError::PriorStatement` if the query failed, or
    /// `TransactorError::Closed` once the row has been scanned.
    pub fn columns(&self) -> Result<Vec<String>, TransactorError> {
        match &self.state {
            RowState::Failed(err) => Err(TransactorError::PriorStatement(Arc::clone(err))),
            RowState::Live(rows) => rows.columns(),
            RowState::Done => Err(TransactorError::Closed),
        }
    }

    /// # Errors
    /// Returns `TransactorError::NoRows` when the query produced nothing, the prior or driver
    /// error otherwise.
    pub fn scan(&mut self, targets: &mut [&mut dyn ScanTarget]) -> Result<(), TransactorError> {
        self.consume(|rows| rows.scan(targets))
    }

    /// # Errors
    /// As [`Row::scan`], plus the record mapping errors of [`Rows::scan_record`].
    pub fn scan_record<R: Record>(&mut self, record: &mut R) -> Result<(), TransactorError> {
        self.consume(|rows| rows.scan_record(record))
    }

    fn consume<F>(&mut self, scan: F) -> Result<(), TransactorError>
    where
        F: FnOnce(&mut Rows) -> Result<(), TransactorError>,
    {
        let mut rows = match std::mem::replace(&mut self.state, RowState::Done) {
            RowState::Failed(err) => {
                self.state = RowState::Failed(Arc::clone(&err));
                return Err(TransactorError::PriorStatement(err));
            }
            RowState::Done => return Err(TransactorError::Closed),
            RowState::Live(rows) => rows,
        };

        if !rows.next() {
            if let Some(err) = rows.err() {
                rows.close_logged();
                return Err(err);
            }
            rows.close()?;
            return Err(TransactorError::NoRows);
        }

        if let Err(err) = scan(&mut rows) {
            rows.close_logged();
            return Err(err);
        }
        rows.close()
    }
}
