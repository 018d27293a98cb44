//! Scripted in-memory backend for exercising transactions without a database.
//!
//! [`MockConnection`] records every call as a [`MockEvent`] and fails the next begin, commit,
//! rollback, query or exec when a [`MockFailure`] has been queued for it. Begin and commit
//! can be slowed down to exercise cancellation while they are in flight.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::connection::{Connection, PreparedStatement, Queryer, TxHandle};
use crate::error::{SERIALIZATION_FAILURE, TransactorError};
use crate::results::{BufferedCursor, Cursor};
use crate::types::{ExecResult, TxOptions, Value};

/// A driver error to inject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockFailure {
    pub code: Option<String>,
    pub message: String,
}

impl MockFailure {
    pub fn new(code: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            code: code.map(str::to_string),
            message: message.into(),
        }
    }

    /// A serialization failure, retried by the default policy.
    #[must_use]
    pub fn serialization() -> Self {
        Self::new(Some(SERIALIZATION_FAILURE), "could not serialize access")
    }

    #[must_use]
    pub fn to_error(&self) -> TransactorError {
        TransactorError::driver(self.code.as_deref(), self.message.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Begin,
    Commit,
    Rollback,
    Query(String),
    Exec(String),
    Prepare(String),
}

/// One scripted result set, returned by the next query.
#[derive(Debug, Clone, Default)]
pub struct MockResult {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    trailing: Option<MockFailure>,
    close_error: Option<MockFailure>,
}

impl MockResult {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn row(mut self, values: Vec<Value>) -> Self {
        self.rows.push(values);
        self
    }

    /// Fail iteration after the scripted rows.
    #[must_use]
    pub fn trailing_error(mut self, failure: MockFailure) -> Self {
        self.trailing = Some(failure);
        self
    }

    /// Fail when the cursor is closed.
    #[must_use]
    pub fn close_error(mut self, failure: MockFailure) -> Self {
        self.close_error = Some(failure);
        self
    }
}

#[derive(Default)]
struct MockState {
    events: Vec<MockEvent>,
    fail_begins: VecDeque<MockFailure>,
    fail_commits: VecDeque<MockFailure>,
    fail_rollbacks: VecDeque<MockFailure>,
    fail_queries: VecDeque<MockFailure>,
    fail_execs: VecDeque<MockFailure>,
    results: VecDeque<MockResult>,
    rows_affected: VecDeque<u64>,
    last_options: Option<TxOptions>,
    begin_delay: Option<Duration>,
    commit_delay: Option<Duration>,
    open: usize,
}

/// In-memory [`Connection`]. Clones share their script and event log.
#[derive(Clone, Default)]
pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
    closes: Arc<AtomicUsize>,
}

impl MockConnection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fail_begins(&self, count: usize, failure: &MockFailure) {
        self.state()
            .fail_begins
            .extend(std::iter::repeat_n(failure.clone(), count));
    }

    pub fn fail_commits(&self, count: usize, failure: &MockFailure) {
        self.state()
            .fail_commits
            .extend(std::iter::repeat_n(failure.clone(), count));
    }

    pub fn fail_rollbacks(&self, count: usize, failure: &MockFailure) {
        self.state()
            .fail_rollbacks
            .extend(std::iter::repeat_n(failure.clone(), count));
    }

    pub fn fail_queries(&self, count: usize, failure: &MockFailure) {
        self.state()
            .fail_queries
            .extend(std::iter::repeat_n(failure.clone(), count));
    }

    pub fn fail_execs(&self, count: usize, failure: &MockFailure) {
        self.state()
            .fail_execs
            .extend(std::iter::repeat_n(failure.clone(), count));
    }

    /// Suspend every begin for `delay` after the transaction has been opened.
    pub fn delay_begins(&self, delay: Duration) {
        self.state().begin_delay = Some(delay);
    }

    /// Suspend every commit for `delay` before it takes effect.
    pub fn delay_commits(&self, delay: Duration) {
        self.state().commit_delay = Some(delay);
    }

    /// Transactions begun and not yet committed, rolled back or abandoned.
    #[must_use]
    pub fn open_transactions(&self) -> usize {
        self.state().open
    }

    /// Queue the result of the next successful query. Without one, queries return no
    /// columns and no rows.
    pub fn push_result(&self, result: MockResult) {
        self.state().results.push_back(result);
    }

    /// Queue the row count of the next successful exec. Without one, execs report 1.
    pub fn push_rows_affected(&self, rows: u64) {
        self.state().rows_affected.push_back(rows);
    }

    #[must_use]
    pub fn events(&self) -> Vec<MockEvent> {
        self.state().events.clone()
    }

    #[must_use]
    pub fn count(&self, event: &MockEvent) -> usize {
        self.state().events.iter().filter(|e| *e == event).count()
    }

    /// Statements sent through query or exec, in order.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.state()
            .events
            .iter()
            .filter_map(|e| match e {
                MockEvent::Query(s) | MockEvent::Exec(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn last_tx_options(&self) -> Option<TxOptions> {
        self.state().last_options.clone()
    }

    /// How many cursors handed out so far have been closed.
    #[must_use]
    pub fn cursor_closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn run_query(&self, text: &str) -> Result<Box<dyn Cursor>, TransactorError> {
        let mut state = self.state();
        state.events.push(MockEvent::Query(text.to_string()));
        if let Some(failure) = state.fail_queries.pop_front() {
            return Err(failure.to_error());
        }
        let result = state.results.pop_front().unwrap_or_default();
        let mut inner = BufferedCursor::new(Arc::new(result.columns), result.rows);
        if let Some(failure) = result.trailing {
            inner = inner.with_trailing_error(failure.to_error());
        }
        Ok(Box::new(MockCursor {
            inner,
            close_error: result.close_error.map(|f| f.to_error()),
            closes: Arc::clone(&self.closes),
        }))
    }

    fn run_exec(&self, text: &str) -> Result<ExecResult, TransactorError> {
        let mut state = self.state();
        state.events.push(MockEvent::Exec(text.to_string()));
        if let Some(failure) = state.fail_execs.pop_front() {
            return Err(failure.to_error());
        }
        Ok(ExecResult {
            rows_affected: state.rows_affected.pop_front().unwrap_or(1),
            last_insert_id: None,
        })
    }

    fn record(
        &self,
        event: MockEvent,
        failures: fn(&mut MockState) -> &mut VecDeque<MockFailure>,
    ) -> Result<(), TransactorError> {
        let mut state = self.state();
        state.events.push(event);
        match failures(&mut state).pop_front() {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Queryer for MockConnection {
    async fn query(
        &self,
        text: &str,
        _params: &[Value],
    ) -> Result<Box<dyn Cursor>, TransactorError> {
        self.run_query(text)
    }

    async fn exec(&self, text: &str, _params: &[Value]) -> Result<ExecResult, TransactorError> {
        self.run_exec(text)
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn begin(&self, options: &TxOptions) -> Result<Box<dyn TxHandle>, TransactorError> {
        self.state().last_options = Some(options.clone());
        self.record(MockEvent::Begin, |s| &mut s.fail_begins)?;
        let tx = MockTx::open(self.clone());
        let delay = self.state().begin_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(Box::new(tx))
    }
}

/// Transaction handed out by [`MockConnection::begin`].
///
/// Dropping it unfinished records a [`MockEvent::Rollback`], like a driver rolling back an
/// abandoned transaction.
pub struct MockTx {
    conn: MockConnection,
    finished: bool,
}

impl MockTx {
    fn open(conn: MockConnection) -> Self {
        conn.state().open += 1;
        Self {
            conn,
            finished: false,
        }
    }

    fn finish(
        mut self: Box<Self>,
        event: MockEvent,
        failures: fn(&mut MockState) -> &mut VecDeque<MockFailure>,
    ) -> Result<(), TransactorError> {
        self.finished = true;
        self.conn.state().open -= 1;
        self.conn.record(event, failures)
    }
}

impl Drop for MockTx {
    fn drop(&mut self) {
        if !self.finished {
            let mut state = self.conn.state();
            state.open -= 1;
            state.events.push(MockEvent::Rollback);
        }
    }
}

#[async_trait]
impl Queryer for MockTx {
    async fn query(
        &self,
        text: &str,
        _params: &[Value],
    ) -> Result<Box<dyn Cursor>, TransactorError> {
        self.conn.run_query(text)
    }

    async fn exec(&self, text: &str, _params: &[Value]) -> Result<ExecResult, TransactorError> {
        self.conn.run_exec(text)
    }
}

#[async_trait]
impl TxHandle for MockTx {
    async fn commit(self: Box<Self>) -> Result<(), TransactorError> {
        let delay = self.conn.state().commit_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.finish(MockEvent::Commit, |s| &mut s.fail_commits)
    }

    async fn rollback(self: Box<Self>) -> Result<(), TransactorError> {
        self.finish(MockEvent::Rollback, |s| &mut s.fail_rollbacks)
    }

    async fn prepare<'a>(
        &'a self,
        text: &str,
    ) -> Result<Box<dyn PreparedStatement + 'a>, TransactorError> {
        self.conn
            .state()
            .events
            .push(MockEvent::Prepare(text.to_string()));
        Ok(Box::new(MockPrepared {
            conn: &self.conn,
            text: text.to_string(),
        }))
    }
}

struct MockPrepared<'a> {
    conn: &'a MockConnection,
    text: String,
}

#[async_trait]
impl PreparedStatement for MockPrepared<'_> {
    async fn exec(&self, _params: &[Value]) -> Result<ExecResult, TransactorError> {
        self.conn.run_exec(&self.text)
    }

    async fn query(&self, _params: &[Value]) -> Result<Box<dyn Cursor>, TransactorError> {
        self.conn.run_query(&self.text)
    }
}

/// Buffered cursor that counts closes and can fail on close.
pub struct MockCursor {
    inner: BufferedCursor,
    close_error: Option<TransactorError>,
    closes: Arc<AtomicUsize>,
}

impl Cursor for MockCursor {
    fn columns(&self) -> &[String] {
        self.inner.columns()
    }

    fn advance(&mut self) -> bool {
        self.inner.advance()
    }

    fn current(&self) -> Option<&[Value]> {
        self.inner.current()
    }

    fn err(&mut self) -> Option<TransactorError> {
        self.inner.err()
    }

    fn close(&mut self) -> Result<(), TransactorError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close()?;
        match self.close_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
