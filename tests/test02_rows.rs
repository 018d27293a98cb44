use std::io::Write;
use std::sync::{Arc, Mutex};

use sql_transactor::prelude::*;
use sql_transactor::test_utils::{MockConnection, MockFailure, MockResult};
use tokio_util::sync::CancellationToken;

fn commander(conn: &MockConnection) -> DirectCommander {
    Transactor::new(Arc::new(conn.clone()), Placeholder::Question)
        .commander(&CancellationToken::new())
}

/// Collects formatted tracing output.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

#[tokio::test]
async fn row_scans_once_then_reports_closed() -> Result<(), Box<dyn std::error::Error>> {
    let conn = MockConnection::new();
    conn.push_result(
        MockResult::new(["id", "name"])
            .row(params![7_i64, "ann"])
            .row(params![8_i64, "bob"]),
    );

    let mut row = commander(&conn).query_row_raw("SELECT id, name FROM users", &[]).await;
    assert_eq!(row.columns()?, ["id", "name"]);

    let (mut id, mut name) = (0_i64, String::new());
    row.scan(&mut [&mut id, &mut name])?;
    assert_eq!((id, name.as_str()), (7, "ann"));
    assert_eq!(conn.cursor_closes(), 1);

    assert!(matches!(row.scan(&mut [&mut id]), Err(TransactorError::Closed)));
    assert!(matches!(row.columns(), Err(TransactorError::Closed)));
    assert_eq!(conn.cursor_closes(), 1);
    Ok(())
}

#[tokio::test]
async fn empty_result_is_no_rows() {
    let conn = MockConnection::new();
    conn.push_result(MockResult::new(["id"]));

    let mut id = 0_i64;
    let err = commander(&conn)
        .query_row_raw("SELECT id FROM users WHERE false", &[])
        .await
        .scan(&mut [&mut id])
        .unwrap_err();

    assert!(matches!(err, TransactorError::NoRows));
    assert!(err.is_no_rows());
    assert_eq!(conn.cursor_closes(), 1);
}

#[tokio::test]
async fn iteration_error_beats_no_rows() {
    let conn = MockConnection::new();
    conn.push_result(
        MockResult::new(["id"])
            .trailing_error(MockFailure::new(Some("57014"), "canceling statement")),
    );

    let mut id = 0_i64;
    let err = commander(&conn)
        .query_row_raw("SELECT id FROM users", &[])
        .await
        .scan(&mut [&mut id])
        .unwrap_err();

    assert_eq!(err.sqlstate(), Some("57014"));
    assert_eq!(conn.cursor_closes(), 1);
}

#[tokio::test]
async fn close_error_surfaces_after_a_good_scan() {
    let conn = MockConnection::new();
    conn.push_result(
        MockResult::new(["id"])
            .row(params![1_i64])
            .close_error(MockFailure::new(None, "connection reset")),
    );

    let mut id = 0_i64;
    let err = commander(&conn)
        .query_row_raw("SELECT id FROM users", &[])
        .await
        .scan(&mut [&mut id])
        .unwrap_err();

    assert_eq!(id, 1);
    assert_eq!(err.to_string(), "connection reset");
}

#[tokio::test]
async fn failed_query_row_keeps_returning_the_prior_error() {
    let conn = MockConnection::new();
    conn.fail_queries(1, &MockFailure::new(Some("42P01"), "relation \"nope\" does not exist"));

    let mut row = commander(&conn).query_row_raw("SELECT * FROM nope", &[]).await;
    let mut id = 0_i64;
    for _ in 0..2 {
        let err = row.scan(&mut [&mut id]).unwrap_err();
        assert!(matches!(err, TransactorError::PriorStatement(_)));
        assert_eq!(err.sqlstate(), Some("42P01"));
    }
    assert!(matches!(row.columns(), Err(TransactorError::PriorStatement(_))));
    assert_eq!(conn.cursor_closes(), 0);
}

#[tokio::test]
async fn scan_count_must_match_columns() {
    let conn = MockConnection::new();
    conn.push_result(MockResult::new(["id", "name"]).row(params![1_i64, "ann"]));

    let mut id = 0_i64;
    let err = commander(&conn)
        .query_row_raw("SELECT id, name FROM users", &[])
        .await
        .scan(&mut [&mut id])
        .unwrap_err();

    assert!(matches!(err, TransactorError::ConversionError(_)));
    assert_eq!(conn.cursor_closes(), 1);
}

#[tokio::test]
async fn each_visits_every_row_and_closes() -> Result<(), Box<dyn std::error::Error>> {
    let conn = MockConnection::new();
    conn.push_result(
        MockResult::new(["n"])
            .row(params![1_i64])
            .row(params![2_i64])
            .row(params![Option::<i64>::None]),
    );

    let mut rows = commander(&conn).query_raw("SELECT n FROM t", &[]).await?;
    let mut seen = Vec::new();
    rows.each(|rows| {
        let mut n: Option<i64> = None;
        rows.scan(&mut [&mut n])?;
        seen.push(n);
        Ok(())
    })?;

    assert_eq!(seen, [Some(1), Some(2), None]);
    assert_eq!(conn.cursor_closes(), 1);
    assert!(!rows.next());
    assert!(matches!(rows.columns(), Err(TransactorError::Closed)));
    Ok(())
}

#[tokio::test]
async fn each_stops_at_the_callback_error() {
    let conn = MockConnection::new();
    conn.push_result(MockResult::new(["n"]).row(params![1_i64]).row(params![2_i64]));

    let mut rows = commander(&conn).query_raw("SELECT n FROM t", &[]).await.unwrap();
    let mut visits = 0;
    let err = rows
        .each(|_| {
            visits += 1;
            Err(TransactorError::Other("stop".into()))
        })
        .unwrap_err();

    assert_eq!(visits, 1);
    assert_eq!(err.to_string(), "Other database error: stop");
    assert_eq!(conn.cursor_closes(), 1);
}

#[tokio::test]
async fn dropping_rows_closes_the_cursor() {
    let conn = MockConnection::new();
    conn.push_result(MockResult::new(["n"]).row(params![1_i64]));

    let rows = commander(&conn).query_raw("SELECT n FROM t", &[]).await.unwrap();
    drop(rows);
    assert_eq!(conn.cursor_closes(), 1);
}

#[tokio::test]
async fn query_row_sends_builder_output() {
    let conn = MockConnection::new();
    let row = commander(&conn).query_row(&Statement::new("SELECT ?", params![1_i64])).await;
    drop(row);
    assert_eq!(conn.statements(), ["SELECT ?"]);
}

#[tokio::test]
async fn close_error_behind_a_callback_error_is_logged() -> Result<(), Box<dyn std::error::Error>> {
    let conn = MockConnection::new();
    conn.push_result(
        MockResult::new(["id"])
            .row(params![1_i64])
            .close_error(MockFailure::new(None, "cursor release failed")),
    );
    let mut rows = commander(&conn).query_raw("SELECT id FROM t", &[]).await?;

    let logs = LogBuffer::default();
    let sink = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || sink.clone())
        .with_ansi(false)
        .finish();
    let result = tracing::subscriber::with_default(subscriber, || {
        rows.each(|_| Err(TransactorError::Other("stop".into())))
    });

    assert!(matches!(result, Err(TransactorError::Other(ref msg)) if msg == "stop"));
    assert_eq!(conn.cursor_closes(), 1);
    let logged = logs.contents();
    assert!(logged.contains("closing rows failed"), "{logged}");
    assert!(logged.contains("cursor release failed"), "{logged}");
    Ok(())
}
