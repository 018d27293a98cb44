#![cfg(feature = "sqlite")]

use std::sync::Arc;

use chrono::NaiveDate;
use sql_transactor::prelude::*;
use sql_transactor::sqlite::SqliteConnection;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default, Clone, PartialEq)]
struct Audit {
    created_by: String,
}

impl_record!(Audit {
    created_by => "created_by",
});

#[derive(Debug, Default, Clone, PartialEq)]
struct User {
    id: i64,
    name: String,
    active: bool,
    audit: Audit,
    scratch: u8,
}

impl_record!(User {
    id => "id",
    name => "name",
    active => "active",
    embed audit,
    skip scratch,
});

async fn users_db() -> Result<(Transactor, CancellationToken), TransactorError> {
    let conn = SqliteConnection::open_in_memory()?;
    let transactor = Transactor::new(Arc::new(conn), Placeholder::Question);
    let ctx = CancellationToken::new();
    transactor
        .commander(&ctx)
        .exec_raw(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                active INTEGER NOT NULL,
                created_by TEXT NOT NULL
            )",
            &[],
        )
        .await?;
    Ok((transactor, ctx))
}

async fn count_users(
    transactor: &Transactor,
    ctx: &CancellationToken,
) -> Result<i64, TransactorError> {
    let mut n = 0_i64;
    transactor
        .commander(ctx)
        .select_row(&Statement::raw("SELECT count(*) FROM users"))
        .await
        .scan(&mut [&mut n])?;
    Ok(n)
}

fn user(id: i64, name: &str) -> User {
    User {
        id,
        name: name.to_string(),
        active: id % 2 == 1,
        audit: Audit {
            created_by: "seed".into(),
        },
        scratch: 0,
    }
}

#[tokio::test]
async fn records_round_trip_through_sqlite() -> Result<(), Box<dyn std::error::Error>> {
    let (transactor, ctx) = users_db().await?;
    let (ann, bob) = (user(1, "ann"), user(2, "bob"));

    let inserted = transactor
        .transact(&ctx, None, move |tx| {
            let (ann, bob) = (ann.clone(), bob.clone());
            Box::pin(async move { tx.insert_struct("users", &[&ann, &bob]).await })
        })
        .await?;
    assert_eq!(inserted.rows_affected, 2);

    let select = format!(
        "SELECT {} FROM users WHERE name = ?",
        column_names::<User>("").join(", ")
    );
    let mut found = User::default();
    transactor
        .commander(&ctx)
        .query_row_raw(&select, &params!["bob"])
        .await
        .scan_record(&mut found)?;
    assert_eq!(found, user(2, "bob"));
    Ok(())
}

#[tokio::test]
async fn update_struct_rewrites_mapped_columns() -> Result<(), Box<dyn std::error::Error>> {
    let (transactor, ctx) = users_db().await?;
    let commander = transactor.commander(&ctx);
    commander.insert_struct("users", &[&user(1, "ann")]).await?;

    let mut renamed = user(1, "anne");
    renamed.audit.created_by = "admin".into();
    let res = commander
        .update_struct("users", &renamed, "id = ?", params![1_i64])
        .await?;
    assert_eq!(res.rows_affected, 1);

    let mut rows = commander
        .query_raw("SELECT name, created_by FROM users", &[])
        .await?;
    assert_eq!(rows.collect_values()?, vec![params!["anne", "admin"]]);
    Ok(())
}

#[tokio::test]
async fn callback_error_rolls_back() -> Result<(), Box<dyn std::error::Error>> {
    let (transactor, ctx) = users_db().await?;

    let err = transactor
        .transact(&ctx, None, |tx| {
            Box::pin(async move {
                tx.insert_struct("users", &[&user(1, "ann")]).await?;
                Err::<(), _>(TransactorError::Other("changed my mind".into()))
            })
        })
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Other database error: changed my mind");
    assert_eq!(count_users(&transactor, &ctx).await?, 0);
    Ok(())
}

#[tokio::test]
async fn constraint_violation_is_not_retried() -> Result<(), Box<dyn std::error::Error>> {
    let (transactor, ctx) = users_db().await?;
    transactor
        .commander(&ctx)
        .insert_struct("users", &[&user(1, "ann")])
        .await?;

    let err = transactor
        .transact(&ctx, None, |tx| {
            Box::pin(async move {
                tx.insert_struct("users", &[&user(2, "bob")]).await?;
                tx.insert_struct("users", &[&user(3, "ann")]).await?;
                Ok(())
            })
        })
        .await
        .unwrap_err();

    assert!(err.to_string().contains("UNIQUE constraint failed"));
    assert!(err.to_string().contains("INSERT INTO users"));
    assert_eq!(count_users(&transactor, &ctx).await?, 1);
    Ok(())
}

#[tokio::test]
async fn read_only_transactions_reject_writes() -> Result<(), Box<dyn std::error::Error>> {
    let (transactor, ctx) = users_db().await?;

    let err = transactor
        .transact(&ctx, Some(TxOptions::read_only()), |tx| {
            Box::pin(async move { tx.insert_struct("users", &[&user(1, "ann")]).await })
        })
        .await
        .unwrap_err();
    assert!(matches!(err, TransactorError::StatementError { .. }));

    // the connection is writable again afterwards
    transactor
        .transact(&ctx, None, |tx| {
            Box::pin(async move { tx.insert_struct("users", &[&user(1, "ann")]).await })
        })
        .await?;
    assert_eq!(count_users(&transactor, &ctx).await?, 1);
    Ok(())
}

#[tokio::test]
async fn upsert_and_case_sum_run_as_sql() -> Result<(), Box<dyn std::error::Error>> {
    let (transactor, ctx) = users_db().await?;
    let commander = transactor.commander(&ctx);
    commander
        .insert_struct("users", &[&user(1, "ann"), &user(2, "bob"), &user(3, "cyd")])
        .await?;

    let upsert = Upsert::new("users")
        .key("id", 2_i64)
        .set("name", "bobby")
        .set("active", true)
        .set("created_by", "upsert");
    commander.exec(&upsert).await?;

    let active = CaseSum::new("1", "active = ?", params![true]).to_statement()?;
    let stmt = Statement::new(format!("SELECT {} FROM users", active.text), active.params);
    let mut n = 0_i64;
    commander.select_row(&stmt).await.scan(&mut [&mut n])?;
    assert_eq!(n, 3);

    let mut name = String::new();
    commander
        .query_row_raw("SELECT name FROM users WHERE id = 2", &[])
        .await
        .scan(&mut [&mut name])?;
    assert_eq!(name, "bobby");
    Ok(())
}

#[tokio::test]
async fn values_keep_their_meaning() -> Result<(), Box<dyn std::error::Error>> {
    let conn = SqliteConnection::open_in_memory()?;
    let transactor = Transactor::new(Arc::new(conn), Placeholder::Question);
    let ctx = CancellationToken::new();
    let commander = transactor.commander(&ctx);
    commander
        .exec_raw(
            "CREATE TABLE samples (
                id INTEGER PRIMARY KEY, at TEXT, doc TEXT, ok INTEGER, raw BLOB
            )",
            &[],
        )
        .await?;

    let at = NaiveDate::from_ymd_opt(2025, 1, 31)
        .and_then(|d| d.and_hms_micro_opt(23, 59, 58, 125_000))
        .unwrap();
    let doc = serde_json::json!({"tags": ["a", "b"]});
    let res = commander
        .exec(
            &Insert::new("samples")
                .columns(["at", "doc", "ok", "raw"])
                .values([
                    Value::Timestamp(at),
                    Value::Json(doc.clone()),
                    Value::Bool(false),
                    Value::Blob(vec![0, 159, 146, 150]),
                ]),
        )
        .await?;
    assert_eq!(res.last_insert_id, Some(1));

    let (mut got_at, mut got_doc, mut got_ok, mut got_raw) =
        (at, serde_json::Value::Null, true, Vec::<u8>::new());
    commander
        .query_row_raw("SELECT at, doc, ok, raw FROM samples", &[])
        .await
        .scan(&mut [&mut got_at, &mut got_doc, &mut got_ok, &mut got_raw])?;
    assert_eq!(got_at, at);
    assert_eq!(got_doc, doc);
    assert!(!got_ok);
    assert_eq!(got_raw, vec![0, 159, 146, 150]);
    Ok(())
}

#[tokio::test]
async fn prepared_inserts_share_the_transaction() -> Result<(), Box<dyn std::error::Error>> {
    let (transactor, ctx) = users_db().await?;

    transactor
        .transact(&ctx, None, |tx| {
            Box::pin(async move {
                let stmt = tx
                    .prepare_raw("INSERT INTO users (name, active, created_by) VALUES (?, ?, ?)")
                    .await?;
                for name in ["ann", "bob", "cyd"] {
                    stmt.exec(&params![name, true, "batch"]).await?;
                }
                Ok(())
            })
        })
        .await?;

    assert_eq!(count_users(&transactor, &ctx).await?, 3);
    Ok(())
}

#[tokio::test]
async fn unmapped_column_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    let (transactor, ctx) = users_db().await?;
    let commander = transactor.commander(&ctx);
    commander.insert_struct("users", &[&user(1, "ann")]).await?;

    let mut found = User::default();
    let err = commander
        .query_row_raw("SELECT id, name, 42 AS answer FROM users", &[])
        .await
        .scan_record(&mut found)
        .unwrap_err();
    assert_eq!(err.to_string(), "no matching record field for column answer");
    assert_eq!(found, User::default());
    Ok(())
}

#[tokio::test]
async fn file_database_persists_commits() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("app.db");
    let ctx = CancellationToken::new();

    {
        let conn = SqliteConnection::open(&path)?;
        let transactor = Transactor::new(Arc::new(conn), Placeholder::Question);
        transactor
            .transact(&ctx, None, |tx| {
                Box::pin(async move {
                    tx.exec_raw("CREATE TABLE kv (k TEXT PRIMARY KEY, v TEXT)", &[])
                        .await?;
                    tx.exec_raw("INSERT INTO kv VALUES (?, ?)", &params!["a", "1"])
                        .await?;
                    Ok(())
                })
            })
            .await?;
    }

    let conn = SqliteConnection::open(&path)?;
    let transactor = Transactor::new(Arc::new(conn), Placeholder::Question);
    let mut v = String::new();
    transactor
        .commander(&ctx)
        .query_row_raw("SELECT v FROM kv WHERE k = ?", &params!["a"])
        .await
        .scan(&mut [&mut v])?;
    assert_eq!(v, "1");
    Ok(())
}

#[tokio::test]
async fn missing_row_is_no_rows() -> Result<(), Box<dyn std::error::Error>> {
    let (transactor, ctx) = users_db().await?;
    let mut found = User::default();
    let err = transactor
        .commander(&ctx)
        .select_row(&Statement::new("SELECT id FROM users WHERE id = ?", params![9_i64]))
        .await
        .scan_record(&mut found)
        .unwrap_err();
    assert!(err.is_no_rows());
    Ok(())
}

#[tokio::test]
async fn cancelled_begin_does_not_swallow_later_writes() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("busy.db");
    let conn = SqliteConnection::open(&path)?;
    let transactor = Transactor::new(Arc::new(conn), Placeholder::Question);
    let setup = CancellationToken::new();
    transactor
        .commander(&setup)
        .exec_raw("CREATE TABLE t (v INTEGER)", &[])
        .await?;

    // a second connection holds the write lock so BEGIN IMMEDIATE waits on it
    let blocker = rusqlite::Connection::open(&path)?;
    blocker.execute_batch("BEGIN IMMEDIATE")?;

    let ctx = CancellationToken::new();
    let trigger = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        trigger.cancel();
    });
    let err = transactor
        .transact(&ctx, None, |tx| {
            Box::pin(async move {
                tx.exec_raw("INSERT INTO t (v) VALUES (2)", &[]).await?;
                Ok(())
            })
        })
        .await
        .unwrap_err();
    assert!(err.is_cancelled());

    blocker.execute_batch("COMMIT")?;

    let direct = CancellationToken::new();
    let res = transactor
        .commander(&direct)
        .exec_raw("INSERT INTO t (v) VALUES (1)", &[])
        .await?;
    assert_eq!(res.rows_affected, 1);

    let seen: i64 = blocker.query_row("SELECT count(*) FROM t", [], |row| row.get(0))?;
    assert_eq!(seen, 1);

    let mut after = 0_i64;
    transactor
        .commander(&direct)
        .query_row_raw("SELECT count(*) FROM t WHERE v = 1", &[])
        .await
        .scan(&mut [&mut after])?;
    assert_eq!(after, 1);
    Ok(())
}
