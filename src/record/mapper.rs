use std::collections::HashMap;

use crate::error::TransactorError;
use crate::query_builder::{Insert, Update};
use crate::results::Rows;
use crate::types::Value;

use super::{InsertSource, Record, schema_for};

/// Column names of `R` in scan order, each prefixed with `prefix` (e.g. `"u."`).
#[must_use]
pub fn column_names<R: Record>(prefix: &str) -> Vec<String> {
    schema_for::<R>()
        .scan
        .names
        .iter()
        .map(|name| format!("{prefix}{name}"))
        .collect()
}

/// Scan the current row of `rows` into `record`.
///
/// Every result column must map to a field; partial scans are not supported. Optional
/// embedded records are allocated before any value is written.
///
/// # Errors
/// Returns `TransactorError::UnmappedColumn` naming the first column without a field, or the
/// conversion error of the first value that does not fit its field.
pub fn scan_into<R: Record>(rows: &Rows, record: &mut R) -> Result<(), TransactorError> {
    let schema = schema_for::<R>();
    let columns = rows.columns()?;
    let values = rows.current_values()?;

    let setters = columns
        .iter()
        .map(|column| {
            schema
                .scan
                .setter(column)
                .ok_or_else(|| TransactorError::UnmappedColumn(column.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    schema.allocate(record);
    for (set, value) in setters.into_iter().zip(values) {
        set(record, value.clone())?;
    }
    Ok(())
}

/// Build a multi-row insert from `records`.
///
/// Column order comes from the first record. Later records must produce the same number of
/// columns; a column the first record has and a later one lacks is inserted as `NULL`.
///
/// # Errors
/// Returns `TransactorError::BuildError` for an empty slice and
/// `TransactorError::SchemaMismatch` when a record's column count differs from the first.
pub fn insert_struct(
    table: &str,
    records: &[&dyn InsertSource],
) -> Result<Insert, TransactorError> {
    let Some((first, rest)) = records.split_first() else {
        return Err(TransactorError::BuildError(
            "insert_struct requires at least one record".into(),
        ));
    };

    let first = first.insert_values();
    let names: Vec<String> = first.iter().map(|(name, _)| name.clone()).collect();
    let mut builder = Insert::new(table)
        .columns(names.iter().cloned())
        .values(first.into_iter().map(|(_, value)| value));

    for (idx, record) in rest.iter().enumerate() {
        let columns = record.insert_values();
        if columns.len() != names.len() {
            return Err(TransactorError::SchemaMismatch(format!(
                "record {} maps {} columns, the first record maps {}",
                idx + 1,
                columns.len(),
                names.len()
            )));
        }
        let mut by_name: HashMap<String, Value> = columns.into_iter().collect();
        builder = builder.values(
            names
                .iter()
                .map(|name| by_name.remove(name).unwrap_or(Value::Null)),
        );
    }
    Ok(builder)
}

/// Build `UPDATE table SET ...` assigning every mapped column of `record`.
///
/// The caller adds the `WHERE` clause.
#[must_use]
pub fn update_struct(table: &str, record: &dyn InsertSource) -> Update {
    record
        .update_values()
        .into_iter()
        .fold(Update::new(table), |update, (column, value)| {
            update.set(column, value)
        })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::record::SchemaBuilder;
    use crate::results::BufferedCursor;
    use crate::statement::Sqlizer;

    #[derive(Default, Debug)]
    struct Inner {
        id: i64,
        note: Option<String>,
    }

    impl Record for Inner {
        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema
                .column("id", |r| &r.id, |r| &mut r.id)
                .column("note", |r| &r.note, |r| &mut r.note);
        }
    }

    #[derive(Default, Debug)]
    struct Outer {
        inner: Inner,
        id: i64,
        extra: Option<Box<Inner2>>,
    }

    #[derive(Default, Debug)]
    struct Inner2 {
        label: String,
    }

    impl Record for Inner2 {
        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema.column("label", |r| &r.label, |r| &mut r.label);
        }
    }

    impl Record for Outer {
        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema
                .embed(|r| &r.inner, |r| &mut r.inner)
                .column("id", |r| &r.id, |r| &mut r.id)
                .embed_boxed(|r| &r.extra, |r| &mut r.extra);
        }
    }

    fn rows(columns: &[&str], values: Vec<Value>) -> Rows {
        let cursor = BufferedCursor::new(
            Arc::new(columns.iter().map(|c| (*c).to_string()).collect()),
            vec![values],
        );
        let mut rows = Rows::new(Box::new(cursor));
        assert!(rows.next());
        rows
    }

    #[test]
    fn outer_field_wins_on_scan() {
        let rows = rows(&["id", "note"], vec![Value::Int(9), Value::Null]);
        let mut outer = Outer::default();
        scan_into(&rows, &mut outer).unwrap();
        assert_eq!(outer.id, 9);
        assert_eq!(outer.inner.id, 0);
        assert!(outer.extra.is_some());
    }

    #[test]
    fn first_declaration_wins_on_insert() {
        let outer = Outer {
            inner: Inner { id: 1, note: None },
            id: 2,
            extra: None,
        };
        let stmt = insert_struct("t", &[&outer]).unwrap().to_statement().unwrap();
        assert_eq!(stmt.text, "INSERT INTO t (id,note,label) VALUES (?,?,?)");
        assert_eq!(stmt.params, vec![Value::Int(1), Value::Null, Value::Null]);
    }

    #[test]
    fn unmapped_column_rejected_before_writes() {
        let rows = rows(&["id", "bogus"], vec![Value::Int(3), Value::Int(4)]);
        let mut inner = Inner::default();
        let err = scan_into(&rows, &mut inner).unwrap_err();
        assert!(matches!(err, TransactorError::UnmappedColumn(ref c) if c == "bogus"));
        assert_eq!(inner.id, 0);
    }

    #[test]
    fn insert_count_mismatch() {
        let a = Inner::default();
        let b = Inner2::default();
        let err = insert_struct("t", &[&a, &b]).unwrap_err();
        assert!(matches!(err, TransactorError::SchemaMismatch(_)));
    }

    #[test]
    fn update_uses_scan_precedence() {
        let outer = Outer {
            inner: Inner { id: 1, note: None },
            id: 2,
            extra: Some(Box::new(Inner2 { label: "x".into() })),
        };
        let stmt = update_struct("t", &outer)
            .where_("id = ?", vec![Value::Int(2)])
            .to_statement()
            .unwrap();
        assert_eq!(
            stmt.text,
            "UPDATE t SET id = ?, note = ?, label = ? WHERE id = ?"
        );
        assert_eq!(stmt.params[0], Value::Int(2));
    }
}
