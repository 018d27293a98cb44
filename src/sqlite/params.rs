use rusqlite::types::Value as SqliteValue;

use crate::types::Value;

/// Timestamp text layout, matching what `SQLite`'s own date functions produce.
pub const TIMESTAMP_FORMAT: &str = "%F %T%.f";

/// Convert a single [`Value`] to a rusqlite value.
///
/// `SQLite` has no boolean, timestamp or JSON storage class, so booleans bind as `0`/`1`,
/// timestamps as [`TIMESTAMP_FORMAT`] text and JSON as its serialized text.
#[must_use]
pub fn to_sqlite_value(value: &Value) -> SqliteValue {
    match value {
        Value::Int(i) => SqliteValue::Integer(*i),
        Value::Float(f) => SqliteValue::Real(*f),
        Value::Text(s) => SqliteValue::Text(s.clone()),
        Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        Value::Timestamp(dt) => SqliteValue::Text(dt.format(TIMESTAMP_FORMAT).to_string()),
        Value::Null => SqliteValue::Null,
        Value::Json(jval) => SqliteValue::Text(jval.to_string()),
        Value::Blob(bytes) => SqliteValue::Blob(bytes.clone()),
    }
}

/// Owned parameter list, ready to move onto the blocking pool.
#[derive(Debug, Clone, Default)]
pub struct Params(pub Vec<SqliteValue>);

impl Params {
    #[must_use]
    pub fn convert(params: &[Value]) -> Self {
        Params(params.iter().map(to_sqlite_value).collect())
    }

    pub(crate) fn bind(&self) -> rusqlite::ParamsFromIter<std::slice::Iter<'_, SqliteValue>> {
        rusqlite::params_from_iter(self.0.iter())
    }
}
