use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::TransactorError;

/// Values bound as statement parameters or read back from a cursor.
///
/// ```rust
/// use sql_transactor::prelude::*;
///
/// let params: Vec<Value> = vec![1_i64.into(), "alice".into(), true.into()];
/// assert_eq!(params[1].as_text(), Some("alice"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    Timestamp(NaiveDateTime),
    Null,
    Json(JsonValue),
    Blob(Vec<u8>),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        if let Value::Int(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let Value::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bool(_) => "bool",
            Value::Timestamp(_) => "timestamp",
            Value::Null => "NULL",
            Value::Json(_) => "json",
            Value::Blob(_) => "blob",
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value.into())
                }
            }
        )*
    };
}

value_from!(
    i64 => Int,
    i32 => Int,
    f64 => Float,
    bool => Bool,
    String => Text,
    &str => Text,
    NaiveDateTime => Timestamp,
    JsonValue => Json,
    Vec<u8> => Blob,
);

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Conversion from a cursor value into a Rust type.
pub trait FromValue: Sized {
    /// # Errors
    /// Returns `TransactorError::ConversionError` when the value has an incompatible type.
    fn from_value(value: Value) -> Result<Self, TransactorError>;
}

fn mismatch<T>(value: &Value, target: &str) -> Result<T, TransactorError> {
    Err(TransactorError::ConversionError(format!(
        "cannot scan {} into {target}",
        value.type_name()
    )))
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, TransactorError> {
        Ok(value)
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self, TransactorError> {
        match value {
            Value::Int(i) => Ok(i),
            other => mismatch(&other, "i64"),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self, TransactorError> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|e| TransactorError::ConversionError(format!("{wide}: {e}")))
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, TransactorError> {
        match value {
            Value::Float(f) => Ok(f),
            #[allow(clippy::cast_precision_loss)]
            Value::Int(i) => Ok(i as f64),
            other => mismatch(&other, "f64"),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, TransactorError> {
        match value {
            Value::Text(s) => Ok(s),
            other => mismatch(&other, "String"),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, TransactorError> {
        match value {
            Value::Bool(b) => Ok(b),
            // SQLite stores booleans as integers
            Value::Int(0) => Ok(false),
            Value::Int(1) => Ok(true),
            other => mismatch(&other, "bool"),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self, TransactorError> {
        match value {
            Value::Blob(bytes) => Ok(bytes),
            Value::Text(s) => Ok(s.into_bytes()),
            other => mismatch(&other, "Vec<u8>"),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> Result<Self, TransactorError> {
        match value {
            Value::Timestamp(ts) => Ok(ts),
            Value::Text(s) => ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(&s, fmt).ok())
                .ok_or_else(|| {
                    TransactorError::ConversionError(format!("cannot parse timestamp {s:?}"))
                }),
            other => mismatch(&other, "NaiveDateTime"),
        }
    }
}

impl FromValue for JsonValue {
    fn from_value(value: Value) -> Result<Self, TransactorError> {
        match value {
            Value::Json(json) => Ok(json),
            Value::Text(s) => serde_json::from_str(&s)
                .map_err(|e| TransactorError::ConversionError(format!("invalid json: {e}"))),
            other => mismatch(&other, "serde_json::Value"),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, TransactorError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// A destination that one column of the current row can be scanned into.
pub trait ScanTarget {
    /// # Errors
    /// Returns `TransactorError::ConversionError` when the value does not fit the destination.
    fn scan_value(&mut self, value: Value) -> Result<(), TransactorError>;
}

impl<T: FromValue> ScanTarget for T {
    fn scan_value(&mut self, value: Value) -> Result<(), TransactorError> {
        *self = T::from_value(value)?;
        Ok(())
    }
}

/// Transaction isolation requested from the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Whatever the server is configured to use.
    Default,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    #[default]
    Serializable,
}

impl IsolationLevel {
    /// SQL spelling of the level, `None` for the server default.
    #[must_use]
    pub fn as_sql(self) -> Option<&'static str> {
        match self {
            IsolationLevel::Default => None,
            IsolationLevel::ReadUncommitted => Some("READ UNCOMMITTED"),
            IsolationLevel::ReadCommitted => Some("READ COMMITTED"),
            IsolationLevel::RepeatableRead => Some("REPEATABLE READ"),
            IsolationLevel::Serializable => Some("SERIALIZABLE"),
        }
    }
}

/// Options for a single `transact` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOptions {
    pub isolation: IsolationLevel,
    /// Hint that the callback will not write.
    pub read_only: bool,
    /// When false, commit failures and retryable callback errors end the call
    /// instead of starting another attempt. Begin failures always retry.
    pub retryable: bool,
}

impl Default for TxOptions {
    fn default() -> Self {
        Self {
            isolation: IsolationLevel::Serializable,
            read_only: false,
            retryable: true,
        }
    }
}

impl TxOptions {
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    #[must_use]
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }
}

/// Outcome of an exec statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Populated by drivers that report it (SQLite).
    pub last_insert_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_scans_null() {
        let mut target: Option<String> = Some("old".into());
        target.scan_value(Value::Null).unwrap();
        assert_eq!(target, None);
    }

    #[test]
    fn null_into_plain_type_fails() {
        let mut target = 0_i64;
        let err = target.scan_value(Value::Null).unwrap_err();
        assert!(matches!(err, TransactorError::ConversionError(_)));
    }

    #[test]
    fn sqlite_style_values_convert() {
        assert!(bool::from_value(Value::Int(1)).unwrap());
        let ts = NaiveDateTime::from_value(Value::Text("2024-01-02 03:04:05".into())).unwrap();
        assert_eq!(ts.to_string(), "2024-01-02 03:04:05");
        let json = JsonValue::from_value(Value::Text(r#"{"a":1}"#.into())).unwrap();
        assert_eq!(json["a"], 1);
    }

    #[test]
    fn default_options_are_serializable_read_write() {
        let opts = TxOptions::default();
        assert_eq!(opts.isolation.as_sql(), Some("SERIALIZABLE"));
        assert!(!opts.read_only);
        assert!(opts.retryable);
    }
}
