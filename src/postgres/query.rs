use std::error::Error;
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value as JsonValue;
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::{Client, Row, Statement};

use super::params::as_refs;
use crate::error::TransactorError;
use crate::results::{BufferedCursor, Cursor};
use crate::types::Value;

/// Run a prepared statement and buffer its rows.
///
/// A column that fails to decode ends the cursor early; the failure is reported through
/// [`Cursor::err`] after the rows read before it.
///
/// # Errors
/// Returns the driver error if the statement fails to execute.
pub async fn query_statement(
    client: &Client,
    statement: &Statement,
    params: &[Value],
) -> Result<Box<dyn Cursor>, TransactorError> {
    let rows = client.query(statement, &as_refs(params)).await?;
    let columns: Vec<String> = statement
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect();

    let mut values = Vec::with_capacity(rows.len());
    let mut trailing = None;
    for row in &rows {
        match row_values(row) {
            Ok(row) => values.push(row),
            Err(err) => {
                trailing = Some(err);
                break;
            }
        }
    }

    let cursor = BufferedCursor::new(Arc::new(columns), values);
    Ok(Box::new(match trailing {
        Some(err) => cursor.with_trailing_error(err),
        None => cursor,
    }))
}

/// Prepare `text` on `client`, then run it as [`query_statement`] does.
///
/// # Errors
/// Returns the driver error from preparing or executing.
pub async fn query_text(
    client: &Client,
    text: &str,
    params: &[Value],
) -> Result<Box<dyn Cursor>, TransactorError> {
    let statement = client.prepare(text).await?;
    query_statement(client, &statement, params).await
}

fn row_values(row: &Row) -> Result<Vec<Value>, TransactorError> {
    (0..row.columns().len())
        .map(|idx| extract_value(row, idx))
        .collect()
}

/// Extracts a [`Value`] from a `tokio_postgres` row at the given index.
///
/// # Errors
/// Returns `TransactorError::PostgresError` if the column cannot be decoded.
pub fn extract_value(row: &Row, idx: usize) -> Result<Value, TransactorError> {
    let value = match row.columns()[idx].type_().name() {
        "int2" => row.try_get::<_, Option<i16>>(idx)?.map(|v| Value::Int(i64::from(v))),
        "int4" => row.try_get::<_, Option<i32>>(idx)?.map(|v| Value::Int(i64::from(v))),
        "int8" => row.try_get::<_, Option<i64>>(idx)?.map(Value::Int),
        "float4" => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|v| Value::Float(f64::from(v))),
        "float8" => row.try_get::<_, Option<f64>>(idx)?.map(Value::Float),
        "bool" => row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool),
        "timestamp" => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(Value::Timestamp),
        "timestamptz" => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(|v| Value::Timestamp(v.naive_utc())),
        "date" => row
            .try_get::<_, Option<NaiveDate>>(idx)?
            .map(|v| Value::Timestamp(v.and_time(chrono::NaiveTime::MIN))),
        "json" | "jsonb" => row.try_get::<_, Option<JsonValue>>(idx)?.map(Value::Json),
        "bytea" => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(Value::Blob),
        "numeric" => row
            .try_get::<_, Option<PgNumeric>>(idx)?
            .map(PgNumeric::into_value),
        // text, varchar, bpchar, name and anything else with a textual representation
        _ => row.try_get::<_, Option<String>>(idx)?.map(Value::Text),
    };
    Ok(value.unwrap_or(Value::Null))
}

/// A `numeric` column in decimal text form.
///
/// Whole numbers that fit are read as [`Value::Int`] (e.g. `SUM` over a `bigint` column);
/// anything else stays exact as [`Value::Text`].
#[derive(Debug, Clone, PartialEq)]
struct PgNumeric {
    text: String,
    scale: u16,
}

impl PgNumeric {
    fn into_value(self) -> Value {
        if self.scale == 0
            && let Ok(int) = self.text.parse::<i64>()
        {
            return Value::Int(int);
        }
        Value::Text(self.text)
    }
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

fn read_u16(raw: &[u8], at: usize) -> Result<u16, Box<dyn Error + Sync + Send>> {
    raw.get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| "truncated numeric value".into())
}

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        let ndigits = usize::from(read_u16(raw, 0)?);
        let weight = i16::from_be_bytes(read_u16(raw, 2)?.to_be_bytes());
        let sign = read_u16(raw, 4)?;
        let scale = read_u16(raw, 6)?;

        let special = match sign {
            NUMERIC_NAN => Some("NaN"),
            NUMERIC_PINF => Some("Infinity"),
            NUMERIC_NINF => Some("-Infinity"),
            _ => None,
        };
        if let Some(text) = special {
            return Ok(Self {
                text: text.to_string(),
                scale,
            });
        }

        // base-10000 digit groups, the first one at 10000^weight
        let digits = (0..ndigits)
            .map(|i| read_u16(raw, 8 + 2 * i))
            .collect::<Result<Vec<_>, _>>()?;
        let group = |i: i32| -> u16 {
            usize::try_from(i)
                .ok()
                .and_then(|i| digits.get(i).copied())
                .unwrap_or(0)
        };

        let mut text = String::new();
        if sign == NUMERIC_NEG {
            text.push('-');
        }
        if weight < 0 {
            text.push('0');
        } else {
            for i in 0..=i32::from(weight) {
                if i == 0 {
                    write!(text, "{}", group(i))?;
                } else {
                    write!(text, "{:04}", group(i))?;
                }
            }
        }

        if scale > 0 {
            let mut fraction = String::new();
            let mut i = i32::from(weight) + 1;
            while fraction.len() < usize::from(scale) {
                write!(fraction, "{:04}", group(i))?;
                i += 1;
            }
            fraction.truncate(usize::from(scale));
            text.push('.');
            text.push_str(&fraction);
        }

        Ok(Self { text, scale })
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(weight: i16, sign: u16, scale: u16, digits: &[u16]) -> Vec<u8> {
        let mut raw = Vec::new();
        let count = u16::try_from(digits.len()).unwrap();
        raw.extend_from_slice(&count.to_be_bytes());
        raw.extend_from_slice(&weight.to_be_bytes());
        raw.extend_from_slice(&sign.to_be_bytes());
        raw.extend_from_slice(&scale.to_be_bytes());
        for digit in digits {
            raw.extend_from_slice(&digit.to_be_bytes());
        }
        raw
    }

    fn decode(raw: &[u8]) -> Value {
        PgNumeric::from_sql(&Type::NUMERIC, raw).unwrap().into_value()
    }

    #[test]
    fn whole_sums_read_as_integers() {
        assert_eq!(decode(&numeric(1, 0, 0, &[1234, 5678])), Value::Int(12_345_678));
        assert_eq!(decode(&numeric(0, 0, 0, &[])), Value::Int(0));
        assert_eq!(decode(&numeric(2, NUMERIC_NEG, 0, &[7])), Value::Int(-700_000_000));
    }

    #[test]
    fn fractions_stay_exact_text() {
        assert_eq!(decode(&numeric(-1, 0, 2, &[500])), Value::Text("0.05".into()));
        assert_eq!(
            decode(&numeric(0, NUMERIC_NEG, 1, &[1, 5000])),
            Value::Text("-1.5".into())
        );
        assert_eq!(decode(&numeric(0, NUMERIC_NAN, 0, &[])), Value::Text("NaN".into()));
    }

    #[test]
    fn truncated_numeric_is_an_error() {
        assert!(PgNumeric::from_sql(&Type::NUMERIC, &[0, 1, 0]).is_err());
    }
}
