use crate::error::TransactorError;
use crate::statement::{Sqlizer, Statement};
use crate::types::Value;

use super::{placeholders, require_table};

/// `INSERT INTO table (cols) VALUES (...), (...) [suffix]`
///
/// ```rust
/// use sql_transactor::prelude::*;
///
/// let stmt = Insert::new("users")
///     .columns(["id", "name"])
///     .values([Value::from(1_i64), Value::from("a")])
///     .to_statement()
///     .unwrap();
/// assert_eq!(stmt.text, "INSERT INTO users (id,name) VALUES (?,?)");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Insert {
    table: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    suffix: Option<Statement>,
}

impl Insert {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Add one row of values.
    #[must_use]
    pub fn values<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.rows.push(values.into_iter().map(Into::into).collect());
        self
    }

    /// Trailing SQL such as `RETURNING id` or an `ON CONFLICT` clause.
    #[must_use]
    pub fn suffix(mut self, text: impl Into<String>, params: Vec<Value>) -> Self {
        self.suffix = Some(Statement::new(text, params));
        self
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }
}

impl Sqlizer for Insert {
    fn to_statement(&self) -> Result<Statement, TransactorError> {
        require_table(&self.table, "insert")?;
        if self.rows.is_empty() {
            return Err(TransactorError::BuildError(
                "insert statements must have at least one set of values".into(),
            ));
        }

        let width = self.rows[0].len();
        if width == 0 {
            return Err(TransactorError::BuildError(
                "insert statements must have at least one value per row".into(),
            ));
        }
        if !self.columns.is_empty() && self.columns.len() != width {
            return Err(TransactorError::BuildError(format!(
                "insert has {} columns but {width} values",
                self.columns.len()
            )));
        }

        let mut text = format!("INSERT INTO {}", self.table);
        if !self.columns.is_empty() {
            text.push_str(" (");
            text.push_str(&self.columns.join(","));
            text.push(')');
        }
        text.push_str(" VALUES ");

        let mut params = Vec::with_capacity(width * self.rows.len());
        for (idx, row) in self.rows.iter().enumerate() {
            if row.len() != width {
                return Err(TransactorError::BuildError(format!(
                    "insert row {idx} has {} values, expected {width}",
                    row.len()
                )));
            }
            if idx > 0 {
                text.push(',');
            }
            text.push('(');
            text.push_str(&placeholders(width));
            text.push(')');
            params.extend(row.iter().cloned());
        }

        if let Some(suffix) = &self.suffix {
            text.push(' ');
            text.push_str(&suffix.text);
            params.extend(suffix.params.iter().cloned());
        }

        Ok(Statement { text, params })
    }
}
