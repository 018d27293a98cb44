use std::collections::HashSet;

use crate::error::TransactorError;
use crate::statement::{Sqlizer, Statement};
use crate::types::Value;

use super::{Insert, Update, require_table};

/// `COALESCE(SUM(CASE WHEN <condition> THEN COALESCE(<target>,0) ELSE 0 END), 0)`
///
/// Usable as a select column; the condition's parameters are carried along.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseSum {
    pub target: String,
    pub condition: String,
    pub params: Vec<Value>,
}

impl CaseSum {
    pub fn new(target: impl Into<String>, condition: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            target: target.into(),
            condition: condition.into(),
            params,
        }
    }
}

impl Sqlizer for CaseSum {
    fn to_statement(&self) -> Result<Statement, TransactorError> {
        Ok(Statement {
            text: format!(
                "COALESCE(SUM(CASE WHEN {} THEN COALESCE({},0) ELSE 0 END), 0)",
                self.condition, self.target
            ),
            params: self.params.clone(),
        })
    }
}

/// Insert-or-update keyed on a conflict target.
///
/// ```rust
/// use sql_transactor::prelude::*;
///
/// let stmt = Upsert::new("kv")
///     .key("id", 1_i64)
///     .set("data", "x")
///     .to_statement()
///     .unwrap();
/// assert_eq!(
///     stmt.text,
///     "INSERT INTO kv (id,data) VALUES (?,?) ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data"
/// );
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Upsert {
    into: String,
    keys: Vec<(String, Value)>,
    values: Vec<(String, Value)>,
    update: Update,
}

impl Upsert {
    pub fn new(into: impl Into<String>) -> Self {
        Self {
            into: into.into(),
            keys: Vec::new(),
            values: Vec::new(),
            update: Update::new("_"),
        }
    }

    /// Add a conflict-target column.
    #[must_use]
    pub fn key(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keys.push((column.into(), value.into()));
        self
    }

    /// Add a column that is inserted, and overwritten on conflict.
    #[must_use]
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.push((column.into(), value.into()));
        self
    }

    #[must_use]
    pub fn set_map<I, K, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        values
            .into_iter()
            .fold(self, |builder, (column, value)| builder.set(column, value))
    }

    /// Restrict the conflict update, e.g. `where_("kv.version < EXCLUDED.version", vec![])`.
    #[must_use]
    pub fn where_(mut self, predicate: impl Into<String>, params: Vec<Value>) -> Self {
        self.update = self.update.where_(predicate, params);
        self
    }
}

impl Sqlizer for Upsert {
    fn to_statement(&self) -> Result<Statement, TransactorError> {
        require_table(&self.into, "upsert")?;
        if self.keys.is_empty() {
            return Err(TransactorError::BuildError(
                "upsert statements must have at least one key".into(),
            ));
        }
        if self.values.is_empty() {
            return Err(TransactorError::BuildError(
                "upsert statements must have at least one value".into(),
            ));
        }

        let mut seen = HashSet::new();
        let mut update = self.update.clone();
        for (column, _) in self.keys.iter().chain(&self.values) {
            if !seen.insert(column.as_str()) {
                return Err(TransactorError::BuildError(format!(
                    "duplicate column in keys and values: {column}"
                )));
            }
        }
        for (column, _) in &self.values {
            update = update.set_expr(column.clone(), format!("EXCLUDED.{column}"), Vec::new());
        }

        let tail = update.assignments()?;
        let key_list: Vec<&str> = self.keys.iter().map(|(c, _)| c.as_str()).collect();
        let all = self.keys.iter().chain(&self.values);

        Insert::new(self.into.clone())
            .columns(all.clone().map(|(column, _)| column.clone()))
            .values(all.map(|(_, value)| value.clone()))
            .suffix(
                format!("ON CONFLICT ({}) DO UPDATE {}", key_list.join(","), tail.text),
                tail.params,
            )
            .to_statement()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;

    #[test]
    fn case_sum_formats() {
        let stmt = CaseSum::new("amount", "kind = ?", params!["credit"])
            .to_statement()
            .unwrap();
        assert_eq!(
            stmt.text,
            "COALESCE(SUM(CASE WHEN kind = ? THEN COALESCE(amount,0) ELSE 0 END), 0)"
        );
        assert_eq!(stmt.params, params!["credit"]);
    }

    #[test]
    fn upsert_with_where_appends_params_last() {
        let stmt = Upsert::new("kv")
            .key("id", 1_i64)
            .set("data", "x")
            .set("version", 2_i64)
            .where_("kv.version < ?", params![2_i64])
            .to_statement()
            .unwrap();
        assert_eq!(
            stmt.text,
            "INSERT INTO kv (id,data,version) VALUES (?,?,?) ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data, version = EXCLUDED.version WHERE kv.version < ?"
        );
        assert_eq!(stmt.params, params![1_i64, "x", 2_i64, 2_i64]);
    }

    #[test]
    fn upsert_validation() {
        let no_table = Upsert::new("").key("id", 1_i64).set("a", 1_i64);
        let no_key = Upsert::new("t").set("a", 1_i64);
        let no_value = Upsert::new("t").key("id", 1_i64);
        let duplicate = Upsert::new("t").key("id", 1_i64).set("id", 2_i64);
        for builder in [no_table, no_key, no_value, duplicate] {
            assert!(matches!(
                builder.to_statement(),
                Err(TransactorError::BuildError(_))
            ));
        }
    }
}
