//! Small statement builders producing `?`-placeholder SQL.
//!
//! Builders are plain values implementing [`Sqlizer`](crate::Sqlizer); commanders rewrite the
//! placeholders for the target driver before execution.

use crate::error::TransactorError;
use crate::types::Value;

mod helpers;
mod insert;
mod update;

pub use helpers::{CaseSum, Upsert};
pub use insert::Insert;
pub use update::{Delete, Update};

/// A `WHERE` fragment with its own parameters.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Predicate {
    pub(crate) text: String,
    pub(crate) params: Vec<Value>,
}

/// Append `WHERE p1 AND p2 ...` to `sql`, collecting predicate parameters.
pub(crate) fn push_where(sql: &mut String, params: &mut Vec<Value>, predicates: &[Predicate]) {
    for (idx, predicate) in predicates.iter().enumerate() {
        sql.push_str(if idx == 0 { " WHERE " } else { " AND " });
        if predicates.len() > 1 {
            sql.push('(');
            sql.push_str(&predicate.text);
            sql.push(')');
        } else {
            sql.push_str(&predicate.text);
        }
        params.extend(predicate.params.iter().cloned());
    }
}

pub(crate) fn require_table(table: &str, kind: &str) -> Result<(), TransactorError> {
    if table.trim().is_empty() {
        Err(TransactorError::BuildError(format!(
            "{kind} statements must specify a table"
        )))
    } else {
        Ok(())
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(",")
}
