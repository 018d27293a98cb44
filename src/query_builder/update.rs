use crate::error::TransactorError;
use crate::statement::{Sqlizer, Statement};
use crate::types::Value;

use super::{Predicate, push_where, require_table};

#[derive(Debug, Clone, PartialEq)]
enum Assignment {
    Value(Value),
    Expr(Statement),
}

/// `UPDATE table SET ... [WHERE ...]`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    table: String,
    sets: Vec<(String, Assignment)>,
    predicates: Vec<Predicate>,
}

impl Update {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.sets
            .push((column.into(), Assignment::Value(value.into())));
        self
    }

    /// Assign a raw SQL expression, e.g. `set_expr("n", "n + ?", params![1])`.
    #[must_use]
    pub fn set_expr(
        mut self,
        column: impl Into<String>,
        expr: impl Into<String>,
        params: Vec<Value>,
    ) -> Self {
        self.sets.push((
            column.into(),
            Assignment::Expr(Statement::new(expr, params)),
        ));
        self
    }

    /// Add a predicate; multiple predicates are joined with `AND`.
    #[must_use]
    pub fn where_(mut self, predicate: impl Into<String>, params: Vec<Value>) -> Self {
        self.predicates.push(Predicate {
            text: predicate.into(),
            params,
        });
        self
    }

    /// The `SET ... [WHERE ...]` tail without the `UPDATE table` head.
    pub(crate) fn assignments(&self) -> Result<Statement, TransactorError> {
        if self.sets.is_empty() {
            return Err(TransactorError::BuildError(
                "update statements must have at least one Set clause".into(),
            ));
        }

        let mut text = String::from("SET ");
        let mut params = Vec::new();
        for (idx, (column, assignment)) in self.sets.iter().enumerate() {
            if idx > 0 {
                text.push_str(", ");
            }
            text.push_str(column);
            text.push_str(" = ");
            match assignment {
                Assignment::Value(value) => {
                    text.push('?');
                    params.push(value.clone());
                }
                Assignment::Expr(expr) => {
                    text.push_str(&expr.text);
                    params.extend(expr.params.iter().cloned());
                }
            }
        }
        push_where(&mut text, &mut params, &self.predicates);
        Ok(Statement { text, params })
    }
}

impl Sqlizer for Update {
    fn to_statement(&self) -> Result<Statement, TransactorError> {
        require_table(&self.table, "update")?;
        let tail = self.assignments()?;
        Ok(Statement {
            text: format!("UPDATE {} {}", self.table, tail.text),
            params: tail.params,
        })
    }
}

/// `DELETE FROM table [WHERE ...]`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delete {
    table: String,
    predicates: Vec<Predicate>,
}

impl Delete {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            predicates: Vec::new(),
        }
    }

    #[must_use]
    pub fn where_(mut self, predicate: impl Into<String>, params: Vec<Value>) -> Self {
        self.predicates.push(Predicate {
            text: predicate.into(),
            params,
        });
        self
    }
}

impl Sqlizer for Delete {
    fn to_statement(&self) -> Result<Statement, TransactorError> {
        require_table(&self.table, "delete")?;
        let mut text = format!("DELETE FROM {}", self.table);
        let mut params = Vec::new();
        push_where(&mut text, &mut params, &self.predicates);
        Ok(Statement { text, params })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;

    #[test]
    fn update_orders_set_then_where_params() {
        let stmt = Update::new("t")
            .set("a", 1_i64)
            .set_expr("n", "n + ?", params![2_i64])
            .where_("id = ?", params![3_i64])
            .where_("deleted = ?", params![false])
            .to_statement()
            .unwrap();
        assert_eq!(
            stmt.text,
            "UPDATE t SET a = ?, n = n + ? WHERE (id = ?) AND (deleted = ?)"
        );
        assert_eq!(stmt.params, params![1_i64, 2_i64, 3_i64, false]);
    }

    #[test]
    fn update_without_sets_fails() {
        assert!(matches!(
            Update::new("t").to_statement(),
            Err(TransactorError::BuildError(_))
        ));
    }

    #[test]
    fn delete_single_predicate() {
        let stmt = Delete::new("t")
            .where_("id = ?", params![1_i64])
            .to_statement()
            .unwrap();
        assert_eq!(stmt.text, "DELETE FROM t WHERE id = ?");
    }
}
