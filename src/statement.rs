use crate::error::TransactorError;
use crate::types::Value;

/// SQL text with `?` placeholders and the values bound to them, in order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    pub text: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(text: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            text: text.into(),
            params,
        }
    }

    /// A statement without parameters.
    pub fn raw(text: impl Into<String>) -> Self {
        Self::new(text, Vec::new())
    }
}

/// Anything that can produce a [`Statement`].
///
/// Builders report malformed state as `TransactorError::BuildError` instead of
/// emitting partial SQL.
pub trait Sqlizer: Send + Sync {
    /// # Errors
    /// Returns `TransactorError::BuildError` when the builder is incomplete or inconsistent.
    fn to_statement(&self) -> Result<Statement, TransactorError>;
}

impl Sqlizer for Statement {
    fn to_statement(&self) -> Result<Statement, TransactorError> {
        Ok(self.clone())
    }
}

impl<S: Sqlizer + ?Sized> Sqlizer for &S {
    fn to_statement(&self) -> Result<Statement, TransactorError> {
        (**self).to_statement()
    }
}

impl<S: Sqlizer + ?Sized> Sqlizer for Box<S> {
    fn to_statement(&self) -> Result<Statement, TransactorError> {
        (**self).to_statement()
    }
}

/// Build a parameter list from heterogeneous values.
///
/// ```rust
/// use sql_transactor::{params, Value};
///
/// let p = params![1_i64, "two", None::<bool>];
/// assert_eq!(p, vec![Value::Int(1), Value::Text("two".into()), Value::Null]);
/// ```
#[macro_export]
macro_rules! params {
    () => { ::std::vec::Vec::<$crate::Value>::new() };
    ($($value:expr),+ $(,)?) => {
        vec![$($crate::Value::from($value)),+]
    };
}
