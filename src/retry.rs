use std::fmt;
use std::sync::Arc;

use crate::error::{SERIALIZATION_FAILURE, TransactorError};

/// Decides whether a failed transaction callback should run again from a fresh transaction.
#[derive(Clone)]
pub struct RetryPolicy {
    should_retry: Arc<dyn Fn(&TransactorError) -> bool + Send + Sync>,
}

impl RetryPolicy {
    pub fn new<F>(should_retry: F) -> Self
    where
        F: Fn(&TransactorError) -> bool + Send + Sync + 'static,
    {
        Self {
            should_retry: Arc::new(should_retry),
        }
    }

    /// Never retry callback errors.
    #[must_use]
    pub fn never() -> Self {
        Self::new(|_| false)
    }

    #[must_use]
    pub fn should_retry(&self, err: &TransactorError) -> bool {
        (self.should_retry)(err)
    }
}

/// Retries serialization failures (SQLSTATE 40001) only.
impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(|err| err.sqlstate() == Some(SERIALIZATION_FAILURE))
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_retries_serialization_failures_only() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(&TransactorError::driver(Some("40001"), "conflict")));
        assert!(!policy.should_retry(&TransactorError::driver(Some("23505"), "duplicate")));
        assert!(!policy.should_retry(&TransactorError::Other("boom".into())));
    }

    #[test]
    fn wrapped_errors_are_classified() {
        let err = TransactorError::StatementError {
            statement: "UPDATE t SET a = 1".into(),
            source: Box::new(TransactorError::driver(Some("40001"), "conflict")),
        };
        assert!(RetryPolicy::default().should_retry(&err));
        assert!(!RetryPolicy::never().should_retry(&err));
    }
}
