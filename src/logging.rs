//! Statement logging hooks.
//!
//! A [`QueryLogger`] sees the final statement text (after placeholder rewriting) and its
//! parameters right before they are sent. It cannot fail or alter execution.

use crate::types::Value;

pub trait QueryLogger: Send + Sync {
    fn log_query(&self, statement: &str, params: &[Value]);
}

/// Emits every statement as a `tracing` debug event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingQueryLogger;

impl QueryLogger for TracingQueryLogger {
    fn log_query(&self, statement: &str, params: &[Value]) {
        tracing::debug!(statement, ?params, "query");
    }
}

/// Hands formatted lines to a closure: `QUERY <statement>` followed by one `  $<n> <value>`
/// line per parameter, numbered from 1.
///
/// ```rust
/// use std::sync::{Arc, Mutex};
/// use sql_transactor::logging::{CallbackLogger, QueryLogger};
/// use sql_transactor::Value;
///
/// let lines = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&lines);
/// let logger = CallbackLogger::new(move |line: &str| sink.lock().unwrap().push(line.to_string()));
/// logger.log_query("SELECT ?", &[Value::Int(1)]);
/// assert_eq!(*lines.lock().unwrap(), ["QUERY SELECT ?", "  $1 Int(1)"]);
/// ```
pub struct CallbackLogger<F> {
    sink: F,
}

impl<F> CallbackLogger<F>
where
    F: Fn(&str) + Send + Sync,
{
    pub fn new(sink: F) -> Self {
        Self { sink }
    }
}

impl<F> QueryLogger for CallbackLogger<F>
where
    F: Fn(&str) + Send + Sync,
{
    fn log_query(&self, statement: &str, params: &[Value]) {
        (self.sink)(&format!("QUERY {statement}"));
        for (idx, param) in params.iter().enumerate() {
            (self.sink)(&format!("  ${} {}", idx + 1, describe_param(param)));
        }
    }
}

/// Debug form of a parameter, except that JSON-object blobs are shown as text.
fn describe_param(param: &Value) -> String {
    if let Value::Blob(bytes) = param
        && bytes.len() > 1
        && bytes.first() == Some(&b'{')
        && bytes.last() == Some(&b'}')
        && let Ok(text) = std::str::from_utf8(bytes)
    {
        return text.to_string();
    }
    format!("{param:?}")
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn json_blobs_print_as_text() {
        let lines = Mutex::new(Vec::new());
        let logger = CallbackLogger::new(|line: &str| lines.lock().unwrap().push(line.to_string()));
        logger.log_query(
            "INSERT INTO t (data, raw) VALUES ($1, $2)",
            &[
                Value::Blob(br#"{"a":1}"#.to_vec()),
                Value::Blob(vec![0, 1]),
            ],
        );
        let lines = lines.into_inner().unwrap();
        assert_eq!(lines[1], r#"  $1 {"a":1}"#);
        assert_eq!(lines[2], "  $2 Blob([0, 1])");
    }
}
