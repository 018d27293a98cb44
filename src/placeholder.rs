use std::borrow::Cow;

use crate::error::TransactorError;

/// Rewrites builder-produced `?` placeholders into a driver's native syntax.
pub trait PlaceholderFormat: Send + Sync {
    /// Rewrite the placeholders in `statement`.
    ///
    /// # Errors
    /// Returns `TransactorError::BuildError` if the statement cannot be rewritten.
    fn replace_placeholders(&self, statement: &str) -> Result<String, TransactorError>;
}

/// Placeholder styles understood by the bundled rewriter.
///
/// ```rust
/// use sql_transactor::placeholder::{Placeholder, PlaceholderFormat};
///
/// let sql = Placeholder::Dollar
///     .replace_placeholders("SELECT a FROM b WHERE c = ? AND d = ?")
///     .unwrap();
/// assert_eq!(sql, "SELECT a FROM b WHERE c = $1 AND d = $2");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placeholder {
    /// Leave `?` untouched (SQLite, MySQL).
    #[default]
    Question,
    /// PostgreSQL-style `$1`, `$2`, ...
    Dollar,
    /// Oracle-style `:1`, `:2`, ...
    Colon,
    /// SQL Server-style `@p1`, `@p2`, ...
    AtP,
}

impl Placeholder {
    fn prefix(self) -> Option<&'static str> {
        match self {
            Placeholder::Question => None,
            Placeholder::Dollar => Some("$"),
            Placeholder::Colon => Some(":"),
            Placeholder::AtP => Some("@p"),
        }
    }
}

impl PlaceholderFormat for Placeholder {
    fn replace_placeholders(&self, statement: &str) -> Result<String, TransactorError> {
        match self.prefix() {
            None => Ok(statement.to_string()),
            Some(prefix) => Ok(number_placeholders(statement, prefix).into_owned()),
        }
    }
}

#[derive(Clone)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment(u32),
    DollarQuoted(String),
}

/// Number every bare `?` with `prefix`, treating `??` as an escaped literal `?`.
///
/// Quoted strings, identifiers, comments and dollar-quoted bodies are copied verbatim.
/// Returns a borrowed `Cow` when there is nothing to rewrite.
#[must_use]
pub fn number_placeholders<'a>(sql: &'a str, prefix: &str) -> Cow<'a, str> {
    let bytes = sql.as_bytes();
    let mut out: Option<String> = None;
    let mut copied = 0;
    let mut next_param = 1;
    let mut state = State::Normal;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                b'-' if bytes.get(idx + 1) == Some(&b'-') => {
                    state = State::LineComment;
                    idx += 1;
                }
                b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                b'$' => {
                    if let Some((tag, end)) = dollar_quote_tag(bytes, idx) {
                        state = State::DollarQuoted(tag);
                        idx = end;
                    }
                }
                b'?' => {
                    let buf = out.get_or_insert_with(|| String::with_capacity(sql.len() + 8));
                    buf.push_str(&sql[copied..idx]);
                    if bytes.get(idx + 1) == Some(&b'?') {
                        buf.push('?');
                        idx += 1;
                    } else {
                        buf.push_str(prefix);
                        buf.push_str(&next_param.to_string());
                        next_param += 1;
                    }
                    copied = idx + 1;
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if b == b'/' && bytes.get(idx + 1) == Some(&b'*') {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if b == b'*' && bytes.get(idx + 1) == Some(&b'/') {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
            State::DollarQuoted(ref tag) => {
                if b == b'$' && closes_dollar_quote(bytes, idx, tag) {
                    idx += tag.len() + 1;
                    state = State::Normal;
                }
            }
        }
        idx += 1;
    }

    match out {
        Some(mut buf) => {
            buf.push_str(&sql[copied..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(sql),
    }
}

/// Returns the tag of a `$tag$` opener at `start` and the index of its closing `$`.
fn dollar_quote_tag(bytes: &[u8], start: usize) -> Option<(String, usize)> {
    let mut idx = start + 1;
    while idx < bytes.len() && bytes[idx] != b'$' {
        let b = bytes[idx];
        if !(b.is_ascii_alphanumeric() || b == b'_') || b.is_ascii_digit() && idx == start + 1 {
            return None;
        }
        idx += 1;
    }
    if idx < bytes.len() {
        let tag = std::str::from_utf8(&bytes[start + 1..idx]).ok()?;
        Some((tag.to_string(), idx))
    } else {
        None
    }
}

fn closes_dollar_quote(bytes: &[u8], idx: usize, tag: &str) -> bool {
    let end = idx + 1 + tag.len();
    bytes.get(idx + 1..end) == Some(tag.as_bytes()) && bytes.get(end) == Some(&b'$')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_in_order() {
        let res = Placeholder::Dollar
            .replace_placeholders("INSERT INTO t (a,b) VALUES (?,?)")
            .unwrap();
        assert_eq!(res, "INSERT INTO t (a,b) VALUES ($1,$2)");
    }

    #[test]
    fn question_is_untouched() {
        let sql = "SELECT * FROM t WHERE a = ?";
        assert_eq!(Placeholder::Question.replace_placeholders(sql).unwrap(), sql);
    }

    #[test]
    fn double_question_escapes() {
        let res = number_placeholders("SELECT '{}'::jsonb ?? 'k', ?", "$");
        assert_eq!(res, "SELECT '{}'::jsonb ? 'k', $1");
    }

    #[test]
    fn skips_literals_and_comments() {
        let sql = "select '?', \"a?\" -- ?\n/* ? /* ? */ */ from t where a = ?";
        let res = number_placeholders(sql, ":");
        assert_eq!(
            res,
            "select '?', \"a?\" -- ?\n/* ? /* ? */ */ from t where a = :1"
        );
    }

    #[test]
    fn skips_dollar_quoted_bodies() {
        let sql = "$fn$ select ? $fn$ where a = ? and b = $1";
        let res = number_placeholders(sql, "@p");
        assert_eq!(res, "$fn$ select ? $fn$ where a = @p1 and b = $1");
    }

    #[test]
    fn keeps_multibyte_text_intact() {
        let res = number_placeholders("SELECT 'café' || ?", "$");
        assert_eq!(res, "SELECT 'café' || $1");
    }

    #[test]
    fn borrowed_when_nothing_to_do() {
        let res = number_placeholders("SELECT 1", "$");
        assert!(matches!(res, Cow::Borrowed(_)));
    }
}
