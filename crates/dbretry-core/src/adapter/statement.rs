//! Statement text, bound parameters, and row-count expectations.

use std::fmt;
use std::time::Duration;

/// A parameter value bound to a statement, or a value read back from a row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Integer(v) => write!(f, "{}", v),
            SqlValue::Real(v) => write!(f, "{}", v),
            SqlValue::Text(v) => write!(f, "{}", v),
            SqlValue::Blob(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Blob(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// SQL text plus positional parameters and an optional timeout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    pub text: String,
    pub params: Vec<SqlValue>,
    pub timeout: Option<Duration>,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Vec::new(),
            timeout: None,
        }
    }

    /// Append a positional parameter.
    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Text with parameters, as written to debug logs.
    pub fn to_log_line(&self) -> String {
        if self.params.is_empty() {
            return self.text.clone();
        }
        let params: Vec<String> = self
            .params
            .iter()
            .enumerate()
            .map(|(i, p)| format!("?{} = {}", i + 1, p))
            .collect();
        format!("{}; {}", self.text, params.join(", "))
    }
}

/// Rows a queued statement is expected to affect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expectation {
    /// No check for this statement.
    #[default]
    None,
    RowCount(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_appends_in_order() {
        let s = Statement::new("INSERT INTO t (a, b, c) VALUES (?, ?, ?)")
            .bind(1i64)
            .bind("two")
            .bind(None::<f64>);
        assert_eq!(
            s.params,
            vec![
                SqlValue::Integer(1),
                SqlValue::Text("two".to_string()),
                SqlValue::Null
            ]
        );
    }

    #[test]
    fn log_line_includes_parameters() {
        let s = Statement::new("UPDATE t SET a = ? WHERE id = ?")
            .bind(2.5)
            .bind(7i64);
        assert_eq!(s.to_log_line(), "UPDATE t SET a = ? WHERE id = ?; ?1 = 2.5, ?2 = 7");
        assert_eq!(Statement::new("SELECT 1").to_log_line(), "SELECT 1");
    }

    #[test]
    fn blob_display_is_summarised() {
        assert_eq!(SqlValue::Blob(vec![0; 16]).to_string(), "<16 bytes>");
        assert_eq!(SqlValue::Null.to_string(), "NULL");
    }
}
