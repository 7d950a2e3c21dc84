//! Error type shared by the adapter layer.

use std::time::Duration;

/// Error returned by drivers, commands, and batchers.
///
/// The retry executor hands these back unchanged, so the variant a caller
/// sees is whatever the last attempt produced.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Error reported by the underlying `sqlx` driver.
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    /// The command did not finish within its configured timeout.
    #[error("command timed out after {0:?}")]
    Timeout(Duration),
    /// The command was cancelled while executing.
    #[error("command cancelled")]
    Cancelled,
    /// Neither `connection_string` nor `connection_string_name` is set.
    #[error("could not find connection string setting (set `connection_string` or `connection_string_name`)")]
    MissingConnectionString,
    /// `connection_string_name` does not match any `[connection_strings]` entry.
    #[error("no connection string named `{0}` in [connection_strings]")]
    UnknownConnectionName(String),
    /// Batch row count did not match the expectations of the queued statements.
    #[error("batch update returned unexpected row count; actual row count: {actual}; expected: {expected}")]
    UnexpectedRowCount { expected: u64, actual: u64 },
}
