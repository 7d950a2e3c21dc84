//! Transient-fault classification for database errors.
//!
//! Used by [`transient_only`] to stop retrying errors that will not clear up
//! by themselves (syntax errors, constraint violations).

use std::io;

use super::error::DbError;
use crate::retry::RetryIf;

/// High-level classification of a database error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Command or pool acquisition timed out.
    Timeout,
    /// Database asked us to back off (SQLite BUSY / LOCKED).
    Busy,
    /// Connection-level failure (reset, refused, broken pipe, I/O).
    Connection,
    /// Anything else: syntax errors, constraint violations, decode errors.
    Other,
}

impl ErrorKind {
    pub fn is_transient(self) -> bool {
        !matches!(self, ErrorKind::Other)
    }
}

/// Classify an I/O error seen on a database connection.
pub fn classify_io_error(e: &io::Error) -> ErrorKind {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ErrorKind::Timeout,
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof
        | io::ErrorKind::Interrupted => ErrorKind::Connection,
        _ => ErrorKind::Other,
    }
}

/// Classify an `sqlx` error.
pub fn classify_sqlx_error(e: &sqlx::Error) -> ErrorKind {
    match e {
        sqlx::Error::Io(io) => classify_io_error(io),
        sqlx::Error::PoolTimedOut => ErrorKind::Timeout,
        sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => ErrorKind::Connection,
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .map(classify_sqlite_code)
            .unwrap_or(ErrorKind::Other),
        _ => ErrorKind::Other,
    }
}

/// Classify a (possibly extended) SQLite result code.
pub fn classify_sqlite_code(code: i32) -> ErrorKind {
    // Extended codes carry the primary code in the low byte.
    match code & 0xff {
        5 | 6 => ErrorKind::Busy,
        10 => ErrorKind::Connection,
        _ => ErrorKind::Other,
    }
}

/// Classify an adapter error.
pub fn classify(e: &DbError) -> ErrorKind {
    match e {
        DbError::Sqlx(inner) => classify_sqlx_error(inner),
        DbError::Timeout(_) => ErrorKind::Timeout,
        _ => ErrorKind::Other,
    }
}

/// `true` for errors that may clear up on their own.
pub fn is_transient(e: &DbError) -> bool {
    classify(e).is_transient()
}

/// Classifier that retries only transient database errors.
pub fn transient_only() -> RetryIf<fn(&DbError) -> bool> {
    RetryIf::new(is_transient as fn(&DbError) -> bool)
}
