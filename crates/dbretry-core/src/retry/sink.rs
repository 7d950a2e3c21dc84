//! Diagnostic sinks: where the executor reports failed attempts.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// One failed attempt, as seen by the executor.
#[derive(Clone, Copy)]
pub struct AttemptFailure<'a> {
    /// Operation identifier supplied by the caller (e.g. `"get_connection"`).
    pub context: &'a str,
    /// 0-based attempt index.
    pub attempt: u32,
    pub error: &'a dyn fmt::Display,
}

impl fmt::Debug for AttemptFailure<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttemptFailure")
            .field("context", &self.context)
            .field("attempt", &self.attempt)
            .field("error", &format_args!("{}", self.error))
            .finish()
    }
}

/// Receives one record per failed attempt.
pub trait DiagnosticSink {
    fn attempt_failed(&self, failure: &AttemptFailure<'_>);
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for &S {
    fn attempt_failed(&self, failure: &AttemptFailure<'_>) {
        (**self).attempt_failed(failure)
    }
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for Arc<S> {
    fn attempt_failed(&self, failure: &AttemptFailure<'_>) {
        (**self).attempt_failed(failure)
    }
}

/// Logs failed attempts through `tracing` at error level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn attempt_failed(&self, failure: &AttemptFailure<'_>) {
        tracing::error!(
            context = failure.context,
            attempt = failure.attempt,
            error = %failure.error,
            "operation attempt failed"
        );
    }
}

/// Owned copy of an [`AttemptFailure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub context: String,
    pub attempt: u32,
    pub error: String,
}

/// Keeps failed attempts in memory; lets tests inspect what would have been logged.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<FailureRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<FailureRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiagnosticSink for MemorySink {
    fn attempt_failed(&self, failure: &AttemptFailure<'_>) {
        let record = FailureRecord {
            context: failure.context.to_string(),
            attempt: failure.attempt,
            error: failure.error.to_string(),
        };
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}
