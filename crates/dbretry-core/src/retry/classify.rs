//! Error classification hooks for retry policies.
//!
//! Built-in policies retry everything by default. A classifier lets callers
//! opt in to stopping early on errors that will never go away.

use std::fmt;
use std::sync::Arc;

/// Decides whether an error is worth another attempt.
pub trait ErrorClassifier<E: ?Sized> {
    fn is_retryable(&self, error: &E) -> bool;
}

/// Treats every error as retryable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlwaysRetry;

impl<E: ?Sized> ErrorClassifier<E> for AlwaysRetry {
    fn is_retryable(&self, _error: &E) -> bool {
        true
    }
}

/// Retries only errors matching a predicate.
pub struct RetryIf<F> {
    predicate: Arc<F>,
}

impl<F> RetryIf<F> {
    pub fn new(predicate: F) -> Self {
        Self {
            predicate: Arc::new(predicate),
        }
    }
}

impl<F> Clone for RetryIf<F> {
    fn clone(&self) -> Self {
        Self {
            predicate: Arc::clone(&self.predicate),
        }
    }
}

impl<F> fmt::Debug for RetryIf<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryIf").finish_non_exhaustive()
    }
}

// Equality is identity of the shared predicate.
impl<F> PartialEq for RetryIf<F> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.predicate, &other.predicate)
    }
}

impl<F> Eq for RetryIf<F> {}

impl<E, F> ErrorClassifier<E> for RetryIf<F>
where
    E: ?Sized,
    F: Fn(&E) -> bool,
{
    fn is_retryable(&self, error: &E) -> bool {
        (self.predicate)(error)
    }
}
