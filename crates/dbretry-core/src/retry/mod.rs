//! Retry policy engine and retrying executor.
//!
//! A [`RetryPolicy`] hands out a fresh [`ShouldRetry`] decider per operation;
//! [`RetryExecutor`] runs the operation, reports each failure to its
//! [`DiagnosticSink`], and sleeps or gives up based on the decider's
//! [`RetryDecision`]. Higher layers (connection provider, commands, batcher)
//! share one configured policy.

mod classify;
mod policy;
mod run;
mod sink;

pub use classify::{AlwaysRetry, ErrorClassifier, RetryIf};
pub use policy::{
    ConfiguredPolicy, ExponentialRetry, FixedRetry, NeverRetry, RetryDecision, RetryPolicy,
    ShouldRetry,
};
pub use run::{run_with_retry, RetryExecutor};
pub use sink::{AttemptFailure, DiagnosticSink, FailureRecord, MemorySink, TracingSink};
