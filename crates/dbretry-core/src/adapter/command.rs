//! Command abstraction and the retrying command wrapper.

use std::future::Future;

use super::error::DbError;
use super::statement::{SqlValue, Statement};
use crate::retry::{ConfiguredPolicy, DiagnosticSink, RetryExecutor, RetryPolicy, TracingSink};

/// A database command: a statement plus the ways to execute it.
///
/// Execution takes `&self` so a retry loop can re-issue the same command
/// without exclusive access; state changes go through `statement_mut`.
pub trait Command: Send + Sync {
    type Row: Send;

    fn statement(&self) -> &Statement;

    fn statement_mut(&mut self) -> &mut Statement;

    /// Run the statement and collect every row it returns.
    fn execute_reader(&self) -> impl Future<Output = Result<Vec<Self::Row>, DbError>> + Send;

    /// Run the statement and return the number of rows affected.
    fn execute_non_query(&self) -> impl Future<Output = Result<u64, DbError>> + Send;

    /// First column of the first row, or `None` when no row comes back.
    fn execute_scalar(&self) -> impl Future<Output = Result<Option<SqlValue>, DbError>> + Send;

    /// Ask the driver to parse and cache the statement.
    fn prepare(&self) -> impl Future<Output = Result<(), DbError>> + Send;

    /// Interrupt an execution in progress. No-op when idle.
    fn cancel(&self);
}

/// Wraps a command and retries its execute operations.
///
/// Everything else (statement access, prepare, cancel) goes straight to the
/// inner command.
pub struct RetryCommand<C, P = ConfiguredPolicy, S = TracingSink> {
    inner: C,
    policy: P,
    executor: RetryExecutor<S>,
}

impl<C: Command> RetryCommand<C> {
    /// Wrap with the default policy (10 retries, 3 s apart).
    pub fn new(inner: C) -> Self {
        Self::with_policy(inner, ConfiguredPolicy::default(), RetryExecutor::new())
    }
}

impl<C, P, S> RetryCommand<C, P, S>
where
    C: Command,
    P: RetryPolicy<DbError>,
    S: DiagnosticSink,
{
    pub fn with_policy(inner: C, policy: P, executor: RetryExecutor<S>) -> Self {
        Self {
            inner,
            policy,
            executor,
        }
    }

    /// The wrapped command, for collaborators that need the driver-level type.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }
}

impl<C, P, S> Command for RetryCommand<C, P, S>
where
    C: Command,
    P: RetryPolicy<DbError> + Send + Sync,
    P::Decider: Send,
    S: DiagnosticSink + Send + Sync,
{
    type Row = C::Row;

    fn statement(&self) -> &Statement {
        self.inner.statement()
    }

    fn statement_mut(&mut self) -> &mut Statement {
        self.inner.statement_mut()
    }

    async fn execute_reader(&self) -> Result<Vec<C::Row>, DbError> {
        self.executor
            .run_async("execute_reader", &self.policy, || self.inner.execute_reader())
            .await
    }

    async fn execute_non_query(&self) -> Result<u64, DbError> {
        self.executor
            .run_async("execute_non_query", &self.policy, || {
                self.inner.execute_non_query()
            })
            .await
    }

    async fn execute_scalar(&self) -> Result<Option<SqlValue>, DbError> {
        self.executor
            .run_async("execute_scalar", &self.policy, || self.inner.execute_scalar())
            .await
    }

    async fn prepare(&self) -> Result<(), DbError> {
        self.inner.prepare().await
    }

    fn cancel(&self) {
        self.inner.cancel()
    }
}
