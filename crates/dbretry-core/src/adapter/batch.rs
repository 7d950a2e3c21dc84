//! Statement batching with retry.
//!
//! Statements are queued together with the number of rows each is expected to
//! affect. Once the queue reaches the batch size the whole batch is sent as a
//! single unit through the retry executor, and the total rows affected is
//! checked against the sum of the expectations.

use std::future::Future;

use super::error::DbError;
use super::statement::{Expectation, Statement};
use crate::config::DbRetryConfig;
use crate::retry::{ConfiguredPolicy, DiagnosticSink, RetryExecutor, RetryPolicy, TracingSink};

/// Executes a batch of statements as one unit and reports total rows affected.
///
/// Implementations must leave no partial effects behind when they fail, since
/// the batcher re-sends the whole batch on retry.
pub trait BatchExecutor: Send + Sync {
    fn execute_batch(
        &self,
        statements: &[Statement],
    ) -> impl Future<Output = Result<u64, DbError>> + Send;
}

/// Builds batchers over a given backend.
pub trait BatcherFactory<B> {
    type Batcher;

    fn create_batcher(&self, backend: B) -> Self::Batcher;
}

/// Queues statements and flushes them through a retry policy.
pub struct RetryBatcher<B, P = ConfiguredPolicy, S = TracingSink> {
    backend: B,
    policy: P,
    executor: RetryExecutor<S>,
    batch_size: usize,
    pending: Vec<Statement>,
    /// Sum of expected row counts; `None` once a statement without one is queued.
    expected_rows: Option<u64>,
}

impl<B, P, S> RetryBatcher<B, P, S>
where
    B: BatchExecutor,
    P: RetryPolicy<DbError>,
    S: DiagnosticSink,
{
    /// `batch_size` is clamped to at least 1.
    pub fn new(backend: B, batch_size: usize, policy: P, executor: RetryExecutor<S>) -> Self {
        Self {
            backend,
            policy,
            executor,
            batch_size: batch_size.max(1),
            pending: Vec::new(),
            expected_rows: Some(0),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn set_batch_size(&mut self, batch_size: usize) {
        self.batch_size = batch_size.max(1);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Queue a statement. Returns the rows affected when this call filled the
    /// batch and caused it to execute.
    pub async fn add_to_batch(
        &mut self,
        statement: Statement,
        expectation: Expectation,
    ) -> Result<Option<u64>, DbError> {
        tracing::debug!("adding to batch: {}", statement.to_log_line());
        self.expected_rows = match (self.expected_rows, expectation) {
            (Some(total), Expectation::RowCount(n)) => Some(total.saturating_add(n)),
            _ => None,
        };
        self.pending.push(statement);

        if self.pending.len() >= self.batch_size {
            return self.execute_batch().await.map(Some);
        }
        Ok(None)
    }

    /// Send every queued statement, retrying the whole batch per policy.
    ///
    /// On failure the queue is kept so the caller can inspect or abort it.
    pub async fn execute_batch(&mut self) -> Result<u64, DbError> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        tracing::debug!(statements = self.pending.len(), "executing batch");

        let backend = &self.backend;
        let pending = &self.pending;
        let rows = self
            .executor
            .run_async("execute_batch", &self.policy, || backend.execute_batch(pending))
            .await?;

        let expected = self.expected_rows;
        self.reset();

        match expected {
            Some(expected) if expected != rows => {
                Err(DbError::UnexpectedRowCount { expected, actual: rows })
            }
            _ => Ok(rows),
        }
    }

    /// Drop queued statements without executing them.
    pub fn abort_batch(&mut self) {
        if !self.pending.is_empty() {
            tracing::debug!(statements = self.pending.len(), "aborting batch");
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.expected_rows = Some(0);
    }
}

/// Creates [`RetryBatcher`]s sharing one batch size and policy.
#[derive(Debug, Clone)]
pub struct RetryBatcherFactory<P = ConfiguredPolicy> {
    batch_size: usize,
    policy: P,
}

impl RetryBatcherFactory {
    pub fn from_config(cfg: &DbRetryConfig) -> Self {
        Self::new(cfg.batch_size, cfg.retry_config().policy())
    }
}

impl<P> RetryBatcherFactory<P> {
    pub fn new(batch_size: usize, policy: P) -> Self {
        Self { batch_size, policy }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl<B, P> BatcherFactory<B> for RetryBatcherFactory<P>
where
    B: BatchExecutor,
    P: RetryPolicy<DbError> + Clone,
{
    type Batcher = RetryBatcher<B, P>;

    fn create_batcher(&self, backend: B) -> Self::Batcher {
        RetryBatcher::new(backend, self.batch_size, self.policy.clone(), RetryExecutor::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{FixedRetry, MemorySink};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Reports one row per statement; fails a fixed number of times first.
    #[derive(Default)]
    struct CountingBackend {
        failures: u32,
        calls: AtomicU32,
        rows_per_statement: u64,
        batches: Mutex<Vec<usize>>,
    }

    impl BatchExecutor for CountingBackend {
        async fn execute_batch(&self, statements: &[Statement]) -> Result<u64, DbError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                return Err(DbError::Sqlx(sqlx::Error::PoolTimedOut));
            }
            self.batches.lock().unwrap().push(statements.len());
            Ok(statements.len() as u64 * self.rows_per_statement)
        }
    }

    fn batcher(
        backend: CountingBackend,
        batch_size: usize,
    ) -> RetryBatcher<CountingBackend, FixedRetry, MemorySink> {
        RetryBatcher::new(
            backend,
            batch_size,
            FixedRetry::new(3, Duration::ZERO),
            RetryExecutor::with_sink(MemorySink::new()),
        )
    }

    fn insert(i: i64) -> Statement {
        Statement::new("INSERT INTO t (id) VALUES (?)").bind(i)
    }

    #[tokio::test]
    async fn flushes_when_batch_is_full() {
        let backend = CountingBackend {
            rows_per_statement: 1,
            ..Default::default()
        };
        let mut b = batcher(backend, 3);
        assert_eq!(b.add_to_batch(insert(1), Expectation::RowCount(1)).await.unwrap(), None);
        assert_eq!(b.add_to_batch(insert(2), Expectation::RowCount(1)).await.unwrap(), None);
        assert_eq!(b.pending_count(), 2);
        assert_eq!(
            b.add_to_batch(insert(3), Expectation::RowCount(1)).await.unwrap(),
            Some(3)
        );
        assert_eq!(b.pending_count(), 0);
        assert_eq!(*b.backend().batches.lock().unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn explicit_execute_sends_partial_batch() {
        let backend = CountingBackend {
            rows_per_statement: 1,
            ..Default::default()
        };
        let mut b = batcher(backend, 10);
        b.add_to_batch(insert(1), Expectation::RowCount(1)).await.unwrap();
        assert_eq!(b.execute_batch().await.unwrap(), 1);
        assert_eq!(b.execute_batch().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn batch_is_retried_as_a_whole() {
        let backend = CountingBackend {
            failures: 2,
            rows_per_statement: 1,
            ..Default::default()
        };
        let mut b = batcher(backend, 2);
        b.add_to_batch(insert(1), Expectation::RowCount(1)).await.unwrap();
        let rows = b.add_to_batch(insert(2), Expectation::RowCount(1)).await.unwrap();
        assert_eq!(rows, Some(2));
        assert_eq!(b.backend().calls.load(Ordering::SeqCst), 3);
        assert_eq!(b.executor.sink().len(), 2);
    }

    #[tokio::test]
    async fn failed_batch_keeps_queue_until_aborted() {
        let backend = CountingBackend {
            failures: u32::MAX,
            ..Default::default()
        };
        let mut b = batcher(backend, 5);
        b.add_to_batch(insert(1), Expectation::None).await.unwrap();
        assert!(b.execute_batch().await.is_err());
        assert_eq!(b.pending_count(), 1);
        b.abort_batch();
        assert_eq!(b.pending_count(), 0);
    }

    #[tokio::test]
    async fn row_count_mismatch_is_reported() {
        let backend = CountingBackend {
            rows_per_statement: 0,
            ..Default::default()
        };
        let mut b = batcher(backend, 5);
        b.add_to_batch(insert(1), Expectation::RowCount(1)).await.unwrap();
        b.add_to_batch(insert(2), Expectation::RowCount(1)).await.unwrap();
        let err = b.execute_batch().await.unwrap_err();
        assert!(matches!(
            err,
            DbError::UnexpectedRowCount {
                expected: 2,
                actual: 0
            }
        ));
        assert_eq!(b.pending_count(), 0);
    }

    #[tokio::test]
    async fn unchecked_statement_disables_verification() {
        let backend = CountingBackend {
            rows_per_statement: 0,
            ..Default::default()
        };
        let mut b = batcher(backend, 5);
        b.add_to_batch(insert(1), Expectation::RowCount(1)).await.unwrap();
        b.add_to_batch(insert(2), Expectation::None).await.unwrap();
        assert_eq!(b.execute_batch().await.unwrap(), 0);
    }

    #[test]
    fn factory_uses_config_batch_size() {
        let mut cfg = DbRetryConfig::default();
        cfg.batch_size = 0;
        let factory = RetryBatcherFactory::from_config(&cfg);
        let b = factory.create_batcher(CountingBackend::default());
        assert_eq!(b.batch_size(), 1);
        assert_eq!(RetryBatcherFactory::from_config(&DbRetryConfig::default()).batch_size(), 20);
    }
}
