//! Fault-injecting wrappers around the SQLite adapters.
//!
//! Each wrapper fails its first `failures` calls with a connection reset and
//! then delegates to the real implementation.

use dbretry_core::adapter::{BatchExecutor, DbError, Driver, Statement};
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};

pub fn connection_reset() -> DbError {
    DbError::Sqlx(sqlx::Error::Io(io::Error::new(
        io::ErrorKind::ConnectionReset,
        "connection reset by peer",
    )))
}

pub struct Flaky<T> {
    pub inner: T,
    failures: u32,
    calls: AtomicU32,
}

impl<T> Flaky<T> {
    pub fn new(inner: T, failures: u32) -> Self {
        Self {
            inner,
            failures,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Count a call; `true` if it should fail.
    fn trip(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst) < self.failures
    }
}

impl<D: Driver> Driver for Flaky<D> {
    type Connection = D::Connection;

    async fn connect(&self, connection_string: &str) -> Result<D::Connection, DbError> {
        if self.trip() {
            return Err(connection_reset());
        }
        self.inner.connect(connection_string).await
    }
}

impl<B: BatchExecutor> BatchExecutor for Flaky<B> {
    async fn execute_batch(&self, statements: &[Statement]) -> Result<u64, DbError> {
        if self.trip() {
            return Err(connection_reset());
        }
        self.inner.execute_batch(statements).await
    }
}
