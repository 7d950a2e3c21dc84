//! SQLite implementation of the adapter traits (via sqlx).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnection, SqliteRow};
use sqlx::{Column, Connection, Executor, Row, TypeInfo, ValueRef};
use tokio::sync::{Mutex, Notify};

use super::batch::BatchExecutor;
use super::command::Command;
use super::error::DbError;
use super::provider::Driver;
use super::statement::{SqlValue, Statement};

/// A connection shared between commands and batch executors.
pub type SharedConnection = Arc<Mutex<SqliteConnection>>;

/// Opens `SqliteConnection`s from `sqlite://` URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

impl Driver for SqliteDriver {
    type Connection = SqliteConnection;

    async fn connect(&self, connection_string: &str) -> Result<SqliteConnection, DbError> {
        Ok(SqliteConnection::connect(connection_string).await?)
    }
}

/// Wrap a connection so commands and batchers can share it.
pub fn share(conn: SqliteConnection) -> SharedConnection {
    Arc::new(Mutex::new(conn))
}

fn build_query(statement: &Statement) -> Query<'_, Sqlite, SqliteArguments<'_>> {
    let mut query = sqlx::query(&statement.text);
    for param in &statement.params {
        query = match param {
            SqlValue::Null => query.bind(None::<i64>),
            SqlValue::Integer(v) => query.bind(*v),
            SqlValue::Real(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.as_str()),
            SqlValue::Blob(v) => query.bind(v.as_slice()),
        };
    }
    query
}

/// Read one column of a row as a [`SqlValue`], using the value's storage class.
pub fn column_value(row: &SqliteRow, index: usize) -> Result<SqlValue, DbError> {
    let kind = {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(SqlValue::Null);
        }
        raw.type_info().name().to_string()
    };
    let value = match kind.as_str() {
        "INTEGER" | "BOOLEAN" => SqlValue::Integer(row.try_get_unchecked(index)?),
        "REAL" | "NUMERIC" => SqlValue::Real(row.try_get_unchecked(index)?),
        "BLOB" => SqlValue::Blob(row.try_get_unchecked(index)?),
        _ => SqlValue::Text(row.try_get_unchecked(index)?),
    };
    Ok(value)
}

/// Every column of a row, in order.
pub fn row_values(row: &SqliteRow) -> Result<Vec<SqlValue>, DbError> {
    (0..row.len()).map(|i| column_value(row, i)).collect()
}

/// Column names of a row, in order.
pub fn column_names(row: &SqliteRow) -> Vec<String> {
    row.columns().iter().map(|c| c.name().to_string()).collect()
}

/// A statement bound to a shared SQLite connection.
pub struct SqliteCommand {
    conn: SharedConnection,
    statement: Statement,
    cancel: Notify,
}

impl SqliteCommand {
    pub fn new(conn: SharedConnection, statement: Statement) -> Self {
        Self {
            conn,
            statement,
            cancel: Notify::new(),
        }
    }

    pub fn connection(&self) -> &SharedConnection {
        &self.conn
    }

    /// Apply the statement timeout and race against `cancel`.
    async fn guarded<T>(
        &self,
        fut: impl Future<Output = Result<T, DbError>>,
    ) -> Result<T, DbError> {
        let run = async {
            match self.statement.timeout {
                Some(limit) => tokio::time::timeout(limit, fut)
                    .await
                    .map_err(|_| DbError::Timeout(limit))?,
                None => fut.await,
            }
        };
        tokio::select! {
            result = run => result,
            _ = self.cancel.notified() => Err(DbError::Cancelled),
        }
    }
}

impl Command for SqliteCommand {
    type Row = SqliteRow;

    fn statement(&self) -> &Statement {
        &self.statement
    }

    fn statement_mut(&mut self) -> &mut Statement {
        &mut self.statement
    }

    async fn execute_reader(&self) -> Result<Vec<SqliteRow>, DbError> {
        self.guarded(async {
            let mut conn = self.conn.lock().await;
            Ok(build_query(&self.statement).fetch_all(&mut *conn).await?)
        })
        .await
    }

    async fn execute_non_query(&self) -> Result<u64, DbError> {
        self.guarded(async {
            let mut conn = self.conn.lock().await;
            let done = build_query(&self.statement).execute(&mut *conn).await?;
            Ok(done.rows_affected())
        })
        .await
    }

    async fn execute_scalar(&self) -> Result<Option<SqlValue>, DbError> {
        self.guarded(async {
            let mut conn = self.conn.lock().await;
            let row = build_query(&self.statement)
                .fetch_optional(&mut *conn)
                .await?;
            match row {
                Some(row) if !row.is_empty() => column_value(&row, 0).map(Some),
                _ => Ok(None),
            }
        })
        .await
    }

    async fn prepare(&self) -> Result<(), DbError> {
        let mut conn = self.conn.lock().await;
        (&mut *conn).prepare(self.statement.text.as_str()).await?;
        Ok(())
    }

    fn cancel(&self) {
        self.cancel.notify_waiters();
    }
}

/// Runs a batch inside one transaction on a shared connection.
#[derive(Clone)]
pub struct SqliteBatchExecutor {
    conn: SharedConnection,
    timeout: Option<Duration>,
}

impl SqliteBatchExecutor {
    pub fn new(conn: SharedConnection) -> Self {
        Self {
            conn,
            timeout: None,
        }
    }

    /// Bound each batch execution, including the wait for the connection.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Own timeout, else the longest timeout among the statements.
    fn batch_timeout(&self, statements: &[Statement]) -> Option<Duration> {
        self.timeout
            .or_else(|| statements.iter().filter_map(|s| s.timeout).max())
    }

    async fn run_transaction(&self, statements: &[Statement]) -> Result<u64, DbError> {
        let mut conn = self.conn.lock().await;
        // Dropping the transaction on error rolls it back.
        let mut tx = conn.begin().await?;
        let mut rows = 0u64;
        for statement in statements {
            rows += build_query(statement).execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(rows)
    }
}

impl BatchExecutor for SqliteBatchExecutor {
    async fn execute_batch(&self, statements: &[Statement]) -> Result<u64, DbError> {
        match self.batch_timeout(statements) {
            Some(limit) => tokio::time::timeout(limit, self.run_transaction(statements))
                .await
                .map_err(|_| DbError::Timeout(limit))?,
            None => self.run_transaction(statements).await,
        }
    }
}
