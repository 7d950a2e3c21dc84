//! Shared connection state for the SQL commands.

use anyhow::{Context, Result};
use dbretry_core::adapter::sqlite::{
    share, SharedConnection, SqliteBatchExecutor, SqliteCommand, SqliteDriver,
};
use dbretry_core::adapter::{
    DbError, RetryBatcher, RetryCommand, RetryConnectionProvider, SqlValue, Statement,
};
use dbretry_core::config::DbRetryConfig;
use dbretry_core::retry::{ConfiguredPolicy, ErrorClassifier, RetryExecutor};
use std::time::Duration;

/// One open connection plus the policy every command and batch runs under.
pub struct Session<C> {
    conn: SharedConnection,
    policy: ConfiguredPolicy<C>,
    command_timeout: Option<Duration>,
    batch_size: usize,
}

impl<C> Session<C>
where
    C: ErrorClassifier<DbError> + Clone + Send + Sync,
{
    /// Open a connection through the retrying provider.
    pub async fn open(
        connection_string: &str,
        cfg: &DbRetryConfig,
        policy: ConfiguredPolicy<C>,
    ) -> Result<Self> {
        let provider = RetryConnectionProvider::new(
            SqliteDriver,
            connection_string,
            policy.clone(),
            RetryExecutor::new(),
        );
        let conn = provider
            .get_connection()
            .await
            .context("failed to open database connection")?;
        Ok(Self {
            conn: share(conn),
            policy,
            command_timeout: cfg.command_timeout(),
            batch_size: cfg.batch_size,
        })
    }

    /// A retrying command for `sql` with `params` bound positionally.
    pub fn command(
        &self,
        sql: &str,
        params: &[String],
    ) -> RetryCommand<SqliteCommand, ConfiguredPolicy<C>> {
        let statement = self.statement(sql, params);
        let inner = SqliteCommand::new(self.conn.clone(), statement);
        RetryCommand::with_policy(inner, self.policy.clone(), RetryExecutor::new())
    }

    /// Statement with the configured command timeout applied.
    pub fn statement(&self, sql: &str, params: &[String]) -> Statement {
        params
            .iter()
            .fold(Statement::new(sql), |s, p| s.bind(parse_param(p)))
            .with_timeout(self.command_timeout)
    }

    pub fn batcher(&self) -> RetryBatcher<SqliteBatchExecutor, ConfiguredPolicy<C>> {
        RetryBatcher::new(
            SqliteBatchExecutor::new(self.conn.clone()).with_timeout(self.command_timeout),
            self.batch_size,
            self.policy.clone(),
            RetryExecutor::new(),
        )
    }
}

/// `NULL` (any case) is null, then integer, then real; anything else is text.
pub(crate) fn parse_param(raw: &str) -> SqlValue {
    if raw.eq_ignore_ascii_case("null") {
        return SqlValue::Null;
    }
    if let Ok(v) = raw.parse::<i64>() {
        return SqlValue::Integer(v);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => SqlValue::Real(v),
        _ => SqlValue::Text(raw.to_string()),
    }
}
