//! Retrying connection provider.

use std::future::Future;

use super::error::DbError;
use crate::config::DbRetryConfig;
use crate::retry::{ConfiguredPolicy, DiagnosticSink, RetryExecutor, RetryPolicy, TracingSink};

/// Environment variable that overrides any connection string in the config file,
/// for hosts that inject settings through the environment.
pub const CONNECTION_STRING_ENV: &str = "DBRETRY_SQL_CONNECTION_STRING";

/// Opens raw connections. Implemented by concrete database drivers.
pub trait Driver: Send + Sync {
    type Connection: Send;

    fn connect(
        &self,
        connection_string: &str,
    ) -> impl Future<Output = Result<Self::Connection, DbError>> + Send;
}

/// Pick the connection string: environment override, then `connection_string`,
/// then the `connection_string_name` entry of `[connection_strings]`.
pub fn resolve_connection_string(
    cfg: &DbRetryConfig,
    env_override: Option<String>,
) -> Result<String, DbError> {
    if let Some(s) = env_override.filter(|s| !s.trim().is_empty()) {
        return Ok(s);
    }
    if let Some(s) = &cfg.connection_string {
        return Ok(s.clone());
    }
    match &cfg.connection_string_name {
        Some(name) => cfg
            .connection_strings
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::UnknownConnectionName(name.clone())),
        None => Err(DbError::MissingConnectionString),
    }
}

/// Hands out connections, retrying the open according to its policy.
///
/// A connection from a failed attempt is dropped before the next attempt, so
/// nothing half-open leaks out of [`get_connection`](Self::get_connection).
pub struct RetryConnectionProvider<D, P = ConfiguredPolicy, S = TracingSink> {
    driver: D,
    connection_string: String,
    policy: P,
    executor: RetryExecutor<S>,
}

impl<D: Driver> RetryConnectionProvider<D> {
    /// Build a provider from config. The retry policy comes from `[retry]`
    /// (default: 10 retries, 3 s apart).
    pub fn configure(driver: D, cfg: &DbRetryConfig) -> Result<Self, DbError> {
        let connection_string =
            resolve_connection_string(cfg, std::env::var(CONNECTION_STRING_ENV).ok())?;
        Ok(Self::new(
            driver,
            connection_string,
            cfg.retry_config().policy(),
            RetryExecutor::new(),
        ))
    }
}

impl<D, P, S> RetryConnectionProvider<D, P, S>
where
    D: Driver,
    P: RetryPolicy<DbError>,
    S: DiagnosticSink,
{
    pub fn new(
        driver: D,
        connection_string: impl Into<String>,
        policy: P,
        executor: RetryExecutor<S>,
    ) -> Self {
        Self {
            driver,
            connection_string: connection_string.into(),
            policy,
            executor,
        }
    }

    /// Swap the retry policy, e.g. to add a classifier.
    pub fn with_policy<P2: RetryPolicy<DbError>>(self, policy: P2) -> RetryConnectionProvider<D, P2, S> {
        RetryConnectionProvider {
            driver: self.driver,
            connection_string: self.connection_string,
            policy,
            executor: self.executor,
        }
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Open a connection, retrying per policy.
    pub async fn get_connection(&self) -> Result<D::Connection, DbError> {
        let conn = self
            .executor
            .run_async("get_connection", &self.policy, || {
                self.driver.connect(&self.connection_string)
            })
            .await?;
        tracing::debug!("connection opened");
        Ok(conn)
    }
}
