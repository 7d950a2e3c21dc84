//! CLI for running SQL through the retrying connection, command and batch layer.

mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use dbretry_core::adapter::{
    resolve_connection_string, transient_only, DbError, CONNECTION_STRING_ENV,
};
use dbretry_core::config::{self, DbRetryConfig};
use dbretry_core::retry::{ConfiguredPolicy, ErrorClassifier};
use std::path::Path;

use commands::{run_batch, run_config, run_exec, run_query, run_scalar, Session};

/// Top-level CLI for dbretry.
#[derive(Debug, Parser)]
#[command(name = "dbretry")]
#[command(about = "dbretry: run SQL with transient-fault retries", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub retry: RetryArgs,

    #[command(subcommand)]
    pub command: CliCommand,
}

/// Overrides applied on top of config.toml.
#[derive(Debug, Args)]
pub struct RetryArgs {
    /// Connection string (takes precedence over env and config).
    #[arg(long, global = true, value_name = "URL")]
    pub connection: Option<String>,

    /// Retries after the first attempt.
    #[arg(long, global = true, value_name = "N")]
    pub max_retries: Option<u32>,

    /// Delay between attempts in milliseconds.
    #[arg(long, global = true, value_name = "MS")]
    pub delay_ms: Option<u64>,

    /// Only retry errors classified as transient (busy, locked, connection, timeout).
    #[arg(long, global = true)]
    pub transient_only: bool,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Execute a statement and print the number of rows affected.
    Exec {
        /// SQL text; use ?1, ?2, ... for parameters.
        sql: String,
        /// Positional parameter (repeatable). NULL, integers and reals are typed; anything else is text.
        #[arg(short, long = "param", value_name = "VALUE")]
        params: Vec<String>,
    },

    /// Run a query and print rows tab-separated, with a header line.
    Query {
        sql: String,
        #[arg(short, long = "param", value_name = "VALUE")]
        params: Vec<String>,
    },

    /// Run a query and print the first column of the first row.
    Scalar {
        sql: String,
        #[arg(short, long = "param", value_name = "VALUE")]
        params: Vec<String>,
    },

    /// Execute a file of statements (one per line) through the batcher.
    Batch {
        /// Path to the statement file.
        path: String,
    },

    /// Show the config file path and the effective retry settings.
    Config,
}

impl RetryArgs {
    /// Fold the flag overrides into `cfg`.
    pub fn apply(&self, cfg: &mut DbRetryConfig) {
        if self.max_retries.is_none() && self.delay_ms.is_none() {
            return;
        }
        let mut retry = cfg.retry_config();
        if let Some(n) = self.max_retries {
            retry.max_retries = n;
        }
        if let Some(ms) = self.delay_ms {
            retry.delay_ms = ms;
        }
        cfg.retry = Some(retry);
    }

    /// `--connection`, then the env override, then config.
    pub fn connection_string(&self, cfg: &DbRetryConfig) -> Result<String, DbError> {
        match &self.connection {
            Some(conn) => Ok(conn.clone()),
            None => resolve_connection_string(cfg, std::env::var(CONNECTION_STRING_ENV).ok()),
        }
    }
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let mut cfg = config::load_or_init()?;
        cli.retry.apply(&mut cfg);
        tracing::debug!("loaded config: {:?}", cfg);

        let policy = cfg.retry_config().policy();
        if cli.retry.transient_only {
            let policy = policy.with_classifier(transient_only());
            cli.command.dispatch(&cfg, &cli.retry, policy).await
        } else {
            cli.command.dispatch(&cfg, &cli.retry, policy).await
        }
    }

    async fn dispatch<C>(
        self,
        cfg: &DbRetryConfig,
        retry: &RetryArgs,
        policy: ConfiguredPolicy<C>,
    ) -> Result<()>
    where
        C: ErrorClassifier<DbError> + Clone + Send + Sync,
    {
        match self {
            CliCommand::Exec { sql, params } => {
                let session = connect(cfg, retry, &policy).await?;
                run_exec(&session, &sql, &params).await?;
            }
            CliCommand::Query { sql, params } => {
                let session = connect(cfg, retry, &policy).await?;
                run_query(&session, &sql, &params).await?;
            }
            CliCommand::Scalar { sql, params } => {
                let session = connect(cfg, retry, &policy).await?;
                run_scalar(&session, &sql, &params).await?;
            }
            CliCommand::Batch { path } => {
                let session = connect(cfg, retry, &policy).await?;
                run_batch(&session, Path::new(&path)).await?;
            }
            CliCommand::Config => run_config(cfg, retry.transient_only)?,
        }

        Ok(())
    }
}

async fn connect<C>(
    cfg: &DbRetryConfig,
    retry: &RetryArgs,
    policy: &ConfiguredPolicy<C>,
) -> Result<Session<C>>
where
    C: ErrorClassifier<DbError> + Clone + Send + Sync,
{
    let connection_string = retry.connection_string(cfg)?;
    Session::open(&connection_string, cfg, policy.clone()).await
}

#[cfg(test)]
mod tests;
