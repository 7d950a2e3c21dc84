//! `dbretry exec` – execute a statement and print rows affected.

use anyhow::Result;
use dbretry_core::adapter::{Command, DbError};
use dbretry_core::retry::ErrorClassifier;

use super::Session;

pub async fn run_exec<C>(session: &Session<C>, sql: &str, params: &[String]) -> Result<()>
where
    C: ErrorClassifier<DbError> + Clone + Send + Sync,
{
    let command = session.command(sql, params);
    let affected = command.execute_non_query().await?;
    println!("{} row(s) affected", affected);
    Ok(())
}
