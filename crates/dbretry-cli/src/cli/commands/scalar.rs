//! `dbretry scalar` – print the first column of the first row.

use anyhow::Result;
use dbretry_core::adapter::{Command, DbError};
use dbretry_core::retry::ErrorClassifier;

use super::Session;

pub async fn run_scalar<C>(session: &Session<C>, sql: &str, params: &[String]) -> Result<()>
where
    C: ErrorClassifier<DbError> + Clone + Send + Sync,
{
    let command = session.command(sql, params);
    match command.execute_scalar().await? {
        Some(value) => println!("{}", value),
        None => println!("(no result)"),
    }
    Ok(())
}
