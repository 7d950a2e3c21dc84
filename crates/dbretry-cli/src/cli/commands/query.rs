//! `dbretry query` – run a query and print its rows.

use anyhow::Result;
use dbretry_core::adapter::sqlite::{column_names, row_values};
use dbretry_core::adapter::{Command, DbError};
use dbretry_core::retry::ErrorClassifier;

use super::Session;

pub async fn run_query<C>(session: &Session<C>, sql: &str, params: &[String]) -> Result<()>
where
    C: ErrorClassifier<DbError> + Clone + Send + Sync,
{
    let command = session.command(sql, params);
    let rows = command.execute_reader().await?;
    let Some(first) = rows.first() else {
        println!("No rows.");
        return Ok(());
    };

    println!("{}", column_names(first).join("\t"));
    for row in &rows {
        let values = row_values(row)?;
        let line: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        println!("{}", line.join("\t"));
    }
    tracing::debug!("query returned {} row(s)", rows.len());
    Ok(())
}
