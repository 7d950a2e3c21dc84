//! `dbretry batch` – run a file of statements through the batcher.
//!
//! One statement per line. Blank lines and `--` comments are skipped and a
//! trailing `;` is dropped.

use anyhow::{Context, Result};
use dbretry_core::adapter::{DbError, Expectation};
use dbretry_core::retry::ErrorClassifier;
use std::fs;
use std::path::Path;

use super::Session;

pub async fn run_batch<C>(session: &Session<C>, path: &Path) -> Result<()>
where
    C: ErrorClassifier<DbError> + Clone + Send + Sync,
{
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read batch file {}", path.display()))?;
    let statements = parse_batch(&data);
    if statements.is_empty() {
        println!("No statements in {}.", path.display());
        return Ok(());
    }

    let mut batcher = session.batcher();
    let mut total = 0u64;
    for sql in &statements {
        let statement = session.statement(sql, &[]);
        if let Some(affected) = batcher.add_to_batch(statement, Expectation::None).await? {
            total += affected;
        }
    }
    total += batcher.execute_batch().await?;

    println!(
        "{} statement(s) executed, {} row(s) affected",
        statements.len(),
        total
    );
    Ok(())
}

pub(crate) fn parse_batch(data: &str) -> Vec<String> {
    data.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("--"))
        .map(|line| line.trim_end_matches(';').trim_end().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}
