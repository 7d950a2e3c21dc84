//! `dbretry config` – show where config lives and the retry policy in effect.

use anyhow::Result;
use dbretry_core::config::{self, Backoff, DbRetryConfig};

pub fn run_config(cfg: &DbRetryConfig, transient_only: bool) -> Result<()> {
    println!("config file:  {}", config::config_path()?.display());

    let retry = cfg.retry_config();
    match retry.backoff {
        Backoff::None => println!("retry:        disabled"),
        Backoff::Fixed => println!(
            "retry:        fixed, {} retries, {} ms apart",
            retry.max_retries, retry.delay_ms
        ),
        Backoff::Exponential => println!(
            "retry:        exponential, {} retries, {} ms base, {} ms cap",
            retry.max_retries, retry.delay_ms, retry.max_delay_ms
        ),
    }
    println!(
        "retries on:   {}",
        if transient_only { "transient errors only" } else { "every error" }
    );
    println!("batch size:   {}", cfg.batch_size);
    match cfg.command_timeout() {
        Some(limit) => println!("timeout:      {} s", limit.as_secs()),
        None => println!("timeout:      driver default"),
    }
    match (&cfg.connection_string, &cfg.connection_string_name) {
        (Some(_), _) => println!("connection:   connection_string"),
        (None, Some(name)) => println!("connection:   connection_strings.{}", name),
        (None, None) => println!("connection:   (not configured)"),
    }
    Ok(())
}
