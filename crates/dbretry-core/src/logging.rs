//! Logging init: file under XDG state dir, or fallback to stderr.
//!
//! Failed retry attempts are logged by [`crate::retry::TracingSink`], so the
//! log file is where retry history ends up.

use anyhow::{anyhow, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,dbretry_core=debug,dbretry_cli=debug";

/// `RUST_LOG` if set, otherwise info globally and debug for our crates.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// `~/.local/state/dbretry/dbretry.log`; parent directories are created.
pub fn log_file_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("dbretry")?;
    Ok(xdg_dirs.place_state_file("dbretry.log")?)
}

/// Initialize structured logging to the state-dir log file.
/// On failure (e.g. log dir unwritable), returns Err so the caller can fall back to stderr.
pub fn init_logging() -> Result<()> {
    let path = log_file_path()?;
    let file = fs::OpenOptions::new().create(true).append(true).open(&path)?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow!(e))?;

    tracing::info!("dbretry logging initialized at {}", path.display());
    Ok(())
}

/// Initialize logging to stderr only. Use when [`init_logging`] fails.
pub fn init_logging_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}
