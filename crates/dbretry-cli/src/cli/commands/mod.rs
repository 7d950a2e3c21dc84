//! CLI command handlers. Each command is in its own file.

mod batch;
mod config;
mod exec;
mod query;
mod scalar;
mod session;

pub use batch::run_batch;
pub use config::run_config;
pub use exec::run_exec;
pub use query::run_query;
pub use scalar::run_scalar;
pub use session::Session;

#[cfg(test)]
pub(crate) use batch::parse_batch;
#[cfg(test)]
pub(crate) use session::parse_param;
