//! Database adapter layer.
//!
//! Each adapter holds an inner collaborator (driver, command, batch backend)
//! and wraps only its connect/execute operations with the retry executor.
//! The SQLite implementation in [`sqlite`] backs the traits with `sqlx`.

mod batch;
mod command;
mod error;
mod provider;
pub mod sqlite;
mod statement;
mod transient;

pub use batch::{BatchExecutor, BatcherFactory, RetryBatcher, RetryBatcherFactory};
pub use command::{Command, RetryCommand};
pub use error::DbError;
pub use provider::{resolve_connection_string, Driver, RetryConnectionProvider, CONNECTION_STRING_ENV};
pub use statement::{Expectation, SqlValue, Statement};
pub use transient::{
    classify, classify_io_error, classify_sqlite_code, classify_sqlx_error, is_transient,
    transient_only, ErrorKind,
};
