pub mod config;
pub mod logging;

pub mod adapter;
pub mod retry;
