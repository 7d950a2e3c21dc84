//! CLI parse tests, plus the parameter and batch-file parsers.

use super::{Cli, CliCommand};
use clap::Parser;

pub(super) fn parse(args: &[&str]) -> CliCommand {
    parse_cli(args).command
}

pub(super) fn parse_cli(args: &[&str]) -> Cli {
    Cli::try_parse_from(args).unwrap()
}
