//! Command-line interface: argument parsing, command execution and output.

mod args;
mod commands;
mod output;

pub use args::Cli;
pub use commands::execute;
