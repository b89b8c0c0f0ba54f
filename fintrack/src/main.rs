//! fintrack - fetch accounts and transactions from the Bend personal finance API.
//!
//! Authenticates with a refresh token or a one-time passcode, keeps the
//! session on disk, and writes fetched transactions to a staging directory
//! as JSON.

mod api;
mod cli;
mod config;
mod error;
mod logging;
mod models;
mod session;

use anyhow::Result;
use clap::Parser;

use cli::{execute, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    execute(cli).await
}
