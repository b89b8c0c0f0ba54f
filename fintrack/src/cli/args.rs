//! CLI argument definitions.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

/// fintrack - fetch accounts and transactions from Bend
#[derive(Parser, Debug)]
#[command(name = "fintrack")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (default: ~/.config/fintrack/config.json)
    #[arg(long, global = true, env = "FINTRACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate with a refresh token or a one-time passcode
    Login {
        /// Phone number for OTP login (e.g. +15551234567); implies --otp-mode
        #[arg(long)]
        phone: Option<String>,

        /// OTP code; prompted for when omitted
        #[arg(long, requires = "phone")]
        otp: Option<String>,

        /// Use OTP login instead of the configured refresh token
        #[arg(long)]
        otp_mode: bool,

        /// Delivery channel for the OTP
        #[arg(long, default_value = "sms")]
        channel: String,

        /// Log HTTP requests and responses
        #[arg(long)]
        log_http: bool,
    },

    /// Show session status, refreshing it if needed
    Check {
        /// Log HTTP requests and responses
        #[arg(long)]
        log_http: bool,
    },

    /// List linked accounts
    Accounts {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,

        /// Log HTTP requests and responses
        #[arg(long)]
        log_http: bool,
    },

    /// Fetch transactions into the staging directory
    Transactions(TransactionArgs),

    /// Delete the stored session
    Logout,

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Filters and output options for `transactions`
#[derive(Args, Debug, Clone)]
pub struct TransactionArgs {
    /// Start date (YYYY-MM-DD or RFC 3339); alone, fetches up to now
    #[arg(long)]
    pub from: Option<String>,

    /// End date (YYYY-MM-DD or RFC 3339); alone, fetches --days back from it
    #[arg(long)]
    pub to: Option<String>,

    /// Days to fetch when the range is not fully given
    #[arg(long, default_value_t = 30)]
    pub days: u32,

    /// Account UUID (repeatable)
    #[arg(long = "account-id")]
    pub account_ids: Vec<String>,

    /// Category ID
    #[arg(long)]
    pub category_id: Option<String>,

    /// Subcategory ID
    #[arg(long)]
    pub subcategory_id: Option<String>,

    /// Predefined range (this_month, last_month, this_year, ...)
    #[arg(long)]
    pub time_filter: Option<String>,

    /// Aggregation period (month, week, day)
    #[arg(long)]
    pub count_by: Option<String>,

    /// Include aggregated totals
    #[arg(long)]
    pub include_totals: bool,

    /// Include the detailed search summary
    #[arg(long)]
    pub include_detailed: bool,

    /// Newest first with monthly totals, the detailed summary and
    /// category-or-subcategory matching
    #[arg(long)]
    pub detailed: bool,

    /// Extra `include[]` value passed through to the API
    #[arg(long)]
    pub include: Option<String>,

    /// Match category OR subcategory
    #[arg(long)]
    pub or_category: bool,

    /// Sort field
    #[arg(long, default_value = "txn_timestamp")]
    pub sort_by: String,

    /// Sort order (ASC or DESC)
    #[arg(long, default_value = "DESC")]
    pub sort_order: String,

    /// Page size
    #[arg(long, default_value_t = 50)]
    pub limit: u32,

    /// Follow the cursor and fetch every page
    #[arg(long)]
    pub all: bool,

    /// Directory the result file is written to
    #[arg(long, default_value = "./staging")]
    pub staging_dir: PathBuf,

    /// Log HTTP requests and responses
    #[arg(long)]
    pub log_http: bool,
}

/// `config` actions
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the effective configuration (secrets masked)
    Show,
    /// Print the configuration file path
    Path,
    /// Set a key in the configuration file
    Set {
        /// Setting name, e.g. rate_limit_ms
        key: String,
        value: String,
    },
    /// Print one effective setting
    Get { key: String },
    /// Check the configuration file and environment
    Validate,
}

/// Output formats for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Aligned columns
    Table,
    /// Pretty JSON
    Json,
    /// Comma-separated values
    Csv,
}

impl Commands {
    /// Whether the command asked for the HTTP echo.
    pub const fn log_http(&self) -> bool {
        match self {
            Self::Login { log_http, .. }
            | Self::Check { log_http }
            | Self::Accounts { log_http, .. } => *log_http,
            Self::Transactions(args) => args.log_http,
            Self::Logout | Self::Config { .. } => false,
        }
    }
}
