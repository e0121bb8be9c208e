//! Command line definitions

use bulkmail_common::types::CountingMode;
use bulkmail_common::config::DEFAULT_SETTINGS_FILE;
use bulkmail_storage::ColumnMapping;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Bulkmail - rate-limited bulk mail over a single SMTP relay
#[derive(Parser, Debug)]
#[command(name = "bulkmail", author, version, about)]
pub struct Cli {
    /// Settings file
    #[arg(long, global = true, default_value = DEFAULT_SETTINGS_FILE, env = "BULKMAIL_CONFIG")]
    pub config: PathBuf,

    /// Log output format; defaults to the configured format
    #[arg(long, value_enum, global = true, env = "BULKMAIL_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Capture relay settings and save them
    Configure(ConfigureArgs),

    /// Load a recipient file and report how many rows it holds
    Check(CheckArgs),

    /// Send one message per recipient row and record each status
    Send(SendArgs),
}

/// Arguments for `configure`; anything omitted is prompted for
#[derive(Args, Debug, Default)]
pub struct ConfigureArgs {
    /// Relay host
    #[arg(long)]
    pub host: Option<String>,

    /// Relay port
    #[arg(long)]
    pub port: Option<u16>,

    /// Login user
    #[arg(long)]
    pub user: Option<String>,

    /// Login password
    #[arg(long, env = "BULKMAIL_SMTP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Negotiate STARTTLS before authenticating
    #[arg(long)]
    pub starttls: bool,

    /// Sender address when it differs from the login user
    #[arg(long)]
    pub from: Option<String>,
}

/// Which columns hold the recipient fields
#[derive(Args, Debug, Clone)]
pub struct ColumnArgs {
    /// Column holding the recipient address
    #[arg(long, default_value = "A")]
    pub address_column: String,

    /// Column holding the subject
    #[arg(long, default_value = "B")]
    pub subject_column: String,

    /// Column holding the HTML body
    #[arg(long, default_value = "C")]
    pub body_column: String,
}

impl ColumnArgs {
    pub fn mapping(&self) -> ColumnMapping {
        ColumnMapping {
            address: self.address_column.clone(),
            subject: self.subject_column.clone(),
            body: self.body_column.clone(),
        }
    }
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Recipient file
    pub file: PathBuf,

    #[command(flatten)]
    pub columns: ColumnArgs,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Recipient file; statuses are written back into it
    pub file: PathBuf,

    #[command(flatten)]
    pub columns: ColumnArgs,

    /// Counted messages per session before pausing [default: 5]
    #[arg(long)]
    pub threshold: Option<u32>,

    /// Pause length in seconds [default: 60]
    #[arg(long, conflicts_with = "pause_minutes")]
    pub pause_secs: Option<u64>,

    /// Pause length in minutes
    #[arg(long)]
    pub pause_minutes: Option<u64>,

    /// Which attempts advance the counter
    #[arg(long, value_enum)]
    pub counting_mode: Option<CountingModeArg>,

    /// Force STARTTLS regardless of the settings file
    #[arg(long)]
    pub starttls: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CountingModeArg {
    /// Every attempt counts
    AllAttempts,
    /// Only delivered messages count
    SuccessesOnly,
}

impl From<CountingModeArg> for CountingMode {
    fn from(arg: CountingModeArg) -> Self {
        match arg {
            CountingModeArg::AllAttempts => CountingMode::AllAttempts,
            CountingModeArg::SuccessesOnly => CountingMode::SuccessesOnly,
        }
    }
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// JSON structured logging
    Json,
}
