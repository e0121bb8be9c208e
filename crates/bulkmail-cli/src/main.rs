//! Bulkmail - rate-limited bulk mail dispatcher entry point

mod cli;
mod commands;

use anyhow::Result;
use bulkmail_common::config::LoggingConfig;
use bulkmail_common::Settings;
use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

use cli::{Cli, Commands, LogFormat};
use commands::{run_check, run_configure, run_send};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logging preferences live in the settings file when there is one
    let logging = Settings::load(&cli.config)
        .map(|s| s.logging)
        .unwrap_or_default();

    if let Err(e) = init_logging(&cli, &logging) {
        eprintln!("{:#}", e);
        return ExitCode::FAILURE;
    }

    debug!(version = env!("CARGO_PKG_VERSION"), "Bulkmail starting");

    let result = match &cli.command {
        Commands::Configure(args) => run_configure(&cli.config, args),
        Commands::Check(args) => run_check(args),
        Commands::Send(args) => run_send(&cli.config, args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report_failure(&e),
    }
}

fn report_failure(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<bulkmail_common::Error>() {
        Some(e) => {
            error!(code = e.code(), "{}", e);
            eprintln!("error: {}", e);
            if e.is_startup() {
                eprintln!("No messages were sent.");
            }
            ExitCode::from(e.exit_code() as u8)
        }
        None => {
            error!("{:#}", err);
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(cli: &Cli, logging: &LoggingConfig) -> Result<()> {
    let level = match cli.verbose {
        0 => logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let format = cli.log_format.unwrap_or(if logging.format == "json" {
        LogFormat::Json
    } else {
        LogFormat::Text
    });

    let fmt_layer = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Text => fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
