//! `send` command implementation

use anyhow::{Context, Result};
use bulkmail_common::types::{DispatchSummary, RateLimitPolicy};
use bulkmail_common::{Error, Settings};
use bulkmail_core::{DispatchEngine, DispatchReport, SmtpConnector};
use bulkmail_storage::{RecipientSheet, StatusSink};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::prompt;
use crate::cli::SendArgs;

/// Execute the `send` command
pub async fn run_send(config: &Path, args: &SendArgs) -> Result<()> {
    let mut settings = Settings::load(config)?;
    if args.starttls {
        settings.smtp_starttls = true;
    }

    let policy = policy_from_args(args)?;
    let mut sheet = RecipientSheet::open(&args.file, &args.columns.mapping())?;
    if sheet.is_empty() {
        println!("{} has no recipient rows; nothing to send", sheet.path().display());
        return Ok(());
    }
    let recipients = sheet.recipients();

    let credentials = settings.credentials();
    println!(
        "Sending {} messages as {} via {}:{}; pausing {:?} after every {} {}",
        recipients.len(),
        credentials.sender(),
        credentials.host,
        credentials.port,
        policy.pause(),
        policy.threshold(),
        policy.mode()
    );

    if !args.yes && !confirm()? {
        println!("Aborted");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received; stopping after the current message");
                cancel.cancel();
            }
        })
    };

    let engine = DispatchEngine::new(SmtpConnector::new(), credentials, policy)
        .with_cancellation(cancel);
    let result = engine.run(&recipients).await;
    ctrl_c.abort();

    match result {
        Ok(report) => {
            sheet.persist(&report.outcomes)?;
            print_report(&args.file, &report);
            Ok(())
        }
        Err(err) => {
            if let Some(partial) = err.partial() {
                match sheet.persist(&partial.outcomes) {
                    Ok(()) => print_report(&args.file, partial),
                    Err(e) => error!("Failed to record partial statuses: {}", e),
                }
            }
            Err(Error::from(err).into())
        }
    }
}

/// Resolve the throttling policy, starting from fixed batches
fn policy_from_args(args: &SendArgs) -> Result<RateLimitPolicy> {
    let base = RateLimitPolicy::batch();

    let pause = match (args.pause_secs, args.pause_minutes) {
        (Some(secs), _) => Duration::from_secs(secs),
        (None, Some(minutes)) => RateLimitPolicy::minutes(minutes)?,
        (None, None) => base.pause(),
    };

    let policy = RateLimitPolicy::new(
        args.threshold.unwrap_or(base.threshold()),
        pause,
        args.counting_mode.map(Into::into).unwrap_or(base.mode()),
    )?;

    Ok(policy)
}

fn confirm() -> Result<bool> {
    let answer = prompt("Proceed? [y/N]").context("Failed to read from stdin")?;
    Ok(matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn print_report(file: &Path, report: &DispatchReport) {
    let summary: DispatchSummary = report.summary();
    info!(
        attempted = summary.attempted,
        succeeded = summary.succeeded,
        failed = summary.failed,
        "Statuses written to {}",
        file.display()
    );
    println!("{}", summary);
    println!("Statuses written to {}", file.display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use bulkmail_common::types::CountingMode;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    fn send_args(extra: &[&str]) -> SendArgs {
        let mut argv = vec!["bulkmail", "send", "list.csv"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Send(args) => args,
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_default_policy_is_batch() {
        let policy = policy_from_args(&send_args(&[])).unwrap();
        assert_eq!(policy, RateLimitPolicy::batch());
    }

    #[test]
    fn test_hourly_policy() {
        let policy = policy_from_args(&send_args(&[
            "--threshold",
            "250",
            "--pause-minutes",
            "60",
            "--counting-mode",
            "successes-only",
        ]))
        .unwrap();

        assert_eq!(policy, RateLimitPolicy::hourly(250, 60).unwrap());
        assert_eq!(policy.mode(), CountingMode::SuccessesOnly);
    }

    #[test]
    fn test_oversized_pause_minutes_rejected() {
        let err = policy_from_args(&send_args(&["--pause-minutes", &u64::MAX.to_string()]))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Config(msg)) if msg.contains("too long")
        ));
    }

    #[test]
    fn test_zero_threshold_rejected() {
        assert!(policy_from_args(&send_args(&["--threshold", "0"])).is_err());
    }
}
