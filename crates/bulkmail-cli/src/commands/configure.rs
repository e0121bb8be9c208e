//! `configure` command implementation

use anyhow::{Context, Result};
use bulkmail_common::Settings;
use std::path::Path;

use super::prompt;
use crate::cli::ConfigureArgs;

/// Execute the `configure` command
pub fn run_configure(config: &Path, args: &ConfigureArgs) -> Result<()> {
    let settings = collect(args, |label| prompt(label).context("Failed to read from stdin"))?;
    settings.save(config)?;

    println!("Settings saved to {}", config.display());
    Ok(())
}

/// Build settings from flags, asking for whatever is missing
fn collect<F>(args: &ConfigureArgs, mut ask: F) -> Result<Settings>
where
    F: FnMut(&str) -> Result<String>,
{
    let host = match &args.host {
        Some(host) => host.clone(),
        None => ask("SMTP host")?,
    };

    let port = match args.port {
        Some(port) => port,
        None => {
            let raw = ask("SMTP port")?;
            raw.parse::<u16>()
                .with_context(|| format!("'{}' is not a valid port", raw))?
        }
    };

    let user = match &args.user {
        Some(user) => user.clone(),
        None => ask("SMTP user")?,
    };

    let password = match &args.password {
        Some(password) => password.clone(),
        None => ask("SMTP password")?,
    };

    let mut settings = Settings::new(host.trim(), port, user.trim(), password);
    settings.smtp_starttls = args.starttls;
    settings.from_address = args.from.clone();
    settings.validate()?;

    Ok(settings)
}
