//! `check` command implementation

use anyhow::Result;
use bulkmail_storage::RecipientSheet;
use tracing::info;

use crate::cli::CheckArgs;

/// Execute the `check` command
pub fn run_check(args: &CheckArgs) -> Result<()> {
    let sheet = RecipientSheet::open(&args.file, &args.columns.mapping())?;
    let recipients = sheet.recipients();

    let blank = recipients.iter().filter(|r| r.address.is_empty()).count();
    info!(file = %sheet.path().display(), rows = sheet.len(), "Recipient file loaded");

    println!("{}: {} recipients", sheet.path().display(), sheet.len());
    if blank > 0 {
        println!("  {} rows have no address and will be reported as errors", blank);
    }

    Ok(())
}
