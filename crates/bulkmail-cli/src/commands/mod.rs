//! Subcommand implementations

mod check;
mod configure;
mod send;

pub use check::run_check;
pub use configure::run_configure;
pub use send::run_send;

use std::io::{self, BufRead, Write};

/// Print a prompt and read one trimmed line from stdin
pub(crate) fn prompt(label: &str) -> io::Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{}: ", label)?;
    stdout.flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
