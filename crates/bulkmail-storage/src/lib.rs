//! Bulkmail Storage - Recipient source and status sink
//!
//! This crate reads recipient rows from a tabular file and writes the
//! per-row dispatch status back into the same file.

pub mod sheet;

pub use sheet::{ColumnMapping, RecipientSheet, StatusSink, STATUS_COLUMN};
