//! Tabular recipient source backed by a CSV file

use bulkmail_common::types::{DispatchOutcome, Recipient};
use bulkmail_common::{Error, Result};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Column that receives the per-row dispatch status
pub const STATUS_COLUMN: &str = "Status";

/// Sink that persists the outcome set of a run
pub trait StatusSink {
    /// Persist outcomes; outcome `i` belongs to source row `i`
    fn persist(&mut self, outcomes: &[DispatchOutcome]) -> Result<()>;
}

/// Names of the columns holding the recipient fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub address: String,
    pub subject: String,
    pub body: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            address: "A".to_string(),
            subject: "B".to_string(),
            body: "C".to_string(),
        }
    }
}

/// Recipient rows loaded from a file, kept for in-place status write-back
#[derive(Debug)]
pub struct RecipientSheet {
    path: PathBuf,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    address_col: usize,
    subject_col: usize,
    body_col: usize,
}

impl RecipientSheet {
    /// Load a sheet and check that every mapped column is present
    pub fn open(path: &Path, mapping: &ColumnMapping) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(|e| Error::Storage(format!("Failed to open {}: {}", path.display(), e)))?;

        let mut headers: Vec<String> = reader
            .headers()
            .map_err(|e| Error::SourceFormat(format!("Failed to read header row: {}", e)))?
            .iter()
            .map(str::to_string)
            .collect();

        let position = |name: &str| headers.iter().position(|h| h.trim() == name);
        let (address_col, subject_col, body_col) = match (
            position(&mapping.address),
            position(&mapping.subject),
            position(&mapping.body),
        ) {
            (Some(a), Some(s), Some(b)) => (a, s, b),
            _ => {
                let missing: Vec<&str> = [&mapping.address, &mapping.subject, &mapping.body]
                    .into_iter()
                    .filter(|name| position(name).is_none())
                    .map(String::as_str)
                    .collect();
                return Err(Error::SourceFormat(format!(
                    "{} is missing required column(s): {}",
                    path.display(),
                    missing.join(", ")
                )));
            }
        };

        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|e| {
                Error::SourceFormat(format!("Malformed row {}: {}", line + 2, e))
            })?;
            rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }

        // Rows wider than the header keep their extra cells under blank headers
        let width = rows.iter().map(Vec::len).fold(headers.len(), usize::max);
        headers.resize(width, String::new());
        for row in &mut rows {
            row.resize(width, String::new());
        }

        info!(path = %path.display(), rows = rows.len(), "Loaded recipient sheet");

        Ok(Self {
            path: path.to_path_buf(),
            headers,
            rows,
            address_col,
            subject_col,
            body_col,
        })
    }

    /// Recipients in source order
    pub fn recipients(&self) -> Vec<Recipient> {
        self.rows
            .iter()
            .map(|row| {
                Recipient::new(
                    row[self.address_col].trim(),
                    row[self.subject_col].as_str(),
                    row[self.body_col].as_str(),
                )
            })
            .collect()
    }

    /// Number of data rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Status cell of a row, if the column exists
    pub fn status(&self, row: usize) -> Option<&str> {
        let col = self.status_col()?;
        self.rows.get(row).map(|r| r[col].as_str())
    }

    fn status_col(&self) -> Option<usize> {
        self.headers.iter().position(|h| h.trim() == STATUS_COLUMN)
    }

    fn ensure_status_col(&mut self) -> usize {
        if let Some(col) = self.status_col() {
            return col;
        }
        self.headers.push(STATUS_COLUMN.to_string());
        for row in &mut self.rows {
            row.push(String::new());
        }
        self.headers.len() - 1
    }

    /// Write the sheet back over its source file
    fn write_back(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir)
            .map_err(|e| Error::Storage(format!("Failed to create temp file: {}", e)))?;
        {
            let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
            writer
                .write_record(&self.headers)
                .map_err(|e| Error::Storage(format!("Failed to write header row: {}", e)))?;
            for row in &self.rows {
                writer
                    .write_record(row)
                    .map_err(|e| Error::Storage(format!("Failed to write row: {}", e)))?;
            }
            writer
                .flush()
                .map_err(|e| Error::Storage(format!("Failed to flush sheet: {}", e)))?;
        }

        tmp.persist(&self.path)
            .map_err(|e| Error::Storage(format!("Failed to replace {}: {}", self.path.display(), e)))?;

        debug!(path = %self.path.display(), "Wrote recipient sheet");
        Ok(())
    }
}

impl StatusSink for RecipientSheet {
    fn persist(&mut self, outcomes: &[DispatchOutcome]) -> Result<()> {
        if outcomes.len() > self.rows.len() {
            return Err(Error::Storage(format!(
                "{} outcomes for {} rows",
                outcomes.len(),
                self.rows.len()
            )));
        }

        let status_col = self.ensure_status_col();
        for (row, outcome) in self.rows.iter_mut().zip(outcomes) {
            if row[self.address_col].trim() != outcome.recipient.address {
                return Err(Error::Storage(format!(
                    "Outcome for {} does not line up with row address {}",
                    outcome.recipient.address,
                    row[self.address_col].trim()
                )));
            }
            row[status_col] = outcome.status_text();
        }

        self.write_back()?;
        info!(
            path = %self.path.display(),
            written = outcomes.len(),
            unattempted = self.rows.len() - outcomes.len(),
            "Persisted dispatch status"
        );
        Ok(())
    }
}
