//! Error types for bulkmail

use thiserror::Error;

/// Main error type for bulkmail
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Recipient source error: {0}")]
    SourceFormat(String),

    #[error("Relay connection error: {0}")]
    Connection(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for bulkmail
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) => 78,
            Error::SourceFormat(_) => 65,
            Error::Connection(_) => 69,
            Error::Storage(_) => 74,
            Error::Io(_) => 74,
            Error::Other(_) => 1,
        }
    }

    /// Returns the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::SourceFormat(_) => "SOURCE_FORMAT_ERROR",
            Error::Connection(_) => "CONNECTION_ERROR",
            Error::Storage(_) => "STORAGE_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the run never started because of this error
    pub fn is_startup(&self) -> bool {
        matches!(self, Error::Config(_) | Error::SourceFormat(_))
    }
}
