//! Relay session contract

use super::message::Envelope;
use async_trait::async_trait;
use bulkmail_common::types::RelayCredentials;
use thiserror::Error;

/// Boxed underlying cause of a connection failure
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure to establish an authenticated relay session
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("failed to connect to {host}:{port}: {source}")]
    Transport {
        host: String,
        port: u16,
        #[source]
        source: BoxError,
    },

    #[error("STARTTLS negotiation with {host} failed: {source}")]
    Security {
        host: String,
        #[source]
        source: BoxError,
    },

    #[error("authentication as {username} failed: {source}")]
    Authentication {
        username: String,
        #[source]
        source: BoxError,
    },
}

impl From<ConnectionError> for bulkmail_common::Error {
    fn from(err: ConnectionError) -> Self {
        bulkmail_common::Error::Connection(err.to_string())
    }
}

/// Failure to transmit a single message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The relay refused this message; the session is still usable
    #[error("{0}")]
    Rejected(String),

    /// The session dropped while sending; it must be replaced
    #[error("connection lost: {0}")]
    Disconnected(String),
}

impl SendError {
    pub fn is_disconnect(&self) -> bool {
        matches!(self, SendError::Disconnected(_))
    }
}

/// One authenticated session with the relay
#[async_trait]
pub trait RelaySession: Send {
    /// Transmit one envelope
    async fn send(&mut self, envelope: &Envelope) -> Result<(), SendError>;

    /// Terminate the session; safe to call more than once
    async fn close(&mut self);
}

/// Factory for relay sessions
#[async_trait]
pub trait RelayConnector: Send + Sync {
    type Session: RelaySession;

    /// Connect, optionally upgrade with STARTTLS, and authenticate
    async fn open(&self, credentials: &RelayCredentials) -> Result<Self::Session, ConnectionError>;
}
